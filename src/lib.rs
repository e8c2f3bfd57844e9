//! `kt`: produce, consume and inspect Kafka topics from the command line.

pub mod broker;
pub mod cmd;
pub mod config;
pub mod error;
pub mod kafka;
pub mod output;
pub mod resolver;

pub use broker::{Broker, MemoryBroker};
pub use error::{Error, Result};
