//! One module per sub-command. Each takes its config, a [`crate::broker::Broker`]
//! and the streams it writes to.

pub mod admin;
pub mod consume;
pub mod group;
pub mod produce;
pub mod topic;
