use std::path::PathBuf;

/// Failures surfaced to the operator. Each variant maps to a process exit code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid arguments: {0}")]
    Argument(String),

    #[error("failed to connect to brokers={brokers:?}: {source}")]
    Connect {
        brokers: Vec<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to setup certificates: {0}")]
    Tls(String),

    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("failed to resolve partitions for topic={topic}: {source}")]
    Resolution {
        topic: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to read input line {line}: {source}")]
    Input {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse input line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to produce record from input line {line}: {source}")]
    Produce {
        line: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to consume partitions={partitions:?} of topic={topic}")]
    Fetch { topic: String, partitions: Vec<i32> },

    #[error("failed to commit offset for group={group} partition={partition}: {source}")]
    Commit {
        group: String,
        partition: i32,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to read topic detail {path:?}: {detail}")]
    TopicDetail { path: PathBuf, detail: String },

    #[error("admin operation failed: {0}")]
    Admin(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Argument(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
