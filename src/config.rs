//! Command-line arguments and the per-command configuration built from them.
//!
//! Arguments are parsed once by clap and converted with `TryFrom` into
//! immutable config structs. Every check that does not need a broker happens
//! here, so invalid invocations fail before any connection is attempted.

use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::broker::TopicDetail;
use crate::error::Error;
use crate::kafka::tls::TlsFiles;

pub const DEFAULT_BROKER: &str = "localhost:9092";
const DEFAULT_PORT: u16 = 9092;

#[derive(Parser, Debug)]
#[command(name = "kt", version, about = "Kafka command line tool")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read JSON records from stdin and send them to a topic
    Produce(ProduceArgs),
    /// Print messages of a topic as JSON lines
    Consume(ConsumeArgs),
    /// List or reset consumer group offsets
    Group(GroupArgs),
    /// List topics
    Topic(TopicArgs),
    /// Create or delete topics
    Admin(AdminArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Produce(_) => "produce",
            Command::Consume(_) => "consume",
            Command::Group(_) => "group",
            Command::Topic(_) => "topic",
            Command::Admin(_) => "admin",
        }
    }

    pub fn connection(&self) -> &ConnectionArgs {
        match self {
            Command::Produce(args) => &args.connection,
            Command::Consume(args) => &args.connection,
            Command::Group(args) => &args.connection,
            Command::Topic(args) => &args.connection,
            Command::Admin(args) => &args.connection,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Comma separated list of brokers, port defaults to 9092 when omitted
    #[arg(long, env = "KT_BROKERS", default_value = DEFAULT_BROKER)]
    pub brokers: String,

    /// More verbose logging to stderr
    #[arg(long)]
    pub verbose: bool,

    /// Path to the TLS certificate authority file
    #[arg(long)]
    pub tlsca: Option<PathBuf>,

    /// Path to the TLS client certificate file
    #[arg(long)]
    pub tlscert: Option<PathBuf>,

    /// Path to the TLS client certificate key file
    #[arg(long)]
    pub tlscertkey: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProduceArgs {
    /// Topic to produce to
    #[arg(long)]
    pub topic: Option<String>,

    /// Partition used for records that do not name a valid one
    #[arg(long, allow_negative_numbers = true)]
    pub partition: Option<i32>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConsumeArgs {
    /// Topic to consume
    #[arg(long)]
    pub topic: Option<String>,

    /// Consumer group whose offsets are resumed and committed
    #[arg(long)]
    pub group: Option<String>,

    /// Stop once no partition received a message for this long, e.g. 500ms or 1m30s
    #[arg(long)]
    pub timeout: Option<String>,

    /// Start offset: oldest, newest or an absolute offset
    #[arg(long, allow_negative_numbers = true)]
    pub offset: Option<String>,

    /// Comma separated list of partitions to consume
    #[arg(long)]
    pub partitions: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GroupArgs {
    /// Topic whose offsets are listed or reset
    #[arg(long)]
    pub topic: Option<String>,

    /// Consumer group name
    #[arg(long)]
    pub group: Option<String>,

    /// Commit this absolute offset for the selected partitions
    #[arg(long, allow_negative_numbers = true)]
    pub reset: Option<i64>,

    /// Comma separated list of partitions
    #[arg(long)]
    pub partitions: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TopicArgs {
    /// Only list the topic with this exact name
    #[arg(long)]
    pub topic: Option<String>,

    /// Include the partition ids of each topic
    #[arg(long)]
    pub partitions: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AdminArgs {
    /// Name of the topic to create
    #[arg(long)]
    pub createtopic: Option<String>,

    /// Path to the JSON encoded topic detail
    #[arg(long)]
    pub topicdetail: Option<PathBuf>,

    /// Only validate the creation request
    #[arg(long)]
    pub validateonly: bool,

    /// Name of the topic to delete
    #[arg(long)]
    pub deletetopic: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Validated connection settings. Certificates are only read when the
/// cluster client is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub brokers: Vec<String>,
    pub verbose: bool,
    pub tls: TlsFiles,
}

impl TryFrom<&ConnectionArgs> for ConnectionConfig {
    type Error = Error;

    fn try_from(args: &ConnectionArgs) -> Result<Self, Self::Error> {
        let tls = TlsFiles {
            ca: args.tlsca.clone(),
            cert: args.tlscert.clone(),
            key: args.tlscertkey.clone(),
        };
        tls.is_enabled()?;
        Ok(Self {
            brokers: parse_brokers(&args.brokers)?,
            verbose: args.verbose,
            tls,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceConfig {
    pub topic: String,
    pub partition: Option<i32>,
}

impl TryFrom<&ProduceArgs> for ProduceConfig {
    type Error = Error;

    fn try_from(args: &ProduceArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            topic: required_topic(&args.topic)?,
            partition: args.partition,
        })
    }
}

/// Where a reader starts when no committed offset applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    Oldest,
    /// Offset of the most recent message.
    Newest,
    Absolute(i64),
}

impl FromStr for StartOffset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "oldest" => Ok(StartOffset::Oldest),
            "newest" => Ok(StartOffset::Newest),
            other => match other.parse::<i64>() {
                Ok(offset) if offset >= 0 => Ok(StartOffset::Absolute(offset)),
                _ => Err(Error::Argument(format!(
                    "invalid offset {:?}, expected oldest, newest or a non-negative number",
                    s
                ))),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeConfig {
    pub topic: String,
    pub group: Option<String>,
    /// Idle timeout per partition, `None` to consume until interrupted.
    pub timeout: Option<Duration>,
    pub offset: Option<StartOffset>,
    pub partitions: Option<Vec<i32>>,
}

impl ConsumeConfig {
    /// Sentinel used by readers without an explicit or committed offset.
    pub fn fallback_offset(&self) -> StartOffset {
        match (self.offset, &self.group) {
            (Some(offset), _) => offset,
            (None, Some(_)) => StartOffset::Oldest,
            (None, None) => StartOffset::Newest,
        }
    }
}

impl TryFrom<&ConsumeArgs> for ConsumeConfig {
    type Error = Error;

    fn try_from(args: &ConsumeArgs) -> Result<Self, Self::Error> {
        let timeout = match &args.timeout {
            Some(timeout) => Some(parse_duration(timeout)?).filter(|d| !d.is_zero()),
            None => None,
        };
        Ok(Self {
            topic: required_topic(&args.topic)?,
            group: non_empty(&args.group),
            timeout,
            offset: args.offset.as_deref().map(StartOffset::from_str).transpose()?,
            partitions: args.partitions.as_deref().map(parse_partitions).transpose()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    List,
    Reset(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub topic: String,
    pub group: Option<String>,
    pub mode: GroupMode,
    pub partitions: Option<Vec<i32>>,
}

impl TryFrom<&GroupArgs> for GroupConfig {
    type Error = Error;

    fn try_from(args: &GroupArgs) -> Result<Self, Self::Error> {
        let group = non_empty(&args.group);
        let mode = match args.reset {
            None => GroupMode::List,
            Some(_) if group.is_none() => {
                return Err(Error::Argument("group is required to reset offsets".to_string()));
            }
            Some(offset) if offset < 0 => {
                return Err(Error::Argument(format!("reset offset must be >= 0, got {}", offset)));
            }
            Some(offset) => GroupMode::Reset(offset),
        };
        Ok(Self {
            topic: required_topic(&args.topic)?,
            group,
            mode,
            partitions: args.partitions.as_deref().map(parse_partitions).transpose()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub filter: Option<String>,
    pub partitions: bool,
}

impl From<&TopicArgs> for TopicConfig {
    fn from(args: &TopicArgs) -> Self {
        Self {
            filter: non_empty(&args.topic),
            partitions: args.partitions,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdminConfig {
    Create {
        name: String,
        detail: TopicDetail,
        validate_only: bool,
    },
    Delete {
        name: String,
    },
}

impl TryFrom<&AdminArgs> for AdminConfig {
    type Error = Error;

    /// Reads the topic detail file, so a bad file fails before connecting.
    fn try_from(args: &AdminArgs) -> Result<Self, Self::Error> {
        if let Some(name) = non_empty(&args.createtopic) {
            let Some(path) = &args.topicdetail else {
                return Err(Error::Argument("topicdetail is required to create a topic".to_string()));
            };
            return Ok(AdminConfig::Create {
                name,
                detail: TopicDetail::from_file(path)?,
                validate_only: args.validateonly,
            });
        }
        match non_empty(&args.deletetopic) {
            Some(name) => Ok(AdminConfig::Delete { name }),
            None => Err(Error::Argument("one of createtopic or deletetopic is required".to_string())),
        }
    }
}

/// Rewrites Go-style single dash flags (`-topic`) to their long form.
/// Short flags and negative numbers pass through untouched.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| match arg.to_str() {
            Some(s) if is_single_dash_word(s) => OsString::from(format!("-{}", s)),
            _ => arg,
        })
        .collect()
}

fn is_single_dash_word(s: &str) -> bool {
    let Some(rest) = s.strip_prefix('-') else {
        return false;
    };
    let name = rest.split('=').next().unwrap_or(rest);
    name.len() > 1 && name.starts_with(|c: char| c.is_ascii_alphabetic())
}

/// Splits a comma separated broker list, appending the default port where
/// none is given.
pub fn parse_brokers(s: &str) -> Result<Vec<String>, Error> {
    let brokers: Vec<String> = s
        .split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(|b| {
            if has_port(b) {
                b.to_string()
            } else {
                format!("{}:{}", b, DEFAULT_PORT)
            }
        })
        .collect();
    if brokers.is_empty() {
        return Err(Error::Argument("at least one broker is required".to_string()));
    }
    Ok(brokers)
}

fn has_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && !addr.ends_with(']') && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Parses a comma separated partition list such as `"0,1"`.
pub fn parse_partitions(s: &str) -> Result<Vec<i32>, Error> {
    let partitions = s
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.parse::<i32>() {
            Ok(id) if id >= 0 => Ok(id),
            _ => Err(Error::Argument(format!("invalid partition {:?}", p))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if partitions.is_empty() {
        return Err(Error::Argument(format!("no partitions in {:?}", s)));
    }
    Ok(partitions)
}

/// Parses a duration in Go notation: a sequence of numbers with units
/// `ns`, `us`, `ms`, `s`, `m` or `h`, e.g. `500ms` or `1m30s`. A bare `0`
/// is accepted.
pub fn parse_duration(s: &str) -> Result<Duration, Error> {
    let invalid = || Error::Argument(format!("invalid duration {:?}", s));
    let s = s.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        nanos += value * unit_nanos;
        rest = &rest[unit_len..];
    }
    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

/// Client id announced to the brokers, `kt-<command>-<user>`.
pub fn client_id(command: &str) -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    format!("kt-{}-{}", command, sanitize_username(&user))
}

/// Keeps the ASCII letters and digits of `user`.
fn sanitize_username(user: &str) -> String {
    let sanitized: String = user.chars().filter(char::is_ascii_alphanumeric).collect();
    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

fn required_topic(topic: &Option<String>) -> Result<String, Error> {
    non_empty(topic).ok_or_else(|| Error::Argument("topic is required".to_string()))
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
