use std::sync::Arc;

use clap::Parser;
use log::{debug, info, LevelFilter};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use kt::broker::Broker;
use kt::cmd;
use kt::config::{
    client_id, normalize_args, AdminConfig, Cli, Command, ConnectionConfig, ConsumeConfig, GroupConfig, ProduceConfig,
    TopicConfig,
};
use kt::error::{Error, Result};
use kt::kafka::{tls, ClusterConfig, KafkaCluster};

/// A sub-command with its validated configuration.
enum Task {
    Produce(ProduceConfig),
    Consume(ConsumeConfig),
    Group(GroupConfig),
    Topic(TopicConfig),
    Admin(AdminConfig),
}

impl TryFrom<&Command> for Task {
    type Error = Error;

    fn try_from(command: &Command) -> Result<Self> {
        Ok(match command {
            Command::Produce(args) => Task::Produce(args.try_into()?),
            Command::Consume(args) => Task::Consume(args.try_into()?),
            Command::Group(args) => Task::Group(args.try_into()?),
            Command::Topic(args) => Task::Topic(args.into()),
            Command::Admin(args) => Task::Admin(args.try_into()?),
        })
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    let level = if cli.command.connection().verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    if let Err(e) = run(cli).await {
        eprintln!("kt: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let connection = ConnectionConfig::try_from(cli.command.connection())?;
    let task = Task::try_from(&cli.command)?;

    let config = ClusterConfig {
        brokers: connection.brokers.clone(),
        client_id: client_id(cli.command.name()),
        tls: tls::client_config(&connection.tls)?,
    };
    debug!("Connecting to brokers={:?} as client_id={}", config.brokers, config.client_id);
    let cluster = KafkaCluster::connect(config).await.map_err(|source| Error::Connect {
        brokers: connection.brokers.clone(),
        source,
    })?;
    let broker: Arc<dyn Broker> = Arc::new(cluster);

    let mut out = tokio::io::stdout();
    let mut err = tokio::io::stderr();
    match task {
        Task::Produce(config) => {
            let input = BufReader::new(tokio::io::stdin());
            cmd::produce::run(broker.as_ref(), &config, input, &mut out).await
        }
        Task::Consume(config) => {
            let cancel = CancellationToken::new();
            let interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted, stopping consumers");
                    interrupt.cancel();
                }
            });
            cmd::consume::run(broker, config, cancel, &mut out, &mut err).await
        }
        Task::Group(config) => cmd::group::run(broker.as_ref(), &config, &mut out, &mut err).await,
        Task::Topic(config) => cmd::topic::run(broker.as_ref(), &config, &mut out).await,
        Task::Admin(config) => cmd::admin::run(broker.as_ref(), &config).await,
    }
}
