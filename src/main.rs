use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use consort::backend::BackendClient;
use consort::config::{Config, LoggingConfig};
use consort::coordinator::{
    DependencyDiscoverer, LeaderElector, ServiceInstance, ServiceLifecycle, ServiceRegistry,
};
use consort::error::Error;
use consort::metrics;
use consort::server::ServiceServer;
use consort::trace::Tracer;

#[derive(Parser)]
#[command(
    name = "consort",
    version,
    about = "Service registration, leader election and trace propagation over a Consul-style backend",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Coordination backend URL, e.g. http://127.0.0.1:8500/v1
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Enable verbose logging (overrides logging.level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides logging.format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an instance: wait for dependencies, register, elect, serve /health
    Serve {
        /// Service name
        #[arg(short, long)]
        name: Option<String>,

        /// Replica group
        #[arg(short, long)]
        group: Option<String>,

        /// Listening port
        #[arg(short, long)]
        port: Option<u16>,

        /// Advertised address
        #[arg(long)]
        address: Option<String>,

        /// Services that must be discoverable before serving
        #[arg(long, value_delimiter = ',')]
        depends_on: Vec<String>,

        /// Do not take part in leader election
        #[arg(long, default_value = "false")]
        no_election: bool,
    },

    /// Wait until services are discoverable and print their ports
    Discover {
        /// Service names
        #[arg(required = true)]
        names: Vec<String>,

        /// Replica group
        #[arg(short, long, default_value = "primary")]
        group: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },

    /// Print the session holding a service's leader key
    Leader {
        /// Service name
        service: String,
    },

    /// Register a service instance
    Register {
        /// Service name
        #[arg(short, long)]
        name: String,

        /// Replica group
        #[arg(short, long, default_value = "primary")]
        group: String,

        /// Port the instance listens on
        #[arg(short, long)]
        port: u16,

        /// Advertised address
        #[arg(long, default_value = "127.0.0.1")]
        address: String,
    },

    /// Deregister a service instance by id
    Deregister {
        /// Instance id, e.g. forecaster_primary
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(url) = cli.backend_url {
        config.backend.url = url;
    }
    config.logging = config
        .logging
        .with_overrides(cli.verbose, cli.log_format.as_deref());

    // Initialize tracing/logging
    setup_tracing(&config.logging)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
    }

    match cli.command {
        Commands::Serve {
            name,
            group,
            port,
            address,
            depends_on,
            no_election,
        } => {
            if let Some(name) = name {
                config.service.name = name;
            }
            if let Some(group) = group {
                config.service.group = group;
            }
            if let Some(port) = port {
                config.service.port = port;
            }
            if let Some(address) = address {
                config.service.address = address;
            }
            if !depends_on.is_empty() {
                config.discovery.dependencies = depends_on;
            }
            if no_election {
                config.election.enabled = false;
            }
            config.validate()?;

            tracing::info!(
                service = %config.service.name,
                group = %config.service.group,
                port = config.service.port,
                backend = %config.backend.url,
                "Starting serve command"
            );
            serve(config).await?;
        }

        Commands::Discover {
            names,
            group,
            interval_ms,
        } => {
            config.validate()?;
            discover(&config, names, group, Duration::from_millis(interval_ms)).await?;
        }

        Commands::Leader { service } => {
            config.validate()?;
            leader(&config, &service).await?;
        }

        Commands::Register {
            name,
            group,
            port,
            address,
        } => {
            config.validate()?;
            let instance =
                ServiceInstance::new(name, group, address, port, config.health_check_interval());
            registry(&config)?.register(&instance).await?;
            println!("Registered {}", instance.id);
        }

        Commands::Deregister { id } => {
            config.validate()?;
            registry(&config)?.deregister(&id).await?;
            println!("Deregistered {id}");
        }
    }

    Ok(())
}

fn setup_tracing(logging: &LoggingConfig) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_new(logging.filter_directive())
        .with_context(|| format!("Invalid log level: {}", logging.level))?;

    if logging.is_json() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    }
}

fn registry(config: &Config) -> Result<ServiceRegistry> {
    Ok(ServiceRegistry::new(BackendClient::new(&config.backend)?))
}

/// Cancel `token` on Ctrl-C or SIGTERM
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C"),
            _ = terminate => tracing::info!("Received SIGTERM"),
        }
        token.cancel();
    });
}

async fn serve(config: Config) -> Result<()> {
    let bind_address: SocketAddr = format!("{}:{}", config.server.bind_host, config.service.port)
        .parse()
        .context("Invalid bind address")?;

    let tracer = Tracer::new(config.service.name.clone());
    let server = ServiceServer::new(bind_address, tracer.clone())
        .with_request_logging(config.server.enable_request_logging);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let outcome = ServiceLifecycle::new(config)?.run(server, cancel).await;
    tracer.shutdown();

    match outcome {
        Ok(()) => {
            tracing::info!("Instance stopped");
            Ok(())
        }
        Err(Error::Cancelled) => {
            tracing::info!("Stopped while waiting for dependencies");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn discover(
    config: &Config,
    names: Vec<String>,
    group: String,
    interval: Duration,
) -> Result<()> {
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let discoverer = DependencyDiscoverer::new(registry(config)?, group);
    let mut resolved: Vec<_> = discoverer
        .await_all(names.as_slice(), interval, &cancel)
        .await?
        .into_iter()
        .collect();
    resolved.sort();

    for (name, port) in resolved {
        println!("{name}\t{port}");
    }
    Ok(())
}

async fn leader(config: &Config, service: &str) -> Result<()> {
    let elector = LeaderElector::new(BackendClient::new(&config.backend)?, "");
    match elector.current_holder(service).await? {
        Some(session) => println!("{service}\t{session}"),
        None => println!("{service}\t(vacant)"),
    }
    Ok(())
}
