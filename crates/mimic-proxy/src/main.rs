use clap::Parser;
use mimic_proxy::config::{Config, LogFormat, Mode};
use mimic_proxy::logging::{LeveledLogger, TracingLogger};
use mimic_proxy::Mimic;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mimic-proxy", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "MIMIC_CONFIG")]
    config: Option<String>,

    /// Listen port, overrides the config file
    #[arg(short, long, env = "MIMIC_PORT")]
    port: Option<u16>,

    /// Listen host, overrides the config file
    #[arg(long, env = "MIMIC_HOST")]
    host: Option<String>,

    #[arg(short, long, value_enum, env = "MIMIC_MODE")]
    mode: Option<Mode>,

    /// Log filter directive, e.g. `info` or `mimic_proxy=debug`
    #[arg(long, env = "MIMIC_LOG")]
    log_level: Option<String>,

    #[arg(long, value_enum, env = "MIMIC_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.listen.port = port;
    }
    if let Some(host) = &args.host {
        config.listen.host = host.clone();
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    match config.logging.format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config);

    let logger: Arc<dyn LeveledLogger> = Arc::new(TracingLogger);
    let mimic = Mimic::from_config(&config, logger)?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (addr, server) = mimic.spawn(config.listen.socket_addr()?, shutdown_rx).await?;
    info!("mimic started on {} in {} mode", addr, config.mode);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    match server.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("Server error: {}", e);
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
