use anyhow::Result;
use clap::Parser;
use log::{debug, info};
use std::path::PathBuf;
use te_monitor::application::{MonitorOptions, run_monitor};
use te_monitor::runtime::{RealRuntime, Runtime};
use tokio_util::sync::CancellationToken;

/// te-monitor - data allowance monitor
///
/// Logs in to the provider's self-care API, polls the remaining data
/// allowance, exports it on a Prometheus `/metrics` endpoint and optionally
/// forwards each reading to the `notify` tool.
///
/// Credentials may come from flags, environment variables, or a `.env` file
/// in the working directory.
///
/// Examples:
///   te-monitor --config config.yaml --interval 3600
///   TE_ACCOUNT_ID=12345678 TE_PASSWORD=... te-monitor
#[derive(Parser, Debug)]
#[command(author, version = env!("TE_MONITOR_VERSION"), about)]
struct Cli {
    /// Path to configuration file
    #[arg(
        long,
        short = 'c',
        env = "TE_CONFIG",
        value_name = "PATH",
        default_value = "config.yaml"
    )]
    config: PathBuf,

    /// Interval in seconds between each query (overrides `rate_limit`)
    #[arg(long, short = 'i', env = "TE_INTERVAL", value_name = "SECS")]
    interval: Option<u64>,

    /// Account ID, without the FBB prefix
    #[arg(long = "acct-id", alias = "acctId", env = "TE_ACCOUNT_ID", value_name = "ID")]
    acct_id: Option<String>,

    /// Account password
    #[arg(long, env = "TE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Notifier destination id; enables notifications (overrides `notify_id`)
    #[arg(long = "notify-id", env = "TE_NOTIFY_ID", value_name = "ID")]
    notify_id: Option<String>,

    /// Port for the metrics endpoint (overrides `metrics_port`)
    #[arg(long = "metrics-port", value_name = "PORT")]
    metrics_port: Option<u16>,
}

impl From<Cli> for MonitorOptions {
    fn from(cli: Cli) -> Self {
        Self {
            config_path: cli.config,
            interval: cli.interval,
            account_id: cli.acct_id,
            password: cli.password,
            notify_id: cli.notify_id,
            metrics_port: cli.metrics_port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let runtime = RealRuntime;
    // Before logging and flag parsing, so RUST_LOG and TE_* can come from .env.
    let dotenv = runtime.load_dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Some(path) = dotenv {
        debug!("Loaded environment from {:?}", path);
    }
    let cli = Cli::parse();

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let ctrl_c_handler = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Exiting gracefully...");
            token.cancel();
        }
    });

    let result = run_monitor(&runtime, cli.into(), shutdown).await;

    ctrl_c_handler.abort();
    result
}
