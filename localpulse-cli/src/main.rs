use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use localpulse_cli::commands::{self, LoadSettings};
use localpulse_cli::config::{
    DEFAULT_LOG_FILTER, DEFAULT_REPORT_INTERVAL, DEFAULT_SCAN_TIMEOUT_MS, EXIT_SETUP_FAILURE,
    EXIT_THRESHOLD_EXCEEDED,
};
use localpulse_cli::report;
use localpulse_common::{PulseConfig, PulseError, Result};
use localpulse_monitor::{ScannerConfig, TesterOptions};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "localpulse", version, about = "Monitor and load test local HTTP services")]
struct Args {
    /// Config file to use instead of ~/.localpulse.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover HTTP services on local ports.
    Scan {
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Comma-separated ports; defaults to the configured port list.
        #[arg(long, value_delimiter = ',')]
        ports: Vec<u16>,

        #[arg(long, default_value_t = DEFAULT_SCAN_TIMEOUT_MS)]
        timeout_ms: u64,

        /// Add every discovered endpoint to the config file.
        #[arg(long)]
        save: bool,
    },

    /// Add an endpoint to the config file.
    Add {
        url: String,

        #[arg(long)]
        name: Option<String>,
    },

    /// Remove an endpoint from the config file.
    Remove { url: String },

    /// List configured endpoints.
    List,

    /// Generate load and report latency, throughput and errors.
    Load {
        /// Endpoints to test; defaults to the configured endpoints.
        urls: Vec<String>,

        /// Also test every endpoint found by a scan of the configured ports.
        #[arg(long)]
        scan: bool,

        /// Requests per second sent to each endpoint; defaults to the configured rate.
        #[arg(long)]
        rps: Option<u32>,

        /// Workers per endpoint.
        #[arg(long, default_value_t = localpulse_monitor::tester::DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Seconds to run; 0 runs until Ctrl-C.
        #[arg(long, default_value_t = 0)]
        duration: u64,

        #[arg(long, default_value_t = DEFAULT_REPORT_INTERVAL.as_millis() as u64)]
        interval_ms: u64,

        /// Exit with status 1 if any endpoint's error rate (%) exceeds this.
        #[arg(long)]
        max_error_rate: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(EXIT_SETUP_FAILURE)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config_path = match args.config {
        Some(path) => path,
        None => PulseConfig::default_path()
            .ok_or_else(|| PulseError::Config("HOME is not set; pass --config".to_string()))?,
    };

    match args.command {
        Command::Scan {
            host,
            ports,
            timeout_ms,
            save,
        } => {
            let config = PulseConfig::load_from(&config_path)?;
            let scanner_config = ScannerConfig {
                host,
                ports: if ports.is_empty() {
                    config.default_ports
                } else {
                    ports
                },
                timeout: Duration::from_millis(timeout_ms),
                ..ScannerConfig::default()
            };
            let save_to = save.then_some(config_path.as_path());
            let endpoints = commands::scan(scanner_config, save_to).await?;

            if endpoints.is_empty() {
                println!("No services found");
            }
            for endpoint in &endpoints {
                println!("{}", report::endpoint_summary(endpoint));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Add { url, name } => {
            let (url, added) = commands::add_endpoint(&config_path, &url, name.as_deref())?;
            if added {
                println!("Added {url}");
            } else {
                println!("{url} is already configured");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Remove { url } => {
            if commands::remove_endpoint(&config_path, &url)? {
                println!("Removed {url}");
            } else {
                println!("{url} is not configured");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            let config = PulseConfig::load_from(&config_path)?;
            if config.endpoints.is_empty() {
                println!("No endpoints configured");
            }
            for endpoint in &config.endpoints {
                match &endpoint.name {
                    Some(name) => println!("{}  ({})", endpoint.url, name),
                    None => println!("{}", endpoint.url),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Load {
            urls,
            scan,
            rps,
            concurrency,
            duration,
            interval_ms,
            max_error_rate,
        } => {
            load(
                &config_path,
                urls,
                scan,
                rps,
                concurrency,
                duration,
                interval_ms,
                max_error_rate,
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn load(
    config_path: &Path,
    urls: Vec<String>,
    scan: bool,
    rps: Option<u32>,
    concurrency: usize,
    duration: u64,
    interval_ms: u64,
    max_error_rate: Option<f64>,
) -> Result<ExitCode> {
    let config = PulseConfig::load_from(config_path)?;
    let mut registry = commands::build_registry(&urls, &config)?;

    if scan {
        let scanner_config = ScannerConfig {
            ports: config.default_ports.clone(),
            ..ScannerConfig::default()
        };
        for endpoint in commands::scan(scanner_config, None).await? {
            registry.add(endpoint);
        }
    }

    let settings = LoadSettings {
        rps: rps.unwrap_or(config.load_test_rps),
        tester: TesterOptions {
            concurrency,
            max_concurrency: config.max_concurrency,
            client_timeout: Duration::from_secs(config.timeout_secs),
        },
        duration: (duration > 0).then(|| Duration::from_secs(duration)),
        report_interval: Duration::from_millis(interval_ms),
        max_error_rate,
    };

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let summary =
        commands::run_load(&registry, &settings, shutdown, |line| println!("{line}")).await?;
    if summary.passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        for url in &summary.failing {
            eprintln!(
                "error rate above {:.1}%: {url}",
                max_error_rate.unwrap_or_default()
            );
        }
        Ok(ExitCode::from(EXIT_THRESHOLD_EXCEEDED))
    }
}
