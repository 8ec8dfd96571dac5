//! Terminal Farm daemon - keeps trading terminals in line with the control plane
//!
//! The daemon:
//! - Polls the control plane for the desired set of terminals
//! - Creates, starts, stops and removes labeled containers to match it
//! - Leaves anything it does not own alone
//! - Shuts down gracefully on Ctrl+C / SIGTERM

use clap::Parser;
use farm_daemon::config::FarmConfig;
use farm_daemon::error::{DaemonError, DaemonResult};
use farm_daemon::fetcher::HttpConfigFetcher;
use farm_daemon::runtime::{DockerRuntime, TimedRuntime};
use farm_daemon::scheduler::{CycleOutcome, PollLoop, Reconciler, TokioClock};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Terminal Farm Daemon CLI
#[derive(Parser)]
#[command(name = "farmd")]
#[command(about = "Terminal Farm - container reconciliation daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FARM_CONFIG")]
    config: Option<String>,

    /// Control plane base URL
    #[arg(long, env = "API_ENDPOINT")]
    api_endpoint: Option<String>,

    /// Shared secret for the control plane
    #[arg(long, env = "ORCHESTRATOR_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Image terminals are launched from
    #[arg(long, env = "IMAGE_NAME")]
    image: Option<String>,

    /// Seconds between poll cycles
    #[arg(long, env = "POLL_INTERVAL")]
    poll_interval: Option<u64>,

    /// Stop and remove managed containers no record refers to
    #[arg(long, env = "FARM_ORPHAN_CLEANUP")]
    orphan_cleanup: bool,

    /// Plan and log actions without executing them
    #[arg(long, env = "FARM_DRY_RUN")]
    dry_run: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log level
    #[arg(long, env = "FARM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "FARM_LOG_JSON")]
    json: bool,
}

impl Cli {
    /// Flags and recognized variables take precedence over the config file
    fn apply(&self, config: &mut FarmConfig) {
        if let Some(endpoint) = &self.api_endpoint {
            config.control_plane.endpoint = endpoint.clone();
        }
        if let Some(secret) = &self.secret {
            config.control_plane.secret = secret.clone();
        }
        if let Some(image) = &self.image {
            config.runtime.image = image.clone();
        }
        if let Some(secs) = self.poll_interval {
            config.scheduler.poll_interval_secs = secs;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        config.scheduler.orphan_cleanup |= self.orphan_cleanup;
        config.scheduler.dry_run |= self.dry_run;
        config.logging.json |= self.json;
    }
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = FarmConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate().map_err(DaemonError::Config)?;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Print startup banner
    println!(
        r#"
  Terminal Farm - Orchestrator
  Version: {}
  Control plane: {}
  Image: {}
  Poll interval: {}s
  Orphan cleanup: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.control_plane.endpoint,
        config.runtime.image,
        config.scheduler.poll_interval_secs,
        config.scheduler.orphan_cleanup,
    );

    // The runtime handle is created once and reused by every cycle
    let docker = DockerRuntime::connect(config.runtime.stop_timeout_secs)
        .await?
        .with_auto_pull(config.runtime.auto_pull_image);
    let runtime = Arc::new(TimedRuntime::new(docker, config.runtime.operation_timeout()));

    let fetcher = HttpConfigFetcher::new(&config.control_plane)
        .map_err(|e| DaemonError::Config(format!("Invalid control plane client: {}", e)))?;

    let poll_loop = PollLoop::new(
        Arc::new(fetcher),
        runtime,
        Arc::new(TokioClock),
        Reconciler::from_config(&config),
        config.runtime.ownership_label(),
        config.scheduler.poll_interval(),
    );

    tracing::info!(dry_run = config.scheduler.dry_run, "Starting Terminal Farm orchestrator");

    if cli.once {
        match poll_loop.run_once().await {
            CycleOutcome::Reconciled(report) => {
                tracing::info!(failed = report.failed(), "Single cycle finished");
            }
            other => tracing::info!(outcome = ?other, "Single cycle finished"),
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    poll_loop.run(shutdown_rx).await;

    tracing::info!("Terminal Farm orchestrator shut down");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, finishing current cycle");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, finishing current cycle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::collections::HashMap;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("farmd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--api-endpoint",
            "https://cp.internal",
            "--secret",
            "s3cret",
            "--image",
            "registry.local/mt5:2",
            "--poll-interval",
            "15",
        ]);

        let mut config = FarmConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.control_plane.endpoint, "https://cp.internal");
        assert_eq!(config.control_plane.secret, "s3cret");
        assert_eq!(config.runtime.image, "registry.local/mt5:2");
        assert_eq!(config.scheduler.poll_interval_secs, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags_win_over_config_layers() {
        let farm_env = HashMap::from([
            ("FARM_RUNTIME__IMAGE".to_string(), "from-farm-env".to_string()),
            ("FARM_SCHEDULER__POLL_INTERVAL_SECS".to_string(), "90".to_string()),
        ]);
        let mut config = FarmConfig::load_with_env(None, Some(farm_env)).unwrap();
        assert_eq!(config.runtime.image, "from-farm-env");

        let cli = parse(&["--image", "from-cli", "--poll-interval", "5"]);
        cli.apply(&mut config);

        assert_eq!(config.runtime.image, "from-cli");
        assert_eq!(config.scheduler.poll_interval_secs, 5);
    }

    #[test]
    fn test_required_variables_are_read() {
        // Values are valid for every other test in this module, which may
        // parse while they are set.
        std::env::set_var("API_ENDPOINT", "https://cp.from-env");
        std::env::set_var("ORCHESTRATOR_SECRET", "env-secret");
        std::env::set_var("IMAGE_NAME", "env/mt5:3");
        std::env::set_var("POLL_INTERVAL", "45");

        let cli = Cli::try_parse_from(["farmd"]);

        std::env::remove_var("API_ENDPOINT");
        std::env::remove_var("ORCHESTRATOR_SECRET");
        std::env::remove_var("IMAGE_NAME");
        std::env::remove_var("POLL_INTERVAL");

        let mut config = FarmConfig::default();
        cli.unwrap().apply(&mut config);

        assert_eq!(config.control_plane.endpoint, "https://cp.from-env");
        assert_eq!(config.control_plane.secret, "env-secret");
        assert_eq!(config.runtime.image, "env/mt5:3");
        assert_eq!(config.scheduler.poll_interval_secs, 45);
    }

    #[test]
    fn test_non_integer_poll_interval_rejected() {
        let result = Cli::try_parse_from(["farmd", "--poll-interval", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_switches_only_turn_on() {
        let mut config = FarmConfig::default();
        config.scheduler.orphan_cleanup = true;

        parse(&["--dry-run"]).apply(&mut config);

        assert!(config.scheduler.orphan_cleanup);
        assert!(config.scheduler.dry_run);
    }
}
