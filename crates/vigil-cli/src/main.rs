//! `vigil` – runs the telemetry ingestion pipeline.
//!
//! 1. Loads `~/.vigil/config.toml`, writing defaults on first run.
//! 2. Restores the persisted control state into the capability registry.
//! 3. Starts the transport subscriber and the WebSocket notification bridge.
//! 4. Logs a status line periodically until **Ctrl-C**, then stops the
//!    transport and saves the control state.

mod config;

use std::net::SocketAddr;
use std::time::Duration;

use colored::Colorize;
use tracing::{error, info, warn};
use vigil_kernel::ControlStore;
use vigil_runtime::AppContext;
use vigil_types::{HealthStatus, VigilError};

use config::Config;

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

fn main() {
    let _tracing = vigil_runtime::init_tracing("vigil");
    print_banner();

    let cfg = load_config();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start the async runtime".red());
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(cfg)) {
        error!(error = %e, "vigil exited with an error");
        eprintln!("{}: {e}", "Error".red().bold());
        std::process::exit(1);
    }
}

fn load_config() -> Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let mut cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {e}", "Error saving config".red()),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {e}", "Config error".red());
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

async fn run(cfg: Config) -> Result<(), VigilError> {
    let ctx = AppContext::new(cfg.pipeline());

    let store = ControlStore::new(cfg.state_dir(), cfg.state.max_backups);
    match store.load() {
        Ok(Some(snapshot)) => {
            let applied = ctx.registry.restore(&snapshot);
            println!("  Restored control state ({applied} signal switches)");
        }
        Ok(None) => info!(dir = %cfg.state_dir().display(), "no persisted control state"),
        Err(e) => warn!(error = %e, "could not read persisted control state"),
    }

    ctx.subscriber.start()?;
    println!(
        "  Subscribing to {} topic(s) on {}",
        ctx.subscriber.subscribed_topics().len(),
        cfg.transport.endpoints.join(", ").bold()
    );

    let bridge = if cfg.bridge.enabled {
        let addr: SocketAddr = format!("{}:{}", cfg.bridge.bind, cfg.bridge.port)
            .parse()
            .map_err(|e| VigilError::Channel(format!("invalid bridge address: {e}")))?;
        println!("  Notification bridge on {}", format!("ws://{addr}").bold());
        let bridge = ctx.bridge();
        Some(tokio::spawn(async move {
            if let Err(e) = bridge.run(addr).await {
                error!(error = %e, "notification bridge stopped");
            }
        }))
    } else {
        None
    };

    println!("\n  Press {} to stop.\n", "Ctrl-C".bold().cyan());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;
    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "Ctrl-C listener failed; shutting down");
                }
                break;
            }
            _ = status.tick() => log_status(&ctx),
        }
    }

    println!();
    println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
    ctx.subscriber.stop().await;
    if let Some(task) = bridge {
        task.abort();
    }

    let path = store.save(&ctx.registry.snapshot())?;
    println!("{}", format!("  ✓ Control state saved to {}", path.display()).green());
    println!("{}", "  ✓ Exiting Vigil.".green());
    Ok(())
}

fn log_status(ctx: &AppContext) {
    let status = ctx.status();
    let worst = status.transport.health.status.max(status.pipeline.status);
    let open: usize = ctx.orchestrator.open_anomalies().values().map(Vec::len).sum();
    match worst {
        HealthStatus::Healthy => info!(
            transport = ?status.transport.state,
            processed = status.stats.processed,
            open_anomalies = open,
            "status"
        ),
        _ => warn!(
            transport = ?status.transport.state,
            processed = status.stats.processed,
            errors = status.stats.errors,
            open_anomalies = open,
            issues = ?[&status.transport.health.issues[..], &status.pipeline.issues[..]].concat(),
            warnings = ?[&status.transport.health.warnings[..], &status.pipeline.warnings[..]].concat(),
            "status degraded"
        ),
    }
}

fn print_banner() {
    println!();
    println!("{}", r#" _    ___       _ __"#.bold().cyan());
    println!("{}", r#"| |  / (_)___ _(_) /"#.bold().cyan());
    println!("{}", r#"| | / / / __ `/ / / "#.bold().cyan());
    println!("{}", r#"| |/ / / /_/ / / /  "#.bold().cyan());
    println!("{}", r#"|___/_/\__, /_/_/   "#.bold().cyan());
    println!("{}", r#"      /____/        "#.bold().cyan());
    println!();
    println!("  {} {}", "Vigil".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Driver telemetry ingestion & anomaly engine");
    println!();
}
