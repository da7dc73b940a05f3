use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::ratelimit::{
    resolve_identifier, CleanupScheduler, Clock, LimiterRegistry, RateLimitDecision, SystemClock,
};

/// Replay admission checks read from stdin against the configured limiters.
///
/// Each input line is `<limiter> [user_id|-] [ip|-]`; one JSON decision is
/// printed per line.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the cleanup sweep interval
    #[arg(long)]
    cleanup_interval_secs: Option<u64>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Outcome<'a> {
    limiter: &'a str,
    identifier: &'a str,
    #[serde(flatten)]
    decision: &'a RateLimitDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => TurnstileConfig::from_file(path)?,
        None => TurnstileConfig::default(),
    };
    if let Some(secs) = args.cleanup_interval_secs {
        config.cleanup.interval_secs = secs;
    }
    info!(cleanup_interval_secs = config.cleanup.interval_secs, "Configuration loaded");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(LimiterRegistry::with_clock(&config.limiters, clock.clone())?);

    let scheduler = CleanupScheduler::new(registry.clone(), config.cleanup.interval());
    scheduler.start()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if let Some(output) = replay_line(&registry, clock.as_ref(), &line)? {
                            println!("{}", output);
                        }
                    }
                    None => {
                        info!("Input closed");
                        break;
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }

    scheduler.stop().await;
    info!(tracked = registry.entry_count(), "Turnstile stopped");
    Ok(())
}

/// Run one input line through its limiter and render the decision as JSON.
///
/// Blank lines and unknown limiter names produce no output.
fn replay_line(
    registry: &LimiterRegistry,
    clock: &dyn Clock,
    line: &str,
) -> anyhow::Result<Option<String>> {
    let mut fields = line.split_whitespace();
    let Some(name) = fields.next() else {
        return Ok(None);
    };
    let user_id = present(fields.next());
    let ip = present(fields.next());

    let Some(limiter) = registry.get_by_name(name) else {
        warn!(limiter = name, "Unknown limiter, skipping line");
        return Ok(None);
    };

    let identifier = resolve_identifier(user_id, ip);
    let decision = limiter.check(&identifier);
    let outcome = Outcome {
        limiter: name,
        identifier: &identifier,
        decision: &decision,
        retry_after_ms: decision
            .retry_after(clock.now_ms())
            .map(|wait| u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)),
    };

    Ok(Some(serde_json::to_string(&outcome)?))
}

/// A `-` placeholder marks a missing field.
fn present(field: Option<&str>) -> Option<&str> {
    field.filter(|value| *value != "-")
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
