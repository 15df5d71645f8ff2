use clap::Parser;
use serde::Serialize;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::{LogFormat, LoggingConfig, TollgateConfig};
use tollgate::ratelimit::{Caller, LimiterRegistry, Tier};

/// Drive demo traffic for one caller through the admission registry.
#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about)]
struct Cli {
    /// Caller id to send requests as
    #[arg(long, default_value = "u1")]
    caller: String,

    /// Starting tier of the caller
    #[arg(long, default_value = "free")]
    tier: Tier,

    /// Requests to send before the upgrade
    #[arg(long, default_value_t = 7)]
    requests: u32,

    /// Tier to upgrade the caller to after the first batch
    #[arg(long, default_value = "premium2")]
    upgrade_to: Tier,

    /// Skip the upgrade and second batch
    #[arg(long)]
    no_upgrade: bool,

    /// Requests to send after the upgrade
    #[arg(long, default_value_t = 100)]
    after_upgrade: u32,

    /// Delay between requests in milliseconds
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,

    /// YAML configuration file
    #[arg(long)]
    config: Option<String>,

    /// YAML policy table, overriding the configuration file
    #[arg(long)]
    policy_file: Option<String>,

    /// Print the decision transcript as JSON
    #[arg(long)]
    json: bool,
}

/// One admission decision made during the demo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct DecisionRecord {
    caller: String,
    tier: Tier,
    request: u32,
    admitted: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TollgateConfig::from_file(path)?,
        None => TollgateConfig::default(),
    };
    if let Some(path) = &cli.policy_file {
        config.policy.path = Some(path.clone());
    }

    init_tracing(&config.logging)?;

    info!("Starting Tollgate admission demo");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let registry = LimiterRegistry::with_policies(config.policy_table()?);
    info!(policy_file = ?config.policy.path, "Limiter registry initialized");

    let transcript = tokio::select! {
        result = run_demo(&registry, &cli) => result?,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping demo");
            return Ok(());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&transcript)?);
    } else {
        for record in &transcript {
            println!(
                "Request {} ({}): {}",
                record.request,
                record.tier,
                if record.admitted { "Accepted" } else { "Rejected" }
            );
        }
    }

    let admitted = transcript.iter().filter(|r| r.admitted).count();
    info!(
        total = transcript.len(),
        admitted,
        rejected = transcript.len() - admitted,
        "Tollgate admission demo finished"
    );
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => logging.level_filter()?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

/// Send the first batch, optionally upgrade the caller, then send the second batch.
async fn run_demo(registry: &LimiterRegistry, cli: &Cli) -> anyhow::Result<Vec<DecisionRecord>> {
    let mut caller = Caller::new(cli.caller.clone(), cli.tier);
    let pace = Duration::from_millis(cli.interval_ms);

    let mut transcript = send_batch(registry, &caller, cli.requests, pace).await?;

    if !cli.no_upgrade {
        info!("---- Upgrading caller ----");
        registry.upgrade_tier(&mut caller, cli.upgrade_to);
        transcript.extend(send_batch(registry, &caller, cli.after_upgrade, pace).await?);
    }

    Ok(transcript)
}

async fn send_batch(
    registry: &LimiterRegistry,
    caller: &Caller,
    requests: u32,
    pace: Duration,
) -> anyhow::Result<Vec<DecisionRecord>> {
    let mut records = Vec::with_capacity(requests as usize);
    for request in 0..requests {
        if request > 0 && !pace.is_zero() {
            tokio::time::sleep(pace).await;
        }
        let admitted = registry.evaluate_caller(caller)?;
        records.push(DecisionRecord {
            caller: caller.id.clone(),
            tier: caller.tier,
            request,
            admitted,
        });
    }
    Ok(records)
}
