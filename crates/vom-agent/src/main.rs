//! VOM agent entry point.
//!
//! Loads the configuration, connects to the forwarding engine, brings its
//! routing tables in line and then polls it until interrupted.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info};
use vom_agent::audit::{
    init_logging, init_logging_pretty, AuditCategory, AuditOutcome, AuditRecord,
};
use vom_agent::audit_log;
use vom_agent::config::{AgentConfig, LogFormat};
use vom_agent::daemon::Agent;
use vom_hw::{SimEngine, TableId};

/// Keeps forwarding engine routing tables in sync with configuration
#[derive(Parser, Debug)]
#[command(name = "vom-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Client key to record objects under
    #[arg(long)]
    client: Option<String>,

    /// Routing table to program (repeatable)
    #[arg(short = 't', long = "route-domain")]
    route_domains: Vec<TableId>,

    /// Liveness poll interval in milliseconds
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Human-readable log output instead of JSON
    #[arg(long)]
    pretty: bool,

    /// Table the simulated engine already holds at startup (repeatable)
    #[arg(long = "sim-table")]
    sim_tables: Vec<TableId>,

    /// Run an inspection command after startup, print it and exit
    #[arg(long)]
    show: Option<String>,
}

fn load_config(args: &Args) -> anyhow::Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AgentConfig::default(),
    };

    if let Some(client) = &args.client {
        config.client = client.clone();
    }
    config.route_domains.extend(args.route_domains.iter().copied());
    if let Some(interval) = args.poll_interval {
        config.poll_interval_ms = interval;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if args.pretty {
        config.log_format = LogFormat::Pretty;
    }

    config.validate()?;
    Ok(config)
}

async fn run(args: Args, config: AgentConfig) -> anyhow::Result<()> {
    let engine = SimEngine::new();
    for table_id in &args.sim_tables {
        engine.preload_table(*table_id);
    }
    info!("Using simulated forwarding engine");

    let mut agent = Agent::new(config, Box::new(engine)).context("creating agent")?;
    agent.init().context("initializing agent")?;

    if let Some(command) = &args.show {
        print!("{}", agent.show(command));
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("Received ctrl-c, shutting down");
        let _ = shutdown_tx.send(true);
    });

    agent.run(shutdown_rx).await;

    for line in agent.dump() {
        info!("{}", line);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("vom-agent: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match config.log_format {
        LogFormat::Json => init_logging(&config.log_level),
        LogFormat::Pretty => init_logging_pretty(&config.log_level),
    }

    info!("====================================================================");
    info!("Starting vom-agent");
    info!("====================================================================");
    info!("Client: {}", config.client);
    info!("Poll interval: {}ms", config.poll_interval_ms);
    info!("Route domains: {:?}", config.route_domains);
    audit_log!(
        AuditRecord::new(AuditCategory::ConfigurationChange, "main", "config_loaded")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({
                "file": args.config.as_ref().map(|p| p.display().to_string()),
                "client": config.client,
                "route_domains": config.route_domains,
                "poll_interval_ms": config.poll_interval_ms,
            }))
    );

    match run(args, config).await {
        Ok(()) => {
            info!("vom-agent stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("vom-agent failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
