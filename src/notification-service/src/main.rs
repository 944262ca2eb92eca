//! Notification Service entry point.
//!
//! Wires the configured backends and runs either the long-lived server or
//! a one-shot command.

mod runtime;

use clap::{Parser, Subcommand};
use notify_api::{ApiServer, AppState};
use notify_core::config::AppConfig;
use notify_core::types::Channel;
use notify_lifecycle::NewNotification;
use notify_workers::WorkerManager;
use runtime::{Runtime, Transport};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "notification-service")]
#[command(about = "Notification lifecycle and delivery service")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "NOTIFY_CONFIG")]
    config: Option<String>,

    /// Node identifier (overrides config)
    #[arg(long, global = true, env = "NOTIFY__NODE_ID")]
    node_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API, send workers, and retry sweep
    Serve {
        /// Skip worker spawning (API-only mode)
        #[arg(long, default_value_t = false)]
        api_only: bool,

        /// Number of send workers (overrides config)
        #[arg(long)]
        workers: Option<usize>,

        /// HTTP port (overrides config)
        #[arg(long)]
        http_port: Option<u16>,
    },
    /// Create a notification and queue it for sending
    Send {
        #[arg(short, long, value_parser = parse_channel)]
        channel: Channel,

        #[arg(short, long)]
        recipient: String,

        #[arg(short, long)]
        subject: Option<String>,

        #[arg(short, long)]
        message: String,

        /// Leave the notification in draft
        #[arg(long, default_value_t = false)]
        draft: bool,
    },
    /// Show the most recent notifications
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show counts by state and channel
    Stats,
    /// Run one retry sweep now
    Retry,
}

fn parse_channel(s: &str) -> Result<Channel, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "notification_service=info,notify_lifecycle=info,notify_workers=info,tower_http=info"
                    .into()
            }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load_from(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }

    match cli.command {
        Command::Serve {
            api_only,
            workers,
            http_port,
        } => {
            if let Some(count) = workers {
                config.workers.count = count;
            }
            if let Some(port) = http_port {
                config.api.http_port = port;
            }
            serve(config, api_only).await
        }
        Command::Send {
            channel,
            recipient,
            subject,
            message,
            draft,
        } => {
            let rt = Runtime::build(config).await?;
            let mut new = NewNotification::new(channel, recipient, message);
            new.subject = subject;

            let created = rt.submitter.submit(new, !draft).await?;
            rt.drain_local().await;

            let current = rt.store.find_by_id(created.id).await?.unwrap_or(created);
            println!("{}", serde_json::to_string_pretty(&current)?);
            Ok(())
        }
        Command::List { limit } => {
            Runtime::require_shared_store(&config, "list")?;
            let rt = Runtime::build(config).await?;
            let recent = rt.store.recent(limit).await?;
            println!("{}", serde_json::to_string_pretty(&recent)?);
            Ok(())
        }
        Command::Stats => {
            Runtime::require_shared_store(&config, "stats")?;
            let rt = Runtime::build(config).await?;
            let stats = rt.store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Retry => {
            Runtime::require_shared_store(&config, "retry")?;
            let rt = Runtime::build(config).await?;
            let readmitted = rt.sweep.run().await?;
            let handled = rt.drain_local().await;
            println!("{}", serde_json::json!({ "readmitted": readmitted, "processed": handled }));
            Ok(())
        }
    }
}

async fn serve(config: AppConfig, api_only: bool) -> anyhow::Result<()> {
    info!("Notification Service starting up");
    info!(
        node_id = %config.node_id,
        workers = config.workers.count,
        http_port = config.api.http_port,
        "Configuration loaded"
    );

    let rt = Runtime::build(config.clone()).await?;

    let mut manager = WorkerManager::new(config.clone(), rt.pipeline.clone(), rt.sweep.clone());
    if api_only {
        info!("Running in API-only mode (no send workers)");
    } else {
        match &rt.transport {
            Transport::Local(queue) => manager.start_local(queue.clone()),
            Transport::Nats(queue) => manager.start_nats(queue.client().clone()),
        }
    }

    let api_server = ApiServer::new(
        config.clone(),
        AppState {
            store: rt.store.clone(),
            submitter: rt.submitter.clone(),
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
        },
    );

    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Lock and rate-limit maintenance task
    let locks = rt.local_locks.clone();
    let senders = rt.senders.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Some(locks) = &locks {
                let evicted = locks.evict_expired();
                if evicted > 0 {
                    info!(evicted, "Evicted expired lock leases");
                }
            }
            let idle = senders.evict_idle();
            if idle > 0 {
                info!(idle, "Evicted idle rate-limit recipients");
            }
        }
    });

    info!("Notification Service is ready to serve traffic");

    let result = api_server.start_http().await;
    manager.shutdown();
    result
}
