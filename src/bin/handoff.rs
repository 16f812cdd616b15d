//! handoff CLI: run the coordinator or inspect submission history.

use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use handoff_rs::config::{Config, StoreConfig, log_level};
use handoff_rs::config::secrets::{ExposeSecret, redacted_url};
use handoff_rs::db::Db;
use handoff_rs::engine::{Coordinator, Dispatcher, Inbound};
use handoff_rs::history::file::JsonFileBackend;
use handoff_rs::history::{Durable, HistoryFilter, HistoryStore, report};
use handoff_rs::model::{ActorId, actor_label};
use handoff_rs::telemetry::{TelemetryConfig, init_telemetry};
use handoff_rs::transport::{AllowList, ConsoleTransport};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "handoff", about = "Hand submissions to operators, one at a time")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the coordinator: JSON events on stdin, JSON notices on stdout
    Serve {
        /// Capacity of the inbound event channel
        #[arg(long, default_value_t = 256)]
        channel_capacity: usize,
    },
    /// Submission history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Resolved submissions grouped by date
    Report {
        /// First date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Only this submitter
        #[arg(long)]
        submitter: Option<i64>,
    },
    /// Submissions not yet resolved
    Pending,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { channel_capacity } => {
            cmd_serve(Config::from_env()?, channel_capacity).await
        }
        Command::History { action } => {
            // Logs go to stderr; stdout carries the report.
            let _guard = init_telemetry(TelemetryConfig {
                endpoint: None,
                service_name: "handoff".to_string(),
                default_filter: log_level(),
            })?;
            let backend = open_backend(&StoreConfig::from_env()).await?;
            match action {
                HistoryAction::Report {
                    from,
                    to,
                    submitter,
                } => cmd_history_report(backend, from, to, submitter).await,
                HistoryAction::Pending => cmd_history_pending(backend).await,
            }
        }
    }
}

/// Postgres when `DATABASE_URL` is set, the JSON file otherwise.
async fn open_backend(store: &StoreConfig) -> anyhow::Result<Arc<dyn Durable>> {
    match &store.database_url {
        Some(url) => {
            info!(url = %redacted_url(url), "using postgres history");
            let db = Db::connect(url.expose_secret()).await?;
            db.migrate().await?;
            db.health_check().await?;
            Ok(Arc::new(db))
        }
        None => {
            info!(path = %store.history_path.display(), "using history file");
            Ok(Arc::new(JsonFileBackend::open(&store.history_path).await?))
        }
    }
}

async fn cmd_serve(config: Config, channel_capacity: usize) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "handoff".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let history = HistoryStore::open(open_backend(&config.store).await?).await?;
    let membership = match &config.eligible_ids {
        Some(ids) => AllowList::only(ids.iter().copied()),
        None => AllowList::open(),
    };
    let coordinator = Arc::new(Coordinator::new(
        config.operator_ids.clone(),
        Arc::new(ConsoleTransport::new()),
        Arc::new(membership),
        history,
    ));
    let dispatcher = Dispatcher::new(coordinator);

    let (tx, rx) = mpsc::channel(channel_capacity);
    tokio::spawn(read_stdin(tx));

    let d = dispatcher.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        d.shutdown();
    });

    info!(operators = config.operator_ids.len(), "handoff serving");
    dispatcher.run(rx).await?;
    Ok(())
}

/// Forward newline-delimited JSON events into the dispatcher. Malformed
/// lines are logged and skipped.
async fn read_stdin(tx: mpsc::Sender<Inbound>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Inbound>(&line) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!(error = %e, "unparseable inbound event"),
        }
    }
}

async fn cmd_history_report(
    backend: Arc<dyn Durable>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    submitter: Option<i64>,
) -> anyhow::Result<()> {
    let history = match (from, to) {
        (Some(from), Some(to)) => HistoryStore::open_range(backend, from, to).await?,
        _ => HistoryStore::open(backend).await?,
    };
    let filter = HistoryFilter {
        from,
        to,
        submitter: submitter.map(ActorId),
        ..HistoryFilter::resolved()
    };
    for chunk in report::render(&history.query(&filter).await) {
        println!("{chunk}");
    }
    Ok(())
}

async fn cmd_history_pending(backend: Arc<dyn Durable>) -> anyhow::Result<()> {
    let history = HistoryStore::open(backend).await?;
    let pending = history.query(&HistoryFilter::pending_only()).await;

    if pending.is_empty() {
        println!("No pending submissions.");
        return Ok(());
    }

    println!("{:<12}  {:<24}  {:<14}  CREATED", "DATE", "SUBMITTER", "PHONE");
    println!("{}", "-".repeat(72));
    for entry in &pending {
        println!(
            "{:<12}  {:<24}  +{:<13}  {}",
            entry.date,
            actor_label(entry.submitter, entry.submitter_handle.as_deref()),
            entry.payload,
            entry.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("\n{} pending", pending.len());
    Ok(())
}
