use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use autorefresh_core::{
    config::{ensure_parent_dir, AutoRefreshConfig},
    Clock, SystemClock,
};
use autorefresh_scheduler::{AlarmScheduler, TimerController, TokioAlarms};
use autorefresh_store::{SqliteKv, TimerStore};
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

mod app;
mod http;
mod notify;
mod runtime;
mod tabs;
mod ws;

const DEFAULT_LOG_FILTER: &str =
    "autorefresh_daemon=info,autorefresh_scheduler=info,autorefresh_store=info,tower_http=debug";
const USER_AGENT: &str = concat!("autorefresh/", env!("CARGO_PKG_VERSION"));
const RELOAD_TIMEOUT_SECS: u64 = 30;
const ALARM_QUEUE: usize = 256;
const COMMAND_QUEUE: usize = 64;
const EMAIL_QUEUE: usize = 64;

#[derive(Debug, Parser)]
#[command(name = "autorefresh-daemon", version, about = "Scheduled page refresh daemon")]
struct Cli {
    /// Config file (default: ~/.autorefresh/autorefresh.toml)
    #[arg(long, env = "AUTOREFRESH_CONFIG")]
    config: Option<String>,

    /// Listen port, overrides [server].port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AutoRefreshConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        AutoRefreshConfig::default()
    });
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path)?;
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(&db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(TimerStore::new(Arc::new(SqliteKv::new(db)?), clock.clone()));

    let page_client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(RELOAD_TIMEOUT_SECS))
        .build()?;
    let tabs = Arc::new(tabs::HttpTabHost::from_seeds(&config.tabs, page_client));
    let broadcaster = Arc::new(ws::EventBroadcaster::new());

    // Notifier -> e-mail delivery task
    let (email_tx, email_rx) = mpsc::channel::<notify::EmailJob>(EMAIL_QUEUE);
    let email_client = notify::EmailClient::new(&config.email)?;
    tokio::spawn(notify::run_email_delivery(email_rx, email_client));
    let notifier = Arc::new(notify::DaemonNotifier::new(broadcaster.clone(), email_tx));

    let (alarms, alarm_rx) = TokioAlarms::channel(ALARM_QUEUE);
    let scheduler = AlarmScheduler::new(Arc::new(alarms), clock);
    let mut controller = TimerController::new(store.clone(), scheduler, tabs.clone(), notifier);
    match controller.restore() {
        Ok(count) => info!(timers = count, "timers restored"),
        Err(e) => error!(error = %e, "failed to restore timers, starting empty"),
    }

    let (runtime, command_rx) = runtime::channel(COMMAND_QUEUE);
    let cleanup_every = Duration::from_secs(config.scheduler.history_cleanup_interval_secs.max(1));
    let event_loop = runtime::EventLoop::new(controller, command_rx, alarm_rx, cleanup_every);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_task = tokio::spawn(event_loop.run(shutdown_rx));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let state = Arc::new(app::AppState::new(
        config,
        store,
        runtime,
        tabs,
        broadcaster,
    ));
    ws::spawn_store_forwarder(state.clone());
    let router = app::build_router(state);

    info!("AutoRefresh daemon listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop the scheduler after the server drained
    let _ = shutdown_tx.send(true);
    let _ = loop_task.await;
    info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
