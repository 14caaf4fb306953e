use clap::Parser;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fieldwatch::db::repository::{ChannelRepository, MonitorRepository};
use fieldwatch::db::schema;
use fieldwatch::db::services::DbRepository;
use fieldwatch::monitoring::executor::CheckExecutor;
use fieldwatch::monitoring::retry::{RetryController, RetryPolicy};
use fieldwatch::monitoring::scheduler::{Scheduler, SchedulerConfig};
use fieldwatch::monitoring::shutdown::Shutdown;
use fieldwatch::notifications::encryption::EncryptionService;
use fieldwatch::notifications::service::NotificationDispatcher;
use fieldwatch::server::config::ServerConfig;
use fieldwatch::web::{create_axum_router, payload_cache::PayloadCache, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // JSON lines, rotated daily.
    let file_appender = rolling::daily(log_dir, "fieldwatch.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c.");
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = ServerConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting fieldwatch.");

    // --- Database ---
    let mut opt = ConnectOptions::new(config.database_url.clone());
    opt.max_connections(10).sqlx_logging(false);
    let db: DatabaseConnection = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "Failed to connect to database.");
        e
    })?;
    schema::bootstrap(&db).await?;
    info!("Database schema ready.");

    // --- Services ---
    let encryption = Arc::new(EncryptionService::new(&config.notification_encryption_key)?);
    let repository = Arc::new(DbRepository::new(db, encryption));
    let monitors: Arc<dyn MonitorRepository> = repository.clone();
    let channels: Arc<dyn ChannelRepository> = repository;

    let executor = CheckExecutor::new(config.request_timeout(), config.max_response_body_bytes)?;
    let retry = RetryController::new(
        executor.clone(),
        monitors.clone(),
        RetryPolicy {
            max_retries: config.max_retries,
            ..RetryPolicy::default()
        },
    );
    let scheduler = Scheduler::new(
        monitors.clone(),
        retry,
        NotificationDispatcher::new(channels),
        SchedulerConfig {
            tick_interval: config.tick_interval(),
            checks_history_limit: config.checks_history_limit,
            default_timezone: config.default_timezone.clone(),
        },
    );

    let (shutdown_trigger, shutdown) = Shutdown::new();
    let scheduler_task = tokio::spawn(async move { scheduler.run(shutdown).await });

    // --- HTTP ---
    let app_state = Arc::new(AppState {
        repository: monitors,
        payload_cache: PayloadCache::new(executor.max_response_body_bytes()),
        executor,
    });
    let app = create_axum_router(app_state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "HTTP server listening.");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown_trigger.trigger();
    if let Err(e) = scheduler_task.await {
        error!(error = %e, "Scheduler task ended abnormally.");
    }
    served?;
    info!("fieldwatch stopped.");
    Ok(())
}
