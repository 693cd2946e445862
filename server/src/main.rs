use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use relay_server::broker::{self, nats::NatsPublisher, nats::NatsSource};
use relay_server::clock::{Clock, SystemClock};
use relay_server::config::{generate_config_template, Config, RelayMode};
use relay_server::db::{self, retention::RetentionSweeper};
use relay_server::routes;
use relay_server::state::AppState;
use relay_server::ws::{Broadcaster, ConnectionRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relay_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(env_filter).init();
    }

    tracing::info!(
        mode = ?config.mode,
        "Relay server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let shutdown = CancellationToken::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broadcaster = Broadcaster::new(ConnectionRegistry::new(), config.write_timeout());

    let mut state = AppState::new(broadcaster.clone())
        .with_clock(clock.clone())
        .with_outbound_buffer(config.outbound_buffer)
        .with_shutdown(shutdown.clone());
    let mut background = Vec::new();

    // Failing to reach the store or broker here is fatal
    match config.mode {
        RelayMode::Direct => {}
        RelayMode::Durable => {
            let history = config.history();
            let db = db::init_db(&history.data_dir)?;
            let stored = db::run_blocking(&db, db::messages::count_messages).await?;
            tracing::info!(stored, page_size = history.page_size, "Message history enabled");

            let sweeper = RetentionSweeper::new(
                db.clone(),
                clock.clone(),
                Duration::from_secs(history.retention_secs),
                Duration::from_secs(history.cleanup_interval_secs),
            );
            background.push(sweeper.spawn(shutdown.clone()));
            tracing::info!(
                retention_secs = history.retention_secs,
                cleanup_interval_secs = history.cleanup_interval_secs,
                "Message retention sweep scheduled"
            );

            state = state.with_store(db, history.page_size);
        }
        RelayMode::Broker => {
            let broker_config = config.broker();
            let client = broker::nats::connect(&broker_config).await?;

            if broker_config.consume {
                let source = NatsSource::subscribe(&client, &broker_config).await?;
                let consumer_broadcaster = broadcaster.clone();
                let consumer_shutdown = shutdown.clone();
                background.push(tokio::spawn(async move {
                    broker::run_consumer(source, consumer_broadcaster, consumer_shutdown).await;
                }));
            } else {
                tracing::info!("Broker consumer disabled, running as publish-only ingress");
            }

            state = state.with_publisher(Arc::new(NatsPublisher::new(
                client,
                broker_config.subject.clone(),
            )));
        }
    }

    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    for task in background {
        let _ = task.await;
    }

    tracing::info!("Relay server stopped");
    Ok(())
}

/// Resolves on Ctrl+C and cancels `shutdown`, which closes every
/// subscriber connection and stops background tasks.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
