//! Service entry point: HTTP API plus the command dispatcher.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use bus::{AmqpBus, AmqpConfig};
use dispatcher::Dispatcher;
use ledger::PostgresLedgerStore;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Ledger store
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let store = PostgresLedgerStore::new(pool);
    if config.run_migrations {
        store.run_migrations().await?;
        tracing::info!("migrations applied");
    }

    // 4. Message bus
    let bus = AmqpBus::connect(
        AmqpConfig::new(&config.amqp_url, &config.amqp_exchange)
            .with_prefetch(config.amqp_prefetch),
    )
    .await?;

    // 5. Shared state and dispatcher
    let state = Arc::new(api::AppState::new(store.clone(), bus.clone()));
    let dispatcher = Dispatcher::start(&bus, Arc::clone(&state.coordinator)).await?;

    // 6. Serve HTTP until a shutdown signal arrives
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, topics = ?dispatcher.topics(), "starting warehouse stock service");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // 7. Drain the dispatcher, then release connections
    for report in dispatcher.shutdown().await {
        if let Err(e) = &report.outcome {
            tracing::error!(topic = %report.topic, error = %e, "worker ended with an error");
        }
    }
    bus.close();
    store.close().await;

    served?;
    tracing::info!("server shut down gracefully");
    Ok(())
}
