use std::sync::Arc;

use txdash::{
    api::dashboard,
    core::prelude::*,
    domain::prelude::*,
    store::Store,
    stream::prelude::*,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("txdash=debug,info")),
        )
        .init();

    let config = Config::from_env();
    config.validate()?;

    let store = Arc::new(match &config.database {
        DatabaseLocation::File(path) => Store::open(path)?,
        DatabaseLocation::Memory => Store::open_in_memory()?,
    });
    let catalog = Arc::new(Catalog::default());

    let producer = Arc::new(Producer::new(store.clone(), catalog.clone(), config.batch_size.clone())?);
    let scheduler = Scheduler::start(producer, config.ingest_interval);

    let app = dashboard::router(AppState::new(store, catalog));
    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str()).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    scheduler.stop().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
