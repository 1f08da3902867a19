//! HTTP entry point (§6). Reads connection settings from the environment,
//! runs pending migrations, and serves the `/v1/` surface.

use std::sync::Arc;

use provisioner::cloud::aws::AwsCloudAdapter;
use provisioner::http::{router, AppState};
use provisioner::orchestrator::jobs::LapinJobQueue;
use provisioner::orchestrator::EngineContext;
use provisioner::store::postgres::PostgresStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).json().init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let amqp_url = std::env::var("AMQP_URL").expect("AMQP_URL must be set");
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let store = PostgresStore::connect(&database_url).await?;
    store.migrate().await?;
    let store = Arc::new(store);

    let cloud = Arc::new(AwsCloudAdapter::from_env().await);

    let amqp = lapin::Connection::connect(&amqp_url, lapin::ConnectionProperties::default()).await?;
    let channel = amqp.create_channel().await?;
    let queue = Arc::new(LapinJobQueue::new(channel).await?);

    let engine = EngineContext { store: store.clone(), cloud, queue };
    let state = AppState { store, engine };

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");
    axum::serve(listener, router(state)).await?;

    Ok(())
}
