//! Background worker entry point (§5): consumes `MonitorJob`s from the
//! durable AMQP queue and dispatches each to the matching monitor function.
//! Monitor tasks are long-running (30 s polling intervals up to ~15 min);
//! each delivery is handled on its own spawned task so a single slow
//! monitor never blocks the consumer loop.

use std::sync::Arc;

use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use provisioner::cloud::aws::AwsCloudAdapter;
use provisioner::orchestrator::jobs::{LapinJobQueue, MonitorJob, MONITOR_QUEUE_NAME};
use provisioner::orchestrator::monitor::{self, PollPolicy};
use provisioner::orchestrator::EngineContext;
use provisioner::store::postgres::PostgresStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).json().init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let amqp_url = std::env::var("AMQP_URL").expect("AMQP_URL must be set");

    let store = Arc::new(PostgresStore::connect(&database_url).await?);
    let cloud = Arc::new(AwsCloudAdapter::from_env().await);

    let amqp = lapin::Connection::connect(&amqp_url, lapin::ConnectionProperties::default()).await?;
    let channel = amqp.create_channel().await?;
    channel.basic_qos(8, BasicQosOptions::default()).await?;
    let queue = Arc::new(LapinJobQueue::new(channel.clone()).await?);

    let engine = EngineContext { store, cloud, queue };

    let mut consumer = channel
        .basic_consume(MONITOR_QUEUE_NAME, "provisioner-worker", BasicConsumeOptions::default(), FieldTable::default())
        .await?;

    tracing::info!("worker listening on {MONITOR_QUEUE_NAME}");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(error) => {
                tracing::warn!(%error, "failed to receive delivery");
                continue;
            }
        };

        let engine = engine.clone();
        tokio::spawn(async move {
            match serde_json::from_slice::<MonitorJob>(&delivery.data) {
                Ok(job) => {
                    if let Err(error) = dispatch(&engine, job).await {
                        tracing::warn!(%error, "monitor job failed");
                    }
                    let _ = delivery.ack(BasicAckOptions::default()).await;
                }
                Err(error) => {
                    tracing::warn!(%error, "failed to decode monitor job, dropping");
                    let _ = delivery.nack(BasicNackOptions { requeue: false, ..Default::default() }).await;
                }
            }
        });
    }

    Ok(())
}

async fn dispatch(engine: &EngineContext, job: MonitorJob) -> Result<(), provisioner::errors::ProvisionerError> {
    let policy = PollPolicy::default();
    match job {
        MonitorJob::Stack { jurisdiction_id, interim, key } => monitor::monitor_stack(engine, jurisdiction_id, interim, key, &policy).await,
        MonitorJob::Network { jurisdiction_id } => monitor::monitor_network(engine, jurisdiction_id, &policy).await,
        MonitorJob::Nodes { jurisdiction_id } => monitor::monitor_nodes(engine, jurisdiction_id, &policy).await,
        MonitorJob::Decommission { jurisdiction_id, nodes_stack_id, network_stack_id } => {
            monitor::monitor_decommission(engine, jurisdiction_id, &nodes_stack_id, &network_stack_id, &policy).await
        }
    }
}
