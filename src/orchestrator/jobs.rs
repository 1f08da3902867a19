//! The durable monitor-job queue (§5, §6: "A durable queue with
//! at-least-once delivery; monitor tasks carry only primitive arguments").

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use serde::{Deserialize, Serialize};

use crate::errors::QueueError;

pub const MONITOR_QUEUE_NAME: &str = "provisioner.monitor_jobs";

/// A monitor job carries only primitive arguments and re-reads all other
/// state from the store on execution (§6), so re-delivery is always safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorJob {
    Stack { jurisdiction_id: i64, interim: bool, key: Option<String> },
    Network { jurisdiction_id: i64 },
    Nodes { jurisdiction_id: i64 },
    Decommission { jurisdiction_id: i64, nodes_stack_id: String, network_stack_id: String },
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: MonitorJob) -> Result<(), QueueError>;
}

pub struct LapinJobQueue {
    channel: Channel,
}

impl LapinJobQueue {
    pub async fn new(channel: Channel) -> Result<Self, QueueError> {
        channel
            .queue_declare(MONITOR_QUEUE_NAME, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
            .await
            .map_err(|e| QueueError::Amqp(e.to_string()))?;
        Ok(LapinJobQueue { channel })
    }
}

#[async_trait]
impl JobQueue for LapinJobQueue {
    async fn enqueue(&self, job: MonitorJob) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(&job)?;
        self.channel
            .basic_publish(
                "",
                MONITOR_QUEUE_NAME,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| QueueError::Amqp(e.to_string()))?;
        Ok(())
    }
}

/// In-process queue used by tests and by single-process demo runs; jobs
/// are drained with [`InMemoryJobQueue::drain`] rather than consumed over
/// AMQP.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: std::sync::Mutex<Vec<MonitorJob>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<MonitorJob> {
        std::mem::take(&mut self.jobs.lock().unwrap())
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: MonitorJob) -> Result<(), QueueError> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}
