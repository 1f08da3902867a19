//! The provisioning orchestrator (§4.6): the durable state machine at the
//! center of the system. `provision`/`decommission` are the synchronous
//! prologues invoked from the HTTP surface inside a request; the `monitor`
//! functions are invoked by worker processes draining the job queue.

pub mod decommission;
pub mod jobs;
pub mod json_ext;
pub mod monitor;
pub mod provision;
pub mod state;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use decommission::decommission;
pub use provision::provision;

use crate::cloud::CloudAdapter;
use crate::store::Store;
use jobs::JobQueue;

/// Explicitly passed context object rather than process-wide globals for
/// the store handle and queue client (§9: "factor into a small, explicitly
/// passed context object rather than a process-wide singleton").
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn Store>,
    pub cloud: Arc<dyn CloudAdapter>,
    pub queue: Arc<dyn JobQueue>,
}
