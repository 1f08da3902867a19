//! `jurisdiction-provisioner`: a durable, cloud-backed provisioning engine
//! for a three-level AWS resource hierarchy (control group / tier /
//! cluster). See `DESIGN.md` for the module-by-module grounding ledger.

pub mod cloud;
pub mod cloud_template;
pub mod config_resolver;
pub mod errors;
pub mod http;
pub mod orchestrator;
pub mod pki;
pub mod store;
pub mod userdata;
