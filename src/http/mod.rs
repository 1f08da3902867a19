//! HTTP surface (§6): versioned under `/v1/`, every response wrapped as
//! `{"data": ...}`, every error mapped to 400 except unexpected defects.

pub mod dto;
pub mod handlers;
pub mod server;

pub use server::{router, AppState};
