//! Courtside - caching proxy core for a fantasy sports data API
//!
//! Requests pass a per-session quota, a short-lived response cache and then
//! either the daily bulk snapshots or the upstream API.

pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod output;
pub mod refresh;
pub mod service;
pub mod session;
pub mod store;

pub use error::{Error, Result};
pub use service::{InboundRequest, ProxyService, ResponseSource, ServiceResponse};
