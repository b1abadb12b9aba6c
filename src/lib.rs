//! Watchtower — synthetic uptime-monitoring core.
//!
//! This crate is the monitoring backend: a scheduler that runs one probe
//! loop per enabled endpoint, a per-endpoint circuit breaker guarding each
//! probe, a statistics engine computing rolling uptime, a live event bus
//! fanning updates out to subscribers, and a retention job that rolls up
//! and prunes old checks. The HTTP/REST surface, auth, and UI are out of
//! scope here; callers drive the crate through [`scheduler::Engine`].

pub mod breaker;
pub mod bus;
pub mod config;
pub mod error;
pub mod prober;
pub mod retention;
pub mod scheduler;
pub mod stats;
pub mod store;

pub use config::WatchtowerConfig;
pub use error::WatchtowerError;
pub use scheduler::Engine;
