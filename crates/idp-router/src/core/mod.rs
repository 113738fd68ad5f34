//! Core routing orchestration.
//!
//! - **Router**: [`DocumentRouter`](router::DocumentRouter) and the reloadable
//!   [`RouterHandle`](router::RouterHandle)
//! - **Configuration**: [`RouterConfig`](config::RouterConfig) loading and validation
//! - **MIME Detection**: declared type, magic bytes, then object key extension
//! - **Payload**: helpers for reading the inbound request payload

pub mod config;
pub mod mime;
pub mod payload;
pub mod router;

pub use config::{AnalyserConfig, ModelAnalyserConfig, RouterConfig, RoutingMode};
pub use router::{DocumentRouter, RouterBuilder, RouterHandle};
