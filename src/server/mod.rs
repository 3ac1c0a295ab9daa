// src/server/mod.rs

//! The process's only inbound HTTP surface: a Prometheus `/metrics`
//! endpoint. Request proxying itself is out of scope.

pub mod metrics_server;

pub use metrics_server::run_metrics_server;
