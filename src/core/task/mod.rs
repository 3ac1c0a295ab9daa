// src/core/task/mod.rs

//! Task Service & Long-Running Coordinator: a process-wide
//! single-slot task model for import/delete/restore with progress and
//! cancellation semantics.

pub mod service;

pub use service::{TaskService, run_guarded};
