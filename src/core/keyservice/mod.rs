// src/core/keyservice/mod.rs

//! Key-level services built on top of `KeyProvider`: plain CRUD, tiered
//! bulk import, and task-tracked bulk deletion.

pub mod delete_service;
pub mod import_service;
pub mod key_service;

pub use delete_service::KeyDeleteService;
pub use import_service::{KeyImportOutcome, KeyImportService};
pub use key_service::KeyService;
