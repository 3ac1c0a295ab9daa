// src/core/importexport/mod.rs

//! Import/Export: the versioned envelope format, offset-paginated export,
//! transactional import with unique-name generation and child upstream
//! recomputation, a two-phase streaming copy between groups, and
//! line-oriented streaming key import.

pub mod copy;
pub mod envelope;
pub mod export;
pub mod import;
pub mod reencrypt;
pub mod streaming;

pub use copy::{copy_group_keys, CopyOutcome};
pub use envelope::{ExportEnvelope, GroupExport, GroupFields, KeyExport, SubGroupExport, EXPORT_ENVELOPE_VERSION};
pub use export::{export_system, export_group};
pub use import::{import_envelope, ImportOutcome};
pub use streaming::{import_keys_stream, StreamImportOutcome, MAX_LINE_BYTES};
