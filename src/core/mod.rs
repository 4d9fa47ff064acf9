pub mod audit;
pub mod detector;
pub mod engine;
pub mod hash;
pub mod keyfile;
pub mod ledger;
pub mod restore;
pub mod scanner;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use audit::{AuditReport, MetadataAudit, VersionHistory, VersionInfo};
pub use detector::{AlwaysChanged, ChangeDetector, MirrorStateDetector};
pub use engine::{
    write_summary, FileClass, SyncEngine, SyncReport, UpdatedMedia, MEDIA_EXTENSIONS,
};
pub use hash::calculate_hash;
pub use keyfile::{ensure_keyfile, KeyfileStatus};
pub use ledger::{Ledger, LedgerEntry};
pub use restore::{decrypt_blob_file, RestoreEngine, RestoreFailure, RestoreReport};
pub use scanner::{FileScanner, PathFilter};
pub use store::{BackupStore, Protection};
