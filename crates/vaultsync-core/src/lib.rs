//! vaultsync-core: the reconciliation engine behind the vaultsync CLI.
//!
//! One-way, content-aware synchronization: the destination tree is brought
//! in line with the source tree, with files and whole subtrees that already
//! exist at the destination under another path *moved* into place instead
//! of recopied, and (in mirror mode) leftovers deleted.

pub mod config;
pub mod copy;
pub mod dest_index;
pub mod fingerprint;
pub mod ignore;
pub mod logger;
pub mod mirror;
pub mod normalize;
pub mod reconciler;

pub use config::{SyncConfig, SyncMode, DEFAULT_COPY_WORKERS};
pub use fingerprint::{file_fingerprint, Fingerprint, HashMode};
pub use logger::{ConsoleLog, LogLevel, MemoryLog, NoopLog, SyncLog};
pub use reconciler::{Reconciler, SyncSummary, DIR_MATCH_THRESHOLD};
