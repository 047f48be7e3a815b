//! Run configuration consumed by the reconciliation engine.

use eyre::{bail, Result};
use std::path::PathBuf;

use crate::fingerprint::HashMode;

/// Default size of the copy worker pool.
pub const DEFAULT_COPY_WORKERS: usize = 4;

/// What the source path denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Reconcile a whole directory tree.
    #[default]
    Dir,
    /// Place a single file into the destination directory.
    File,
}

/// Parsed configuration record. Built by the CLI (or a test) and handed to
/// the engine; the engine never consults global state.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub mode: SyncMode,
    pub src: PathBuf,
    pub dst: PathBuf,
    /// Source-side paths excluded from the run, in the order given.
    pub ignore: Vec<PathBuf>,
    /// Delete destination entries that no longer correspond to the source.
    pub mirror: bool,
    /// Compute and report the plan without touching the filesystem.
    pub dry_run: bool,
    pub verbose: bool,
    pub hash_mode: HashMode,
    pub max_copy_workers: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Dir,
            src: PathBuf::new(),
            dst: PathBuf::new(),
            ignore: Vec::new(),
            mirror: false,
            dry_run: false,
            verbose: false,
            hash_mode: HashMode::Fast,
            max_copy_workers: DEFAULT_COPY_WORKERS,
        }
    }
}

impl SyncConfig {
    /// Reject configurations the run must not start with. Per-entry I/O
    /// trouble is handled later and never aborts; these do.
    pub fn validate(&self) -> Result<()> {
        if self.src.as_os_str().is_empty() || self.dst.as_os_str().is_empty() {
            bail!("source and destination are both required");
        }
        if self.max_copy_workers == 0 {
            bail!("max_copy_workers must be at least 1");
        }
        match self.mode {
            SyncMode::Dir => {
                if !self.src.is_dir() {
                    bail!("source directory does not exist: {}", self.src.display());
                }
            }
            SyncMode::File => {
                if !self.src.is_file() {
                    bail!("source file does not exist: {}", self.src.display());
                }
            }
        }
        Ok(())
    }
}
