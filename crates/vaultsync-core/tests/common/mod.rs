use eyre::Result;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use vaultsync_core::{HashMode, MemoryLog, Reconciler, SyncConfig, SyncMode, SyncSummary};

pub fn dir_config(src: &Path, dst: &Path, hash_mode: HashMode) -> SyncConfig {
    SyncConfig {
        mode: SyncMode::Dir,
        src: src.to_path_buf(),
        dst: dst.to_path_buf(),
        hash_mode,
        ..SyncConfig::default()
    }
}

pub fn run(config: SyncConfig) -> Result<(SyncSummary, Arc<MemoryLog>)> {
    let log = Arc::new(MemoryLog::new());
    let summary = Reconciler::new(config, log.clone()).run()?;
    Ok((summary, log))
}

pub fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    Ok(())
}

/// Pin a file's mtime so overwrite decisions are deterministic.
pub fn set_mtime(path: &Path, unix_secs: i64) -> Result<()> {
    filetime::set_file_mtime(path, filetime::FileTime::from_unix_time(unix_secs, 0))?;
    Ok(())
}
