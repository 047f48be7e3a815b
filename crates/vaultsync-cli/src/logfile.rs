//! Log-file tee: appends timestamped lines to a file and forwards every
//! message to an inner sink unchanged.

use eyre::{Context, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use vaultsync_core::{LogLevel, SyncLog};

pub struct FileLog {
    file: Mutex<File>,
    inner: Box<dyn SyncLog>,
}

impl FileLog {
    pub fn new(path: &Path, inner: Box<dyn SyncLog>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
            inner,
        })
    }
}

impl SyncLog for FileLog {
    fn log(&self, level: LogLevel, msg: &str) {
        {
            let mut file = self.file.lock();
            let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            let _ = writeln!(file, "[{stamp}] {msg}");
        }
        self.inner.log(level, msg);
    }
}
