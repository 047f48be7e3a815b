//! Bounded copy pipeline.
//!
//! The driver enqueues copy requests onto a bounded channel; a fixed set of
//! worker threads drains it. A full channel blocks the driver, which is the
//! back-pressure bound. Each copy writes to a `.vsync.partial` sibling and
//! commits with a rename, so a failed or cancelled copy never leaves a torn
//! destination file. Workers consult the shared cancel flag between chunks.

use crossbeam_channel::{Receiver, Sender};
use eyre::{bail, Context, Result};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::logger::SyncLog;

/// Suffix for in-flight copy temp files. The mirror pass must skip paths
/// carrying it: temp files are not reservation targets.
pub const PARTIAL_SUFFIX: &str = ".vsync.partial";

/// Bytes copied per chunk; also the cancellation check granularity.
const COPY_CHUNK: usize = 64 * 1024;

/// One unit of work for the pool.
#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub src: PathBuf,
    pub dst: PathBuf,
}

/// Totals collected after the pool is joined.
#[derive(Debug, Default, Clone)]
pub struct CopyStats {
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub errors: Vec<String>,
}

struct PoolShared {
    files: AtomicU64,
    bytes: AtomicU64,
    errors: Mutex<Vec<String>>,
    cancel: Arc<AtomicBool>,
    log: Arc<dyn SyncLog>,
}

pub struct CopyPool {
    tx: Option<Sender<CopyRequest>>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<PoolShared>,
}

impl CopyPool {
    pub fn spawn(workers: usize, cancel: Arc<AtomicBool>, log: Arc<dyn SyncLog>) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = crossbeam_channel::bounded::<CopyRequest>(workers * 2);
        let shared = Arc::new(PoolShared {
            files: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            errors: Mutex::new(Vec::new()),
            cancel,
            log,
        });

        let handles = (0..workers)
            .map(|idx| {
                let rx = rx.clone();
                let shared = shared.clone();
                thread::Builder::new()
                    .name(format!("vsync-copy-{idx}"))
                    .spawn(move || worker_loop(&rx, &shared))
                    .expect("spawn copy worker")
            })
            .collect();

        Self {
            tx: Some(tx),
            workers: handles,
            shared,
        }
    }

    /// Enqueue a copy; blocks when all workers are busy and the queue is full.
    pub fn submit(&self, req: CopyRequest) {
        if let Some(tx) = &self.tx {
            // send only fails when every worker has exited, which means each
            // already recorded its own failure
            let _ = tx.send(req);
        }
    }

    /// Close the queue, wait for in-flight copies, and collect the totals.
    pub fn join(mut self) -> CopyStats {
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        CopyStats {
            files_copied: self.shared.files.load(Ordering::Relaxed),
            bytes_copied: self.shared.bytes.load(Ordering::Relaxed),
            errors: std::mem::take(&mut *self.shared.errors.lock()),
        }
    }
}

fn worker_loop(rx: &Receiver<CopyRequest>, shared: &PoolShared) {
    while let Ok(req) = rx.recv() {
        if shared.cancel.load(Ordering::Relaxed) {
            shared.log.warn(&format!(
                "Cancelled before copying {} -> {}",
                req.src.display(),
                req.dst.display()
            ));
            shared
                .errors
                .lock()
                .push(format!("cancelled: {}", req.src.display()));
            continue;
        }
        match copy_file(&req.src, &req.dst, &shared.cancel) {
            Ok(bytes) => {
                shared.files.fetch_add(1, Ordering::Relaxed);
                shared.bytes.fetch_add(bytes, Ordering::Relaxed);
                shared.log.action(&format!(
                    "Copied {} -> {}",
                    req.src.display(),
                    req.dst.display()
                ));
            }
            Err(err) => {
                shared.log.error(&format!(
                    "[X] ERROR copying file: {err:#} [{}] [{}]",
                    req.src.display(),
                    req.dst.display()
                ));
                shared
                    .errors
                    .lock()
                    .push(format!("{}: {err:#}", req.src.display()));
            }
        }
    }
}

/// Deletes the temp file on drop unless the copy committed.
struct TempFileGuard {
    path: PathBuf,
    committed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    /// Replace the final destination with the finished temp file.
    fn commit(mut self, final_path: &Path) -> Result<()> {
        if final_path.exists() {
            fs::remove_file(final_path)
                .with_context(|| format!("replacing {}", final_path.display()))?;
        }
        fs::rename(&self.path, final_path).with_context(|| {
            format!(
                "renaming {} to {}",
                self.path.display(),
                final_path.display()
            )
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn temp_path_for(dst: &Path) -> PathBuf {
    let mut name = dst.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Copy `src` over `dst` through a temp file, checking `cancel` between
/// chunks. Returns the byte count on success.
pub fn copy_file(src: &Path, dst: &Path, cancel: &AtomicBool) -> Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent of {}", dst.display()))?;
    }

    let mut reader = File::open(src).with_context(|| format!("open {}", src.display()))?;
    let guard = TempFileGuard::new(temp_path_for(dst));
    let mut writer =
        File::create(&guard.path).with_context(|| format!("create {}", guard.path.display()))?;

    let mut buf = vec![0u8; COPY_CHUNK];
    let mut total = 0u64;
    loop {
        if cancel.load(Ordering::Relaxed) {
            bail!("copy cancelled");
        }
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    drop(writer);

    guard.commit(dst)?;
    Ok(total)
}
