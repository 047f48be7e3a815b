//! The reconciliation driver.
//!
//! A single pre-order walk of the source tree decides, per entry, between
//! skip, create-directory, move-file, move-directory, copy, or
//! compare-and-maybe-copy. Renames and directory creation happen on the
//! driver thread; bulk copies go to the bounded pool. Reservation sets
//! record every destination path this run has claimed so the mirror pass
//! can never delete something a move or copy just produced.
//!
//! Dry-run takes the exact same decision path: reservations, the index,
//! and the memoized directory fingerprints mutate identically, and every
//! would-be mutation becomes a `[DRY-RUN]` action line instead of a
//! filesystem call.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use eyre::{eyre, Context, Result};
use walkdir::WalkDir;

use crate::config::{SyncConfig, SyncMode};
use crate::copy::{self, CopyPool, CopyRequest};
use crate::dest_index::DestIndex;
use crate::fingerprint::{file_fingerprint, Fingerprint, HashMode};
use crate::ignore::IgnoreList;
use crate::logger::SyncLog;
use crate::mirror;
use crate::normalize::{is_under, normalize, relative};

/// A source directory and a destination candidate are considered the same
/// subtree when this share of the source's file fingerprints already exists
/// under the candidate.
pub const DIR_MATCH_THRESHOLD: f64 = 0.85;

/// Counters for one run. `copies` counts copy *decisions* and is identical
/// between a dry run and a real run over the same snapshot; `files_copied`
/// counts copies the pool actually completed.
#[derive(Debug, Default, Clone)]
pub struct SyncSummary {
    pub copies: usize,
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub dirs_created: usize,
    pub files_renamed: usize,
    pub dirs_renamed: usize,
    pub deletions: usize,
    pub errors: usize,
    pub dry_run: bool,
}

impl SyncSummary {
    /// Total planned (dry-run) or executed mutations.
    pub fn operations(&self) -> usize {
        self.copies + self.dirs_created + self.files_renamed + self.dirs_renamed + self.deletions
    }
}

/// Destination paths claimed by the current run. `paths` holds individual
/// entries (copy targets, created directories, claimed move sources);
/// `dirs` holds whole subtrees claimed by directory moves.
#[derive(Debug, Default)]
pub struct Reservations {
    paths: HashSet<String>,
    dirs: HashSet<String>,
}

impl Reservations {
    pub fn reserve_path(&mut self, path: &Path) {
        self.paths.insert(normalize(path));
    }

    pub fn reserve_dir(&mut self, dir: &Path) {
        self.dirs.insert(normalize(dir));
    }

    pub fn path_reserved(&self, norm: &str) -> bool {
        self.paths.contains(norm)
    }

    pub fn dir_reserved(&self, norm: &str) -> bool {
        self.dirs.contains(norm)
    }

    /// Reserved exactly, or inside a reserved subtree.
    pub fn covers(&self, norm: &str) -> bool {
        self.paths.contains(norm) || self.dirs.iter().any(|d| is_under(d, norm))
    }
}

pub struct Reconciler {
    config: SyncConfig,
    log: Arc<dyn SyncLog>,
    cancel: Arc<AtomicBool>,
    ignore: IgnoreList,
    index: DestIndex,
    dir_fps: HashMap<String, Arc<HashSet<Fingerprint>>>,
    reserved: Reservations,
    moved_roots: Vec<String>,
    summary: SyncSummary,
}

impl Reconciler {
    pub fn new(config: SyncConfig, log: Arc<dyn SyncLog>) -> Self {
        let ignore = IgnoreList::new(config.ignore.clone());
        Self {
            config,
            log,
            cancel: Arc::new(AtomicBool::new(false)),
            ignore,
            index: DestIndex::empty(),
            dir_fps: HashMap::new(),
            reserved: Reservations::default(),
            moved_roots: Vec::new(),
            summary: SyncSummary::default(),
        }
    }

    /// Share a cancellation flag with the caller's signal handling. Setting
    /// it stops the driver from scheduling further work; in-flight copies
    /// abort at their next chunk boundary.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(mut self) -> Result<SyncSummary> {
        self.config.validate()?;
        self.summary.dry_run = self.config.dry_run;
        match self.config.mode {
            SyncMode::Dir => self.sync_dir()?,
            SyncMode::File => self.sync_file()?,
        }
        self.log.info("All tasks finished.");
        if self.config.dry_run && self.summary.operations() == 0 {
            self.log
                .action("[DRY-RUN] Source and destination are already in sync. No changes needed.");
        }
        Ok(self.summary)
    }

    fn sync_dir(&mut self) -> Result<()> {
        let src_root = self.config.src.clone();
        let dst_root = self.config.dst.clone();

        if self.config.dry_run {
            if !dst_root.exists() {
                self.log.action(&format!(
                    "[DRY-RUN] Would create directory {}",
                    dst_root.display()
                ));
            }
        } else {
            fs::create_dir_all(&dst_root)
                .with_context(|| format!("creating destination root {}", dst_root.display()))?;
        }

        if self.config.hash_mode == HashMode::Strong {
            self.index = DestIndex::build(
                &dst_root,
                &src_root,
                &self.ignore,
                HashMode::Strong,
                self.log.as_ref(),
            );
        }

        let pool = if self.config.dry_run {
            None
        } else {
            Some(CopyPool::spawn(
                self.config.max_copy_workers,
                self.cancel.clone(),
                self.log.clone(),
            ))
        };

        let mut walker = WalkDir::new(&src_root).follow_links(false).into_iter();
        while let Some(item) = walker.next() {
            if self.cancel.load(Ordering::Relaxed) {
                self.log
                    .warn("Cancellation requested; no further work will be scheduled.");
                break;
            }
            let entry = match item {
                Ok(e) => e,
                Err(err) => {
                    self.log.error(&format!("[X] ERROR: reading source: {err}"));
                    self.summary.errors += 1;
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let path = entry.path();
            let norm = normalize(path);

            // already provided at the destination by a directory move
            if self.moved_roots.iter().any(|mr| is_under(mr, &norm)) {
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            }

            if self.ignore.source_ignored(path) {
                self.log.info(&format!("Ignored: {}", path.display()));
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            }

            let rel = relative(&src_root, path);
            let target = dst_root.join(&rel);

            if entry.file_type().is_dir() {
                if target.exists() {
                    continue;
                }
                if self.config.hash_mode == HashMode::Strong
                    && self.try_directory_move(path, &rel, &target)
                {
                    walker.skip_current_dir();
                    continue;
                }
                self.create_directory(&target);
            } else if entry.file_type().is_file() {
                self.reconcile_file(path, &target, pool.as_ref());
            } else {
                self.reconcile_opaque(path, &target, pool.as_ref());
            }
        }

        if self.config.mirror && !self.cancel.load(Ordering::Relaxed) {
            self.log
                .info("Mirror mode enabled. Checking for destination entries to delete...");
            let doomed = mirror::plan_deletions(
                &src_root,
                &dst_root,
                &self.ignore,
                &self.reserved,
                self.log.as_ref(),
            );
            let (decided, errors) =
                mirror::execute_deletions(&doomed, self.config.dry_run, self.log.as_ref());
            self.summary.deletions += decided;
            self.summary.errors += errors;
        }

        if let Some(pool) = pool {
            if self.summary.copies > 0 {
                self.log.info("Waiting for all copy tasks to complete...");
            }
            let stats = pool.join();
            self.summary.files_copied = stats.files_copied;
            self.summary.bytes_copied = stats.bytes_copied;
            self.summary.errors += stats.errors.len();
        }
        Ok(())
    }

    /// Place a single source file into the destination directory.
    fn sync_file(&mut self) -> Result<()> {
        let src = self.config.src.clone();
        let dst_dir = self.config.dst.clone();

        if !dst_dir.exists() {
            if self.config.dry_run {
                self.log.action(&format!(
                    "[DRY-RUN] Would create directory {}",
                    dst_dir.display()
                ));
            } else {
                fs::create_dir_all(&dst_dir)
                    .with_context(|| format!("creating destination {}", dst_dir.display()))?;
            }
        }

        let name = src
            .file_name()
            .ok_or_else(|| eyre!("source file has no name: {}", src.display()))?;
        let target = dst_dir.join(name);

        let need_copy = if !target.exists() {
            true
        } else {
            self.file_mode_overwrite_needed(&src, &target)
        };
        if !need_copy {
            return Ok(());
        }

        self.summary.copies += 1;
        if self.config.dry_run {
            self.log.action(&format!(
                "[DRY-RUN] Would copy {} -> {}",
                src.display(),
                target.display()
            ));
            return Ok(());
        }
        match copy::copy_file(&src, &target, &self.cancel) {
            Ok(bytes) => {
                self.summary.files_copied = 1;
                self.summary.bytes_copied = bytes;
                self.log
                    .action(&format!("Copied {} -> {}", src.display(), target.display()));
            }
            Err(err) => {
                self.log.error(&format!(
                    "[X] ERROR copying file: {err:#} [{}] [{}]",
                    src.display(),
                    target.display()
                ));
                self.summary.errors += 1;
            }
        }
        Ok(())
    }

    /// Look for a destination directory that already holds this source
    /// subtree's content and rename it into place. Returns true when the
    /// source subtree no longer needs traversal.
    fn try_directory_move(&mut self, src_dir: &Path, rel: &Path, target: &Path) -> bool {
        let src_fps = self.dir_fingerprints(src_dir, false);
        if src_fps.is_empty() {
            return false;
        }

        let dst_parent = match rel.parent() {
            Some(p) if !p.as_os_str().is_empty() => self.config.dst.join(p),
            _ => self.config.dst.clone(),
        };
        if !dst_parent.is_dir() {
            return false;
        }
        let entries = match fs::read_dir(&dst_parent) {
            Ok(entries) => entries,
            Err(err) => {
                self.log.warn(&format!(
                    "[X] ERROR: listing {}: {err}",
                    dst_parent.display()
                ));
                return false;
            }
        };

        for cand in entries.flatten() {
            let cand_path = cand.path();
            if !cand_path.is_dir() {
                continue;
            }
            if self.reserved.dir_reserved(&normalize(&cand_path)) {
                continue;
            }
            if self
                .ignore
                .dest_equivalent_ignored(&self.config.dst, &cand_path, &self.config.src)
            {
                continue;
            }
            let cand_fps = self.dir_fingerprints(&cand_path, true);
            if cand_fps.is_empty() {
                continue;
            }
            let common = src_fps.iter().filter(|fp| cand_fps.contains(*fp)).count();
            let ratio = common as f64 / src_fps.len() as f64;
            if ratio < DIR_MATCH_THRESHOLD {
                continue;
            }
            return self.execute_directory_move(src_dir, &cand_path, target);
        }
        false
    }

    fn execute_directory_move(&mut self, src_dir: &Path, cand: &Path, target: &Path) -> bool {
        if self.config.dry_run {
            self.log.action(&format!(
                "[DRY-RUN] Would move (rename directory) {} -> {}",
                cand.display(),
                target.display()
            ));
        } else {
            if let Some(parent) = target.parent() {
                if let Err(err) = fs::create_dir_all(parent) {
                    self.log.error(&format!(
                        "[X] ERROR: creating {}: {err}",
                        parent.display()
                    ));
                    self.summary.errors += 1;
                    return false;
                }
            }
            match fs::rename(cand, target) {
                Ok(()) => {
                    self.log.action(&format!(
                        "Renamed directory {} -> {}",
                        cand.display(),
                        target.display()
                    ));
                }
                Err(_) => {
                    // cross-device rename; fall back to deep copy + delete
                    if let Err(err) = deep_copy_dir(cand, target, &self.cancel) {
                        self.log.error(&format!(
                            "[X] ERROR: moving directory {}: {err:#}",
                            cand.display()
                        ));
                        self.summary.errors += 1;
                        return false;
                    }
                    self.log.action(&format!(
                        "Copied directory {} -> {} (cross-volume move)",
                        cand.display(),
                        target.display()
                    ));
                    if let Err(err) = fs::remove_dir_all(cand) {
                        self.log.error(&format!(
                            "[X] ERROR: deleting original {}: {err}",
                            cand.display()
                        ));
                        self.summary.errors += 1;
                    } else {
                        self.log
                            .action(&format!("Deleted original {}", cand.display()));
                    }
                }
            }
        }

        self.reserved.reserve_dir(cand);
        self.reserved.reserve_dir(target);
        self.moved_roots.push(normalize(src_dir));
        self.index.remove_subtree(cand);
        self.summary.dirs_renamed += 1;
        true
    }

    fn reconcile_file(&mut self, path: &Path, target: &Path, pool: Option<&CopyPool>) {
        if target.exists() {
            self.reserved.reserve_path(target);
            if self.overwrite_needed(path, target) {
                self.enqueue_copy(path, target, pool);
            }
            return;
        }

        if self.config.hash_mode == HashMode::Strong && !self.index.is_empty() {
            if let Some(fp) = file_fingerprint(path, HashMode::Strong) {
                let candidates: Vec<PathBuf> = self.index.candidates(&fp).to_vec();
                for cand in candidates {
                    if self
                        .ignore
                        .dest_equivalent_ignored(&self.config.dst, &cand, &self.config.src)
                    {
                        continue;
                    }
                    if self.reserved.path_reserved(&normalize(&cand)) {
                        continue;
                    }
                    if !cand.exists() {
                        continue;
                    }
                    if self.execute_file_move(&fp, &cand, target) {
                        return;
                    }
                    // first surviving candidate decides; a failed move
                    // falls back to a plain copy
                    break;
                }
            }
        }
        self.enqueue_copy(path, target, pool);
    }

    fn execute_file_move(&mut self, fp: &Fingerprint, cand: &Path, target: &Path) -> bool {
        if self.config.dry_run {
            self.log.action(&format!(
                "[DRY-RUN] Would move (rename) {} -> {}",
                cand.display(),
                target.display()
            ));
            // the candidate still exists on disk during a dry run; reserve
            // it so no later entry claims it a second time
            self.reserved.reserve_path(cand);
        } else {
            if let Some(parent) = target.parent() {
                if let Err(err) = fs::create_dir_all(parent) {
                    self.log.error(&format!(
                        "[X] ERROR: creating {}: {err}",
                        parent.display()
                    ));
                    self.summary.errors += 1;
                    return false;
                }
            }
            match fs::rename(cand, target) {
                Ok(()) => {
                    self.log.action(&format!(
                        "Renamed file {} -> {}",
                        cand.display(),
                        target.display()
                    ));
                }
                Err(_) => match fs::copy(cand, target) {
                    Ok(_) => {
                        self.log.action(&format!(
                            "Copied file {} -> {} (cross-volume move)",
                            cand.display(),
                            target.display()
                        ));
                        if let Err(err) = fs::remove_file(cand) {
                            self.log.warn(&format!(
                                "[X] ERROR: deleting original {}: {err}",
                                cand.display()
                            ));
                        } else {
                            self.log
                                .action(&format!("Deleted original {}", cand.display()));
                        }
                    }
                    Err(err) => {
                        self.log.error(&format!(
                            "[X] ERROR: moving file {}: {err}",
                            cand.display()
                        ));
                        self.summary.errors += 1;
                        return false;
                    }
                },
            }
        }

        self.index.remove(fp, cand);
        self.reserved.reserve_path(target);
        self.summary.files_renamed += 1;
        true
    }

    /// Symlinks and other special entries are opaque: existence check and
    /// copy semantics only, never move candidates.
    fn reconcile_opaque(&mut self, path: &Path, target: &Path, pool: Option<&CopyPool>) {
        if target.exists() {
            self.reserved.reserve_path(target);
            return;
        }
        self.enqueue_copy(path, target, pool);
    }

    fn create_directory(&mut self, target: &Path) {
        if self.config.dry_run {
            self.log.action(&format!(
                "[DRY-RUN] Would create directory {}",
                target.display()
            ));
        } else if let Err(err) = fs::create_dir_all(target) {
            self.log.error(&format!(
                "[X] ERROR: creating directory {}: {err}",
                target.display()
            ));
            self.summary.errors += 1;
            return;
        } else {
            self.log
                .action(&format!("Create Directory {}", target.display()));
        }
        self.reserved.reserve_path(target);
        self.summary.dirs_created += 1;
    }

    fn enqueue_copy(&mut self, src: &Path, target: &Path, pool: Option<&CopyPool>) {
        self.reserved.reserve_path(target);
        self.summary.copies += 1;
        match pool {
            None => self.log.action(&format!(
                "[DRY-RUN] Would copy {} -> {}",
                src.display(),
                target.display()
            )),
            Some(pool) => pool.submit(CopyRequest {
                src: src.to_path_buf(),
                dst: target.to_path_buf(),
            }),
        }
    }

    /// Overwrite decision for an existing target during the directory walk.
    fn overwrite_needed(&mut self, src: &Path, dst: &Path) -> bool {
        match self.config.hash_mode {
            HashMode::Fast => source_is_newer(src, dst),
            HashMode::Strong => {
                let src_size = fs::metadata(src).map(|m| m.len());
                let dst_size = fs::metadata(dst).map(|m| m.len());
                match (src_size, dst_size) {
                    (Ok(s), Ok(t)) if s != t => true,
                    (Ok(_), Ok(_)) => {
                        let a = file_fingerprint(src, HashMode::Strong);
                        let b = file_fingerprint(dst, HashMode::Strong);
                        match (a, b) {
                            (Some(a), Some(b)) => a != b,
                            _ => true,
                        }
                    }
                    _ => source_is_newer(src, dst),
                }
            }
        }
    }

    /// Overwrite decision for single-file mode. Fast mode keeps the size
    /// check here: with only one file there is no bulk-comparison cost.
    fn file_mode_overwrite_needed(&mut self, src: &Path, dst: &Path) -> bool {
        match self.config.hash_mode {
            HashMode::Strong => self.overwrite_needed(src, dst),
            HashMode::Fast => {
                let src_size = fs::metadata(src).map(|m| m.len());
                let dst_size = fs::metadata(dst).map(|m| m.len());
                match (src_size, dst_size) {
                    (Ok(s), Ok(t)) if s == t => source_is_newer(src, dst),
                    _ => true,
                }
            }
        }
    }

    /// Fingerprints of every non-ignored regular file under `dir`, memoized
    /// by normalized path. `dest_side` picks which projection of the ignore
    /// rules applies.
    fn dir_fingerprints(&mut self, dir: &Path, dest_side: bool) -> Arc<HashSet<Fingerprint>> {
        let key = normalize(dir);
        if let Some(set) = self.dir_fps.get(&key) {
            return set.clone();
        }
        let mut set = HashSet::new();
        if dir.exists() {
            for entry in WalkDir::new(dir).follow_links(false) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(err) => {
                        log::debug!("skipping unreadable entry under {key}: {err}");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let skipped = if dest_side {
                    self.ignore.dest_equivalent_ignored(
                        &self.config.dst,
                        entry.path(),
                        &self.config.src,
                    )
                } else {
                    self.ignore.source_ignored(entry.path())
                };
                if skipped {
                    continue;
                }
                if let Some(fp) = file_fingerprint(entry.path(), self.config.hash_mode) {
                    set.insert(fp);
                }
            }
        }
        let set = Arc::new(set);
        self.dir_fps.insert(key, set.clone());
        set
    }
}

fn source_is_newer(src: &Path, dst: &Path) -> bool {
    let src_time = fs::metadata(src)
        .and_then(|m| m.modified())
        .unwrap_or(UNIX_EPOCH);
    let dst_time = fs::metadata(dst)
        .and_then(|m| m.modified())
        .unwrap_or(UNIX_EPOCH);
    src_time > dst_time
}

/// Recreate a directory subtree at `target`, used when a directory rename
/// crosses devices. Copies regular files and directories; other entries are
/// skipped the same way the original rename would have carried them opaquely.
fn deep_copy_dir(from: &Path, target: &Path, cancel: &AtomicBool) -> Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry?;
        let dest = target.join(relative(from, entry.path()));
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)
                .with_context(|| format!("creating {}", dest.display()))?;
        } else if entry.file_type().is_file() {
            copy::copy_file(entry.path(), &dest, cancel)?;
        }
    }
    Ok(())
}
