//! Mirror-mode deletion pass.
//!
//! Runs after the driver has finished deciding, so the reservation sets are
//! complete. A destination entry survives when it is reserved (just written
//! or claimed by a move), when its source equivalent is deliberately
//! ignored, or when a corresponding source entry exists. Everything else is
//! deleted in reverse-sorted path order, children before parents.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::copy::PARTIAL_SUFFIX;
use crate::ignore::IgnoreList;
use crate::logger::SyncLog;
use crate::normalize::{normalize, relative};
use crate::reconciler::Reservations;

/// Collect the destination entries mirror mode should delete, already in
/// deletion order.
pub fn plan_deletions(
    src_root: &Path,
    dst_root: &Path,
    ignore: &IgnoreList,
    reserved: &Reservations,
    log: &dyn SyncLog,
) -> Vec<PathBuf> {
    let mut doomed = Vec::new();
    if !dst_root.is_dir() {
        return doomed;
    }

    for entry in WalkDir::new(dst_root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                log.warn(&format!("[X] ERROR: enumerating destination: {err}"));
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let path = entry.path();
        let norm = normalize(path);
        if reserved.covers(&norm) {
            continue;
        }
        // in-flight copy temps are not reservation targets
        if norm.ends_with(PARTIAL_SUFFIX) {
            continue;
        }
        if ignore.dest_equivalent_ignored(dst_root, path, src_root) {
            continue;
        }
        let src_equivalent = src_root.join(relative(dst_root, path));
        if !src_equivalent.exists() && !ignore.source_ignored(&src_equivalent) {
            doomed.push(path.to_path_buf());
        }
    }

    doomed.sort_by(|a, b| normalize(b).cmp(&normalize(a)));
    doomed
}

/// Apply (or, under dry-run, report) a deletion plan. Returns the number of
/// deletions decided and the number that failed.
pub fn execute_deletions(
    doomed: &[PathBuf],
    dry_run: bool,
    log: &dyn SyncLog,
) -> (usize, usize) {
    let mut errors = 0;
    for path in doomed {
        if dry_run {
            log.action(&format!("[DRY-RUN] Would delete {}", path.display()));
            continue;
        }
        // a parent deleted earlier cannot take children with it (children
        // sort first), but the entry may still have raced something else
        if !path.exists() {
            continue;
        }
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        match result {
            Ok(()) => log.action(&format!("Deleted: {}", path.display())),
            Err(err) => {
                errors += 1;
                log.error(&format!("[X] ERROR: deleting {}: {err}", path.display()));
            }
        }
    }
    (doomed.len(), errors)
}
