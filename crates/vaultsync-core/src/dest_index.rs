//! Fingerprint → destination-path multimap backing the move detector.
//!
//! Built once at run start by walking the destination tree, and consumed as
//! the driver claims entries. Only strong-mode runs build it: a partial-hash
//! collision would let the driver rename unrelated data on top of a target,
//! so fast mode keeps the index empty and move detection off.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::fingerprint::{file_fingerprint, Fingerprint, HashMode};
use crate::ignore::IgnoreList;
use crate::logger::SyncLog;
use crate::normalize::{is_under, normalize};

#[derive(Debug, Default)]
pub struct DestIndex {
    map: HashMap<Fingerprint, Vec<PathBuf>>,
    len: usize,
}

impl DestIndex {
    /// An index with no entries; what fast-mode runs use.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Walk the destination and index every readable, non-ignored regular
    /// file. Entries without a fingerprint (empty or unreadable files) are
    /// not indexed and can never be claimed as move sources.
    pub fn build(
        dst_root: &Path,
        src_root: &Path,
        ignore: &IgnoreList,
        mode: HashMode,
        log: &dyn SyncLog,
    ) -> Self {
        let mut index = Self::default();
        if !dst_root.is_dir() {
            return index;
        }

        log.info("[INFO] Building destination fingerprint index (this may take some time)...");
        for entry in WalkDir::new(dst_root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    log.warn(&format!("[X] ERROR: indexing destination: {err}"));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if ignore.dest_equivalent_ignored(dst_root, entry.path(), src_root) {
                continue;
            }
            if let Some(fp) = file_fingerprint(entry.path(), mode) {
                index.insert(fp, entry.path().to_path_buf());
            }
        }
        log.info(&format!(
            "[INFO] Destination fingerprint index ready ({} entries).",
            index.len()
        ));
        index
    }

    fn insert(&mut self, fp: Fingerprint, path: PathBuf) {
        self.map.entry(fp).or_default().push(path);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Destination paths currently known to hold this content.
    pub fn candidates(&self, fp: &Fingerprint) -> &[PathBuf] {
        self.map.get(fp).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop one claimed entry.
    pub fn remove(&mut self, fp: &Fingerprint, path: &Path) {
        let target = normalize(path);
        if let Some(paths) = self.map.get_mut(fp) {
            let before = paths.len();
            paths.retain(|p| normalize(p) != target);
            self.len -= before - paths.len();
            if paths.is_empty() {
                self.map.remove(fp);
            }
        }
    }

    /// Drop every entry inside a claimed directory subtree.
    pub fn remove_subtree(&mut self, dir: &Path) {
        let dir_norm = normalize(dir);
        let mut removed = 0;
        self.map.retain(|_, paths| {
            let before = paths.len();
            paths.retain(|p| !is_under(&dir_norm, &normalize(p)));
            removed += before - paths.len();
            !paths.is_empty()
        });
        self.len -= removed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoopLog;
    use eyre::Result;
    use std::fs;

    fn seed_trees(tmp: &Path) -> Result<(PathBuf, PathBuf)> {
        let src = tmp.join("src");
        let dst = tmp.join("dst");
        fs::create_dir_all(&src)?;
        fs::create_dir_all(dst.join("sub"))?;
        fs::write(dst.join("a.txt"), b"alpha")?;
        fs::write(dst.join("sub/b.txt"), b"beta")?;
        fs::write(dst.join("sub/empty"), b"")?;
        Ok((src, dst))
    }

    #[test]
    fn build_indexes_regular_files_only() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let (src, dst) = seed_trees(tmp.path())?;
        let index = DestIndex::build(&dst, &src, &IgnoreList::default(), HashMode::Strong, &NoopLog);
        // empty file has no fingerprint, directories are never indexed
        assert_eq!(index.len(), 2);
        Ok(())
    }

    #[test]
    fn build_skips_ignore_projected_entries() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let (src, dst) = seed_trees(tmp.path())?;
        let ignore = IgnoreList::new([src.join("sub")]);
        let index = DestIndex::build(&dst, &src, &ignore, HashMode::Strong, &NoopLog);
        assert_eq!(index.len(), 1);

        let fp = file_fingerprint(&dst.join("a.txt"), HashMode::Strong).unwrap();
        assert_eq!(index.candidates(&fp), &[dst.join("a.txt")]);
        Ok(())
    }

    #[test]
    fn remove_drops_a_single_claimed_path() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let (src, dst) = seed_trees(tmp.path())?;
        fs::write(dst.join("dupe.txt"), b"alpha")?;
        let mut index =
            DestIndex::build(&dst, &src, &IgnoreList::default(), HashMode::Strong, &NoopLog);

        let fp = file_fingerprint(&dst.join("a.txt"), HashMode::Strong).unwrap();
        assert_eq!(index.candidates(&fp).len(), 2);
        index.remove(&fp, &dst.join("a.txt"));
        assert_eq!(index.candidates(&fp), &[dst.join("dupe.txt")]);
        Ok(())
    }

    #[test]
    fn remove_subtree_drops_everything_under_the_directory() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let (src, dst) = seed_trees(tmp.path())?;
        let mut index =
            DestIndex::build(&dst, &src, &IgnoreList::default(), HashMode::Strong, &NoopLog);

        index.remove_subtree(&dst.join("sub"));
        assert_eq!(index.len(), 1);
        let fp = file_fingerprint(&dst.join("a.txt"), HashMode::Strong).unwrap();
        assert!(!index.candidates(&fp).is_empty());
        Ok(())
    }

    #[test]
    fn missing_destination_yields_an_empty_index() {
        let index = DestIndex::build(
            Path::new("/no/such/destination"),
            Path::new("/no/such/source"),
            &IgnoreList::default(),
            HashMode::Strong,
            &NoopLog,
        );
        assert!(index.is_empty());
    }
}
