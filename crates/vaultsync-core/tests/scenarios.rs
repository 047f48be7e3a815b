//! End-to-end reconciliation scenarios over real temp trees.

mod common;

use common::{dir_config, run, set_mtime, write_file};
use eyre::Result;
use std::fs;
use vaultsync_core::HashMode;

#[test]
fn empty_destination_gets_a_full_copy() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    write_file(&src.join("a.txt"), b"hi")?;
    write_file(&src.join("sub/b.txt"), b"yo")?;

    let (summary, log) = run(dir_config(&src, &dst, HashMode::Strong))?;

    assert_eq!(fs::read(dst.join("a.txt"))?, b"hi");
    assert_eq!(fs::read(dst.join("sub/b.txt"))?, b"yo");
    assert_eq!(summary.copies, 2);
    assert_eq!(summary.files_copied, 2);
    assert_eq!(summary.dirs_created, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(log.count_containing("Copied "), 2);
    assert_eq!(log.count_containing("Create Directory "), 1);
    Ok(())
}

#[test]
fn renamed_file_is_moved_not_recopied() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    let blob = vec![0xA5u8; 200 * 1024];

    // the sibling file keeps the docs subtree below the directory-match
    // threshold, so the report must be claimed file-by-file
    write_file(&src.join("docs/report.pdf"), &blob)?;
    write_file(&src.join("docs/notes.txt"), b"fresh notes")?;
    write_file(&dst.join("old/report.pdf"), &blob)?;

    let (summary, log) = run(dir_config(&src, &dst, HashMode::Strong))?;

    assert_eq!(fs::read(dst.join("docs/report.pdf"))?, blob);
    assert!(!dst.join("old/report.pdf").exists());
    assert_eq!(summary.files_renamed, 1);
    assert_eq!(summary.dirs_renamed, 0);
    assert_eq!(log.count_containing("Renamed file "), 1);
    // only the notes file moved through the copy pipeline
    assert_eq!(summary.copies, 1);
    assert_eq!(summary.bytes_copied, b"fresh notes".len() as u64);
    Ok(())
}

#[test]
fn renamed_directory_is_moved_wholesale() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    for name in ["a", "b", "c", "d", "e"] {
        let body = format!("content of {name}");
        write_file(&src.join("proj_v2").join(name), body.as_bytes())?;
        write_file(&dst.join("proj").join(name), body.as_bytes())?;
    }

    let (summary, log) = run(dir_config(&src, &dst, HashMode::Strong))?;

    for name in ["a", "b", "c", "d", "e"] {
        assert!(dst.join("proj_v2").join(name).exists());
    }
    assert!(!dst.join("proj").exists());
    assert_eq!(summary.dirs_renamed, 1);
    assert_eq!(summary.files_renamed, 0);
    assert_eq!(summary.copies, 0);
    assert_eq!(log.count_containing("Renamed directory "), 1);
    Ok(())
}

#[test]
fn mirror_deletes_children_before_parents() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    write_file(&src.join("keep.txt"), b"keep")?;
    write_file(&dst.join("keep.txt"), b"keep")?;
    write_file(&dst.join("stale.txt"), b"stale")?;
    write_file(&dst.join("old_dir/x"), b"x")?;
    set_mtime(&src.join("keep.txt"), 1_700_000_000)?;
    set_mtime(&dst.join("keep.txt"), 1_700_000_000)?;

    let mut config = dir_config(&src, &dst, HashMode::Fast);
    config.mirror = true;
    let (summary, log) = run(config)?;

    assert!(dst.join("keep.txt").exists());
    assert!(!dst.join("stale.txt").exists());
    assert!(!dst.join("old_dir").exists());
    assert_eq!(summary.deletions, 3);
    assert_eq!(summary.copies, 0);

    let deleted: Vec<String> = log
        .lines()
        .into_iter()
        .filter(|l| l.starts_with("Deleted: "))
        .collect();
    assert_eq!(deleted.len(), 3);
    assert!(deleted[0].ends_with("stale.txt"));
    assert!(deleted[1].ends_with("x"));
    assert!(deleted[2].ends_with("old_dir"));
    Ok(())
}

#[test]
fn mirror_spares_entries_whose_source_equivalent_is_ignored() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    write_file(&src.join("a.txt"), b"a")?;
    write_file(&dst.join("a.txt"), b"a")?;
    write_file(&dst.join("secrets/pw"), b"hunter2")?;
    set_mtime(&src.join("a.txt"), 1_700_000_000)?;
    set_mtime(&dst.join("a.txt"), 1_700_000_000)?;

    let mut config = dir_config(&src, &dst, HashMode::Fast);
    config.mirror = true;
    config.ignore = vec![src.join("secrets")];
    let (summary, _log) = run(config)?;

    assert_eq!(fs::read(dst.join("secrets/pw"))?, b"hunter2");
    assert_eq!(summary.deletions, 0);
    assert_eq!(summary.copies, 0);
    Ok(())
}

#[test]
fn newer_changed_file_overwrites_and_settles() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    write_file(&src.join("x"), b"new")?;
    write_file(&dst.join("x"), b"old")?;
    set_mtime(&dst.join("x"), 1_700_000_000)?;
    set_mtime(&src.join("x"), 1_700_000_001)?;

    let (summary, log) = run(dir_config(&src, &dst, HashMode::Strong))?;
    assert_eq!(fs::read(dst.join("x"))?, b"new");
    assert_eq!(summary.copies, 1);
    assert_eq!(log.count_containing("Copied "), 1);

    let (second, _log) = run(dir_config(&src, &dst, HashMode::Strong))?;
    assert_eq!(second.operations(), 0);
    Ok(())
}

#[test]
fn ignored_source_subtree_is_never_read_into_destination() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    write_file(&src.join("keep.txt"), b"keep")?;
    write_file(&src.join("tmp/junk.bin"), b"junk")?;

    let mut config = dir_config(&src, &dst, HashMode::Strong);
    config.ignore = vec![src.join("tmp")];
    let (summary, log) = run(config)?;

    assert!(dst.join("keep.txt").exists());
    assert!(!dst.join("tmp").exists());
    assert_eq!(summary.copies, 1);
    assert_eq!(log.count_containing("Ignored: "), 1);
    Ok(())
}
