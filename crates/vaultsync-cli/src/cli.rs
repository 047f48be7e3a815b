use clap::Parser;
use std::path::PathBuf;

use vaultsync_core::DEFAULT_COPY_WORKERS;

/// One-way directory synchronizer with content-aware move detection.
#[derive(Parser, Debug)]
#[command(name = "vaultsync", version)]
#[command(about = "Reconcile a destination tree against a source tree")]
pub struct Cli {
    /// Sync a directory tree: --dir <SRC> <DST>
    #[arg(long, num_args = 2, value_names = ["SRC", "DST"], conflicts_with = "file")]
    pub dir: Option<Vec<PathBuf>>,
    /// Sync a single file into a destination directory
    #[arg(long, num_args = 2, value_names = ["SRC", "DST"])]
    pub file: Option<Vec<PathBuf>>,
    /// Ignore a source-side path (repeatable)
    #[arg(long, value_name = "PATH")]
    pub ignore: Vec<PathBuf>,
    /// Mirror mode: delete destination entries missing from the source
    #[arg(long)]
    pub delete: bool,
    /// Report the plan without applying changes
    #[arg(long)]
    pub dry_run: bool,
    /// Log every decision
    #[arg(long, short = 'v')]
    pub verbose: bool,
    /// Use SHA-256 fingerprints and enable move detection
    #[arg(long)]
    pub sha256: bool,
    /// Copy worker threads
    #[arg(long, value_name = "N", default_value_t = DEFAULT_COPY_WORKERS)]
    pub workers: usize,
    /// Append operations to sync.log
    #[arg(long)]
    pub save_log: bool,
    /// Save this invocation to settings.json for argument-free reruns
    #[arg(long)]
    pub save_settings: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_mode_with_options_parses() {
        let cli = Cli::try_parse_from([
            "vaultsync",
            "--dir",
            "/data/src",
            "/data/dst",
            "--ignore",
            "/data/src/tmp",
            "--delete",
            "--sha256",
            "-v",
        ])
        .unwrap();
        let pair = cli.dir.unwrap();
        assert_eq!(pair, vec![PathBuf::from("/data/src"), PathBuf::from("/data/dst")]);
        assert_eq!(cli.ignore, vec![PathBuf::from("/data/src/tmp")]);
        assert!(cli.delete && cli.sha256 && cli.verbose);
        assert_eq!(cli.workers, DEFAULT_COPY_WORKERS);
    }

    #[test]
    fn dir_and_file_are_mutually_exclusive() {
        assert!(Cli::try_parse_from([
            "vaultsync", "--dir", "a", "b", "--file", "c", "d",
        ])
        .is_err());
    }

    #[test]
    fn ignore_is_repeatable() {
        let cli = Cli::try_parse_from([
            "vaultsync", "--dir", "a", "b", "--ignore", "a/x", "--ignore", "a/y",
        ])
        .unwrap();
        assert_eq!(cli.ignore.len(), 2);
    }
}
