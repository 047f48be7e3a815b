mod cli;
mod logfile;
mod settings;

use clap::{CommandFactory, Parser};
use eyre::{bail, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use cli::Cli;
use logfile::FileLog;
use settings::{Settings, SETTINGS_FILE};
use vaultsync_core::{ConsoleLog, HashMode, Reconciler, SyncConfig, SyncMode, SyncLog, SyncSummary};

fn main() -> Result<()> {
    env_logger::init();
    let bare_invocation = std::env::args().len() <= 1;
    let cli = Cli::parse();

    let Some(config) = resolve_config(&cli)? else {
        // with no arguments at all this is a help request; with flags but
        // no resolvable mode it is a configuration error
        if bare_invocation {
            Cli::command().print_help()?;
            println!();
            return Ok(());
        }
        bail!("no valid operation specified; use --dir or --file");
    };

    let log = build_sink(&cli, &config)?;
    let start = Instant::now();
    let summary = Reconciler::new(config.clone(), log.clone()).run()?;
    print_summary(&summary, start.elapsed().as_secs_f64());

    if cli.save_settings {
        Settings::from_config(&config).save(Path::new(SETTINGS_FILE))?;
        log.info(&format!("Settings saved to {SETTINGS_FILE}"));
    }
    Ok(())
}

/// Flags win; with no mode flag the saved settings (if any) are replayed,
/// with the remaining flags still applied on top.
fn resolve_config(cli: &Cli) -> Result<Option<SyncConfig>> {
    let (mode, src, dst) = if let Some(pair) = &cli.dir {
        (SyncMode::Dir, pair[0].clone(), pair[1].clone())
    } else if let Some(pair) = &cli.file {
        (SyncMode::File, pair[0].clone(), pair[1].clone())
    } else if let Some(saved) = Settings::load(Path::new(SETTINGS_FILE)) {
        println!("Using settings from {SETTINGS_FILE}");
        return Ok(Some(config_from_parts(
            cli,
            saved.sync_mode()?,
            saved.src.clone(),
            saved.dst.clone(),
            cli.delete || saved.mirror,
            cli.verbose || saved.verbose,
            cli.sha256 || saved.sha256,
        )));
    } else {
        return Ok(None);
    };
    Ok(Some(config_from_parts(
        cli,
        mode,
        src,
        dst,
        cli.delete,
        cli.verbose,
        cli.sha256,
    )))
}

fn config_from_parts(
    cli: &Cli,
    mode: SyncMode,
    src: PathBuf,
    dst: PathBuf,
    mirror: bool,
    verbose: bool,
    sha256: bool,
) -> SyncConfig {
    SyncConfig {
        mode,
        src,
        dst,
        ignore: cli.ignore.clone(),
        mirror,
        dry_run: cli.dry_run,
        verbose,
        hash_mode: if sha256 {
            HashMode::Strong
        } else {
            HashMode::Fast
        },
        max_copy_workers: cli.workers,
    }
}

fn build_sink(cli: &Cli, config: &SyncConfig) -> Result<Arc<dyn SyncLog>> {
    let console = ConsoleLog::new(config.verbose);
    Ok(if cli.save_log {
        Arc::new(FileLog::new(Path::new("sync.log"), Box::new(console))?)
    } else {
        Arc::new(console)
    })
}

fn print_summary(summary: &SyncSummary, seconds: f64) {
    println!("\n========================================");
    println!("==> Sync completed in {seconds:.2} seconds");
    if summary.dry_run {
        println!("==> [DRY-RUN] Planned operations: {}", summary.operations());
    } else {
        println!(
            "==> Copied {} files ({} bytes), renamed {} files / {} directories, \
             created {} directories, deleted {} entries",
            summary.files_copied,
            summary.bytes_copied,
            summary.files_renamed,
            summary.dirs_renamed,
            summary.dirs_created,
            summary.deletions,
        );
    }
    if summary.errors > 0 {
        println!("==> {} error(s) were logged; see output above", summary.errors);
    }
    println!("========================================");
}
