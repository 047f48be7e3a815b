//! The logging sink the engine writes decisions to.
//!
//! The engine never formats for a particular terminal; it hands each message
//! to an injected `SyncLog` with a severity tag and lets the sink decide what
//! to surface. Workers share the sink across threads, so implementations must
//! be `Send + Sync` and serialize their own output.

use parking_lot::Mutex;

/// Severity tag attached to every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Progress chatter; only interesting in verbose runs.
    Info,
    /// A decision that mutates (or would mutate) the destination.
    Action,
    Warn,
    Error,
}

/// Write-only sink consumed by the engine. The engine never reads back.
pub trait SyncLog: Send + Sync {
    fn log(&self, level: LogLevel, msg: &str);

    fn info(&self, msg: &str) {
        self.log(LogLevel::Info, msg);
    }
    fn action(&self, msg: &str) {
        self.log(LogLevel::Action, msg);
    }
    fn warn(&self, msg: &str) {
        self.log(LogLevel::Warn, msg);
    }
    fn error(&self, msg: &str) {
        self.log(LogLevel::Error, msg);
    }
}

/// Stdout sink. `Info` lines are gated on verbose; everything else prints.
pub struct ConsoleLog {
    verbose: bool,
    // stdout is line-buffered but interleaving from copy workers is not
    out: Mutex<()>,
}

impl ConsoleLog {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            out: Mutex::new(()),
        }
    }
}

impl SyncLog for ConsoleLog {
    fn log(&self, level: LogLevel, msg: &str) {
        if level == LogLevel::Info && !self.verbose {
            return;
        }
        let _guard = self.out.lock();
        match level {
            LogLevel::Error => eprintln!("{msg}"),
            _ => println!("{msg}"),
        }
    }
}

/// Sink that discards everything.
pub struct NoopLog;

impl SyncLog for NoopLog {
    fn log(&self, _level: LogLevel, _msg: &str) {}
}

/// Sink that records every message; used by tests to assert on the plan.
#[derive(Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines
            .lock()
            .iter()
            .filter(|(_, m)| m.contains(needle))
            .count()
    }
}

impl SyncLog for MemoryLog {
    fn log(&self, level: LogLevel, msg: &str) {
        self.lines.lock().push((level, msg.to_string()));
    }
}
