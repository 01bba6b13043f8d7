//! Process discovery strategies.
//!
//! | Strategy | Mechanism | Match rule |
//! |----------|-----------|------------|
//! | [`PgrepFinder`] | `pgrep -x <name>` | exact process name |
//! | [`ProcTableFinder`] | full process table via `sysinfo` | case-insensitive substring, executable first |

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use sysinfo::{ProcessesToUpdate, System};

use super::ReloadError;

/// A way of locating the daemon's process id.
///
/// `Ok(None)` means the strategy ran and found nothing; `Err` means the
/// strategy itself is unusable here (missing tool, empty process table).
pub trait ProcessFinder: Send + Sync {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    fn find(&self, process_name: &str) -> Result<Option<u32>, ReloadError>;
}

/// Fast lookup through the system `pgrep` tool.
#[derive(Debug, Clone)]
pub struct PgrepFinder {
    pgrep_bin: PathBuf,
}

impl PgrepFinder {
    pub fn new(pgrep_bin: impl Into<PathBuf>) -> Self {
        Self {
            pgrep_bin: pgrep_bin.into(),
        }
    }
}

impl Default for PgrepFinder {
    fn default() -> Self {
        Self::new("pgrep")
    }
}

impl ProcessFinder for PgrepFinder {
    fn name(&self) -> &'static str {
        "pgrep"
    }

    fn find(&self, process_name: &str) -> Result<Option<u32>, ReloadError> {
        let output = Command::new(&self.pgrep_bin)
            .arg("-x")
            .arg(process_name)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| ReloadError::LookupUnavailable {
                strategy: self.name(),
                reason: e.to_string(),
            })?;

        // pgrep: 0 = matched, 1 = no match, anything else = usage/fatal error
        match output.status.code() {
            Some(0) => {
                let own = std::process::id();
                Ok(String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .filter_map(|line| line.trim().parse().ok())
                    .find(|pid| *pid != own))
            }
            Some(1) => Ok(None),
            _ => Err(ReloadError::LookupUnavailable {
                strategy: self.name(),
                reason: format!("pgrep exited with {}", output.status),
            }),
        }
    }
}

/// One row of a process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    /// Kernel-reported process name (may be truncated).
    pub name: String,
    /// Full argv; empty for kernel threads and processes we cannot inspect.
    pub cmd: Vec<String>,
}

impl ProcessEntry {
    /// An entry whose name is the basename of `argv[0]`.
    pub fn from_argv<S: AsRef<str>>(pid: u32, argv: impl IntoIterator<Item = S>) -> Self {
        let cmd: Vec<String> = argv.into_iter().map(|a| a.as_ref().to_string()).collect();
        let name = cmd.first().map(|a| basename(a).to_string()).unwrap_or_default();
        Self { pid, name, cmd }
    }
}

/// How strongly an entry matches the daemon name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchRank {
    /// The process name or `argv[0]` names the daemon.
    Executable,
    /// Only a later argument mentions it (an editor on its config, a `tail`
    /// on its log).
    Argument,
}

fn match_rank(entry: &ProcessEntry, needle: &str) -> Option<MatchRank> {
    let contains = |s: &str| s.to_lowercase().contains(needle);

    let argv0 = entry.cmd.first().map(|a| basename(a));
    if contains(&entry.name) || argv0.is_some_and(contains) {
        Some(MatchRank::Executable)
    } else if entry.cmd.iter().skip(1).any(|a| contains(a)) {
        Some(MatchRank::Argument)
    } else {
        None
    }
}

fn basename(arg: &str) -> &str {
    Path::new(arg)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(arg)
}

/// Pick the entry that best matches `process_name`: executable matches
/// before argument-only matches, lowest pid within a rank, never ourselves.
pub fn best_match<'a>(
    entries: impl IntoIterator<Item = &'a ProcessEntry>,
    process_name: &str,
) -> Option<u32> {
    let needle = process_name.to_lowercase();
    let own = std::process::id();
    entries
        .into_iter()
        .filter(|entry| entry.pid != own)
        .filter_map(|entry| match_rank(entry, &needle).map(|rank| (rank, entry.pid)))
        .min()
        .map(|(_, pid)| pid)
}

type Snapshot = dyn Fn() -> Vec<ProcessEntry> + Send + Sync;

/// Full process-table scan matching on the process name and command line.
#[derive(Clone)]
pub struct ProcTableFinder {
    snapshot: Arc<Snapshot>,
}

impl ProcTableFinder {
    /// Scan the live process table.
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(live_processes),
        }
    }

    /// Match against a fixed table instead of the live one.
    pub fn from_entries(entries: Vec<ProcessEntry>) -> Self {
        Self {
            snapshot: Arc::new(move || entries.clone()),
        }
    }
}

impl Default for ProcTableFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProcTableFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcTableFinder").finish_non_exhaustive()
    }
}

fn live_processes() -> Vec<ProcessEntry> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    system
        .processes()
        .iter()
        .map(|(pid, process)| ProcessEntry {
            pid: pid.as_u32(),
            name: process.name().to_string_lossy().into_owned(),
            cmd: process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
        })
        .collect()
}

impl ProcessFinder for ProcTableFinder {
    fn name(&self) -> &'static str {
        "process-table"
    }

    fn find(&self, process_name: &str) -> Result<Option<u32>, ReloadError> {
        let entries = (self.snapshot)();
        // Every host has at least one process (us); nothing means no access.
        if entries.is_empty() {
            return Err(ReloadError::LookupUnavailable {
                strategy: self.name(),
                reason: "process table is empty".to_string(),
            });
        }
        Ok(best_match(&entries, process_name))
    }
}
