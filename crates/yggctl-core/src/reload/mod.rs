//! Reload orchestration: find the running daemon and send it SIGHUP.
//!
//! Strategies are tried in order and the first one that finds a process
//! wins. A daemon that is not running is a normal outcome, so
//! [`ReloadOrchestrator::reload`] reports `false` instead of failing. The
//! signal is fire-and-forget: `true` means "delivered", not "reloaded".

pub mod finder;

use std::sync::Arc;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

pub use finder::{PgrepFinder, ProcTableFinder, ProcessEntry, ProcessFinder, best_match};

/// Internal reload failures. Never returned from [`ReloadOrchestrator::reload`].
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("process lookup via {strategy} unavailable: {reason}")]
    LookupUnavailable {
        strategy: &'static str,
        reason: String,
    },

    #[error("failed to signal pid {pid}: {reason}")]
    Signal { pid: u32, reason: String },
}

/// Delivers the reload signal to a process.
pub trait ProcessSignaller: Send + Sync {
    fn signal_reload(&self, pid: u32) -> Result<(), ReloadError>;
}

/// Sends SIGHUP with `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HangupSignaller;

impl ProcessSignaller for HangupSignaller {
    fn signal_reload(&self, pid: u32) -> Result<(), ReloadError> {
        let raw = i32::try_from(pid).map_err(|_| ReloadError::Signal {
            pid,
            reason: "pid out of range".to_string(),
        })?;
        kill(Pid::from_raw(raw), Signal::SIGHUP).map_err(|e| ReloadError::Signal {
            pid,
            reason: e.to_string(),
        })
    }
}

/// Locates the daemon and asks it to re-read its configuration.
#[derive(Clone)]
pub struct ReloadOrchestrator {
    process_name: String,
    finders: Vec<Arc<dyn ProcessFinder>>,
    signaller: Arc<dyn ProcessSignaller>,
}

impl ReloadOrchestrator {
    /// `pgrep` first, then a process-table scan, signaling with SIGHUP.
    pub fn new(process_name: impl Into<String>) -> Self {
        Self::with_strategies(
            process_name,
            vec![
                Arc::new(PgrepFinder::default()),
                Arc::new(ProcTableFinder::default()),
            ],
            Arc::new(HangupSignaller),
        )
    }

    pub fn with_strategies(
        process_name: impl Into<String>,
        finders: Vec<Arc<dyn ProcessFinder>>,
        signaller: Arc<dyn ProcessSignaller>,
    ) -> Self {
        Self {
            process_name: process_name.into(),
            finders,
            signaller,
        }
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Signal the daemon to reload. Returns whether a signal was delivered.
    ///
    /// Lookups shell out and walk the process table, so they run on the
    /// blocking pool.
    pub async fn reload(&self) -> bool {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.reload_blocking()).await {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(error = %e, "Reload task failed");
                false
            }
        }
    }

    /// Synchronous form of [`reload`](Self::reload).
    pub fn reload_blocking(&self) -> bool {
        for finder in &self.finders {
            match finder.find(&self.process_name) {
                Ok(Some(pid)) => {
                    return match self.signaller.signal_reload(pid) {
                        Ok(()) => {
                            info!(
                                pid,
                                strategy = finder.name(),
                                process = %self.process_name,
                                "Sent reload signal"
                            );
                            true
                        }
                        Err(e) => {
                            warn!(error = %e, strategy = finder.name(), "Reload signal failed");
                            false
                        }
                    };
                }
                Ok(None) => {
                    debug!(strategy = finder.name(), process = %self.process_name, "No matching process");
                }
                Err(e) => {
                    debug!(error = %e, "Process lookup strategy unavailable, falling back");
                }
            }
        }

        warn!(process = %self.process_name, "Daemon process not found, config saved without reload");
        false
    }
}

impl std::fmt::Debug for ReloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadOrchestrator")
            .field("process_name", &self.process_name)
            .field(
                "finders",
                &self.finders.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
