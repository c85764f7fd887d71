//! Engine configuration.

use std::thread;

/// Reconciliation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Scheduled mode: candidates carry per-second observations and are
    /// compared against the stored state for the exact second.
    Automatic,
    /// Manual mode: one candidate per entity representing the present
    /// live state, compared against the latest stored state.
    Manual,
}

impl SyncMode {
    /// Returns true in manual mode.
    #[must_use]
    pub const fn is_manual(self) -> bool {
        matches!(self, Self::Manual)
    }
}

/// Configuration consumed by the reconciliation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker thread count; 0 means use available parallelism.
    pub threads: usize,
    /// Debug verbosity: 0 quiet, 1 per-candidate decisions, 2 full dumps.
    pub debug: u8,
    /// When set, the snapshot writer is bypassed and a log line emitted.
    pub skip_writes: bool,
    /// Reconciliation mode.
    pub mode: SyncMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            debug: 0,
            skip_writes: false,
            mode: SyncMode::Automatic,
        }
    }
}

impl EngineConfig {
    /// Effective worker-pool size.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            thread::available_parallelism().map_or(1, usize::from)
        }
    }
}
