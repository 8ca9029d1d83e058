//! Token/cost accounting for the current turn.

use serde::{Deserialize, Serialize};

/// Last-write-wins snapshot of the turn's token/cost totals. In-stream
/// usage events already carry cumulative totals, so recording overwrites
/// rather than sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUsage {
    pub total_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug, Default)]
pub struct UsageAccumulator {
    current: SessionUsage,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an in-stream usage event, a best-effort interim signal.
    pub fn record(&mut self, input_tokens: u64, output_tokens: u64, cost: f64) {
        self.current = SessionUsage {
            total_tokens: input_tokens + output_tokens,
            total_cost: cost,
        };
    }

    /// Apply the authoritative post-stream server accounting, correcting
    /// any drift in the interim snapshot.
    pub fn reconcile(&mut self, total_tokens: u64, total_cost: f64) {
        self.current = SessionUsage {
            total_tokens,
            total_cost,
        };
    }

    pub fn snapshot(&self) -> SessionUsage {
        self.current
    }
}

/// Summary of the session after a completed turn, derived from the
/// reconciled usage and the controller's transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub project_id: String,
    pub model: String,
    pub message_count: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
}
