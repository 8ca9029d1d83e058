//! Tool invocation lifecycle tracking.
//!
//! Tool events arrive interleaved with text chunks. Start events open a
//! `Running` record; result events close it. Result events are the source
//! of truth for final state: one arriving without a matching start still
//! produces exactly one terminal record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolState {
    Running,
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: String,
    pub name: String,
    pub input: String,
    pub output: String,
    pub state: ToolState,
    pub duration_ms: Option<u64>,
    pub exit_code: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ToolExecutionTracker {
    executions: Vec<ToolExecution>,
}

impl ToolExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tool starting. Newest entries sit at the head of the list.
    pub fn begin(&mut self, id: String, name: String, input: String) {
        self.executions.insert(
            0,
            ToolExecution {
                id,
                name,
                input,
                output: String::new(),
                state: ToolState::Running,
                duration_ms: None,
                exit_code: None,
                timestamp: Utc::now(),
            },
        );
    }

    /// Record a tool finishing. An unmatched `tool_id` synthesizes a
    /// terminal record, covering dropped or out-of-order start events.
    pub fn complete(
        &mut self,
        tool_id: &str,
        name: Option<String>,
        is_error: bool,
        output: String,
        duration_ms: Option<u64>,
        exit_code: Option<i32>,
    ) {
        let state = if is_error {
            ToolState::Failure
        } else {
            ToolState::Success
        };

        if let Some(execution) = self.executions.iter_mut().find(|e| e.id == tool_id) {
            execution.state = state;
            execution.output = output;
            execution.duration_ms = duration_ms;
            execution.exit_code = exit_code;
            return;
        }

        self.executions.insert(
            0,
            ToolExecution {
                id: tool_id.to_string(),
                name: name.unwrap_or_default(),
                input: String::new(),
                output,
                state,
                duration_ms,
                exit_code,
                timestamp: Utc::now(),
            },
        );
    }

    pub fn executions(&self) -> &[ToolExecution] {
        &self.executions
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_result_transitions_to_success() {
        let mut tracker = ToolExecutionTracker::new();
        tracker.begin("t1".into(), "Search".into(), r#"{"q":"rust"}"#.into());
        assert_eq!(tracker.executions()[0].state, ToolState::Running);

        tracker.complete("t1", None, false, "3 results".into(), Some(120), Some(0));
        let execution = &tracker.executions()[0];
        assert_eq!(execution.state, ToolState::Success);
        assert_eq!(execution.output, "3 results");
        assert_eq!(execution.duration_ms, Some(120));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn error_result_transitions_to_failure() {
        let mut tracker = ToolExecutionTracker::new();
        tracker.begin("t1".into(), "Bash".into(), "ls /missing".into());
        tracker.complete("t1", None, true, "no such file".into(), None, Some(2));
        let execution = &tracker.executions()[0];
        assert_eq!(execution.state, ToolState::Failure);
        assert_eq!(execution.exit_code, Some(2));
    }

    #[test]
    fn orphan_result_synthesizes_one_terminal_record() {
        let mut tracker = ToolExecutionTracker::new();
        tracker.complete(
            "ghost",
            Some("Read".into()),
            false,
            "contents".into(),
            Some(5),
            None,
        );
        assert_eq!(tracker.len(), 1);
        let execution = &tracker.executions()[0];
        assert_eq!(execution.id, "ghost");
        assert_eq!(execution.name, "Read");
        assert_eq!(execution.state, ToolState::Success);
    }

    #[test]
    fn newest_execution_sits_at_the_head() {
        let mut tracker = ToolExecutionTracker::new();
        tracker.begin("t1".into(), "Search".into(), String::new());
        tracker.begin("t2".into(), "Read".into(), String::new());
        assert_eq!(tracker.executions()[0].id, "t2");
        assert_eq!(tracker.executions()[1].id, "t1");
    }
}
