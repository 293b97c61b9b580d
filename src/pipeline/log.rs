//! Append-only record of a pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One executed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub agent_id: String,
    pub agent_name: String,
    /// Exact document body sent to the stage.
    pub input: String,
    /// Model text, or an error description when the call failed.
    pub output: String,
    pub latency_seconds: f64,
    /// Character-based estimate; 0 for a failed call.
    pub tokens: u64,
    /// When the stage call returned.
    pub timestamp: DateTime<Utc>,
}

/// Entries of the current run, in stage order.
///
/// Only the engine appends; everything else reads through [`ExecutionLog::entries`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    entries: Vec<ExecutionLogEntry>,
}

impl ExecutionLog {
    pub fn entries(&self) -> &[ExecutionLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ExecutionLogEntry> {
        self.entries.last()
    }

    /// Output of the final stage, i.e. the result of the whole chain.
    pub fn final_output(&self) -> Option<&str> {
        self.last().map(|e| e.output.as_str())
    }

    pub(crate) fn push(&mut self, entry: ExecutionLogEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Advisory token count: a quarter of the characters of everything the
/// stage sent and received, rounded up.
pub fn estimate_tokens(system_instruction: &str, user_prefix: &str, input: &str, output: &str) -> u64 {
    let chars = [system_instruction, user_prefix, input, output]
        .iter()
        .map(|s| s.chars().count() as u64)
        .sum::<u64>();
    chars.div_ceil(4)
}
