//! Dashboard figures derived from an [`ExecutionLog`].
//!
//! Everything here is a pure function of the log and is recomputed on every
//! read.

use crate::pipeline::{ExecutionLog, ExecutionLogEntry};
use serde::Serialize;

/// Agent names longer than this are cut for chart labels.
pub const CHART_NAME_CHARS: usize = 10;

/// Length of the output preview shown next to each stage.
pub const OUTPUT_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub total_executions: usize,
    pub total_tokens: u64,
    /// Mean latency rounded to two decimals; `None` for an empty log.
    pub average_latency_seconds: Option<f64>,
    pub entries: Vec<EntryProjection>,
}

/// One bar of the per-agent chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryProjection {
    pub agent_id: String,
    pub name: String,
    pub tokens: u64,
    pub latency_seconds: f64,
    pub output_preview: String,
}

impl RunMetrics {
    pub fn is_empty(&self) -> bool {
        self.total_executions == 0
    }
}

pub fn summarize(log: &ExecutionLog) -> RunMetrics {
    let entries = log.entries();
    let total_tokens = entries.iter().map(|e| e.tokens).sum();
    let average_latency_seconds = (!entries.is_empty()).then(|| {
        let sum: f64 = entries.iter().map(|e| e.latency_seconds).sum();
        round2(sum / entries.len() as f64)
    });

    RunMetrics {
        total_executions: entries.len(),
        total_tokens,
        average_latency_seconds,
        entries: entries.iter().map(project).collect(),
    }
}

fn project(entry: &ExecutionLogEntry) -> EntryProjection {
    EntryProjection {
        agent_id: entry.agent_id.clone(),
        name: truncate(&entry.agent_name, CHART_NAME_CHARS),
        tokens: entry.tokens,
        latency_seconds: round2(entry.latency_seconds),
        output_preview: truncate(&entry.output, OUTPUT_PREVIEW_CHARS),
    }
}

/// First `max` characters plus `...` when `s` is longer.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
