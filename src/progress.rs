//! Progress-callback trait for OCR and pipeline events.
//!
//! Attach an [`Arc<dyn ProgressObserver>`] to a
//! [`crate::session::ReviewSession`] or [`crate::pipeline::PipelineEngine`]
//! to receive events as pages render and stages run. Observers that prefer
//! polling can instead subscribe to the engine's
//! [`crate::pipeline::PipelineRunState`] watch channel.
//!
//! All methods have no-op defaults so implementors only override what they
//! need. The trait is `Send + Sync` because page rendering reports from a
//! blocking worker thread.
//!
//! # Example
//!
//! ```rust
//! use tfda_review::progress::ProgressObserver;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct StageCounter(AtomicUsize);
//!
//! impl ProgressObserver for StageCounter {
//!     fn on_stage_start(&self, index: usize, total: usize, agent_name: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{index}/{total}] {agent_name}");
//!     }
//! }
//! ```

use crate::pipeline::ExecutionLogEntry;
use std::sync::Arc;

pub trait ProgressObserver: Send + Sync {
    /// Called just before a PDF page is rasterised.
    ///
    /// # Arguments
    /// * `page_num` — 1-indexed page number in the document
    /// * `index`    — 1-indexed position within the selected pages
    /// * `total`    — number of selected pages
    fn on_render_page(&self, page_num: usize, index: usize, total: usize) {
        let _ = (page_num, index, total);
    }

    /// Called when the OCR request is about to be sent.
    fn on_ocr_start(&self, image_count: usize, model: &str) {
        let _ = (image_count, model);
    }

    /// Called when OCR returned text.
    fn on_ocr_complete(&self, text_len: usize) {
        let _ = text_len;
    }

    /// Called once when a pipeline run enters `Running`.
    fn on_run_start(&self, total_stages: usize) {
        let _ = total_stages;
    }

    /// Called before a stage's model call is issued.
    ///
    /// `index` is 1-indexed.
    fn on_stage_start(&self, index: usize, total: usize, agent_name: &str) {
        let _ = (index, total, agent_name);
    }

    /// Called after a stage's log entry has been appended.
    fn on_stage_complete(&self, index: usize, total: usize, entry: &ExecutionLogEntry) {
        let _ = (index, total, entry);
    }

    /// Called once after the last stage.
    fn on_run_complete(&self, total_stages: usize) {
        let _ = total_stages;
    }

    /// Called when a run aborts without finishing.
    fn on_run_failed(&self, message: &str) {
        let _ = message;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressObserver;

impl ProgressObserver for NoopProgressObserver {}

/// Shared handle stored by sessions and engines.
pub type ProgressCallback = Arc<dyn ProgressObserver>;

pub(crate) fn noop() -> ProgressCallback {
    Arc::new(NoopProgressObserver)
}
