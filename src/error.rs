//! Error types for the tfda-review library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReviewError`] — **Fatal for one operation**: a precondition was not
//!   met (no credential, nothing selected) or a collaborator failed
//!   (document load, OCR call, refinement call). The operation never starts
//!   or aborts back to its prior stable state.
//!
//! * [`EndpointError`] — **One model call failed**. The OCR and refinement
//!   steps wrap it into a [`ReviewError`]; a pipeline stage turns it into a
//!   textual output and the run continues with the next stage.

use std::path::PathBuf;
use thiserror::Error;

/// All operation-level errors returned by the tfda-review library.
#[derive(Debug, Error)]
pub enum ReviewError {
    // ── Precondition rejections ───────────────────────────────────────────
    /// No credential has been configured for the model endpoint.
    #[error("API key missing.\nSet GEMINI_API_KEY or pass --api-key.")]
    MissingCredential,

    /// The pipeline was started without source text.
    #[error("No source text: upload a document and perform OCR first.")]
    EmptySourceText,

    /// The pipeline was started with no agent selected.
    #[error("Please select at least one agent to run.")]
    EmptySelection,

    /// The page range produced no page inside the document.
    #[error("Invalid page range '{range}' selected (document has {total} pages)")]
    NoPagesSelected { range: String, total: usize },

    /// OCR was requested before a document was loaded.
    #[error("No document loaded")]
    NoDocument,

    /// A run is already in flight; the requested mutation or start is refused.
    #[error("A pipeline run is in progress")]
    RunInProgress,

    /// `advance` was called while no run is active.
    #[error("No pipeline run is active")]
    NotRunning,

    /// The referenced agent id does not exist in the store.
    #[error("Unknown agent '{id}'")]
    UnknownAgent { id: String },

    // ── Collaborator failures ─────────────────────────────────────────────
    /// The document bytes could not be opened by the renderer.
    #[error("Error loading document: {detail}")]
    DocumentLoadFailure { detail: String },

    /// The input is neither a PDF nor a supported image.
    #[error("Unsupported document '{name}': expected a PDF, PNG or JPEG file")]
    UnsupportedDocument { name: String },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// The vision OCR call failed.
    #[error("OCR Failed: {0}")]
    OcrFailure(#[source] EndpointError),

    /// The notes refinement call failed.
    #[error("Failed to refine notes: {0}")]
    RefinementFailed(#[source] EndpointError),

    /// A stage aborted the run without producing an output (hard failure).
    #[error("Pipeline aborted in agent '{agent_id}': {detail}")]
    StageAborted { agent_id: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or field validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Persistence errors ────────────────────────────────────────────────
    /// The settings file could not be read or written.
    #[error("Settings store error at '{path}': {detail}")]
    Settings { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of a single external model call.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum EndpointError {
    /// The endpoint rejected the credential (HTTP 401/403).
    #[error("authentication rejected: {message}")]
    Auth { message: String },

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never produced a response (DNS, TLS, timeout, …).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// An edgequake-llm provider returned an error.
    #[error("provider error: {0}")]
    Provider(String),
}

impl From<reqwest::Error> for EndpointError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            EndpointError::InvalidResponse(e.to_string())
        } else {
            EndpointError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pages_display() {
        let e = ReviewError::NoPagesSelected {
            range: "abc".into(),
            total: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains("'abc'"), "got: {msg}");
        assert!(msg.contains("5 pages"), "got: {msg}");
    }

    #[test]
    fn ocr_failure_carries_endpoint_message() {
        let e = ReviewError::OcrFailure(EndpointError::Api {
            status: 500,
            message: "backend overloaded".into(),
        });
        let msg = e.to_string();
        assert!(msg.starts_with("OCR Failed"), "got: {msg}");
        assert!(msg.contains("backend overloaded"), "got: {msg}");
    }

    #[test]
    fn auth_error_display() {
        let e = EndpointError::Auth {
            message: "API key not valid".into(),
        };
        assert!(e.to_string().contains("API key not valid"));
    }

    #[test]
    fn stage_aborted_display() {
        let e = ReviewError::StageAborted {
            agent_id: "agent-3".into(),
            detail: "panicked".into(),
        };
        assert!(e.to_string().contains("agent-3"));
    }
}
