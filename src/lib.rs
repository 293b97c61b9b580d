//! # tfda-review
//!
//! Multi-agent review of medical-device and drug regulatory submissions.
//!
//! A scanned submission (PDF or image) is transcribed by a vision model, then
//! handed to a chain of configurable analysis agents: each agent receives the
//! previous agent's output, so the last one sees everything the chain
//! produced. Every stage is logged with its exact input, output, latency and
//! a token estimate.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PNG / JPEG
//!  │
//!  ├─ 1. Select   page range "1-3,5"  →  [1, 2, 3, 5]
//!  ├─ 2. Render   rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. OCR      one vision call, all pages inline   →  source text
//!  ├─ 4. Agents   agent 1 → agent 2 → … → agent N     →  execution log
//!  └─ 5. Metrics  totals, average latency, per-agent projections
//! ```
//!
//! A quick-notes buffer rides alongside: it can be refined by the model and
//! exported as printable HTML.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tfda_review::{endpoint_for, ReviewConfig, ReviewSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ReviewConfig::default();
//!     let endpoint = endpoint_for(&config)?;
//!     let mut session = ReviewSession::new(config, endpoint);
//!     session.use_credential(std::env::var("GEMINI_API_KEY")?);
//!
//!     session.open_document("submission.pdf").await?;
//!     session.extract_text(|pages| pages <= 50).await?;
//!     session.run_pipeline().await?;
//!
//!     for entry in session.log().entries() {
//!         println!("## {}\n\n{}\n", entry.agent_name, entry.output);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tfda-review` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! tfda-review = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod agents;
pub mod config;
pub mod document;
pub mod endpoint;
pub mod error;
pub mod export;
pub mod metrics;
pub mod ocr;
pub mod pages;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod refine;
pub mod session;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use agents::{default_agents, AgentDefinition, AgentField, AgentSelection, AgentStore};
pub use config::{RefinementConfig, ReviewConfig, ReviewConfigBuilder};
pub use document::{DocumentKind, SourceDocument};
pub use endpoint::{GenerationParams, InlineImage, ModelEndpoint, ModelRequest, ModelResponse, Part};
pub use error::{EndpointError, ReviewError};
pub use export::notes_to_html;
pub use metrics::{summarize, EntryProjection, RunMetrics};
pub use pages::parse_page_range;
pub use pipeline::{
    estimate_tokens, ExecutionLog, ExecutionLogEntry, PipelineEngine, PipelineRunState, RunPhase,
    StepOutcome,
};
pub use progress::{NoopProgressObserver, ProgressCallback, ProgressObserver};
pub use prompts::NotePreset;
pub use session::{endpoint_for, OcrOutcome, ReviewSession};
pub use store::{Settings, SettingsStore};
