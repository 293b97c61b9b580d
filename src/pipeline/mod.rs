//! Agent pipeline: sequential, chained execution of the selected agents.
//!
//! ## Data Flow
//!
//! ```text
//! source text ──▶ agent 1 ──▶ agent 2 ──▶ … ──▶ agent N
//!                   │            │                  │
//!                   ▼            ▼                  ▼
//!               log entry    log entry          log entry
//! ```
//!
//! 1. [`engine`] — the `Idle → Running → Completed | Failed` state machine,
//!    one stage per `advance()`, live state on a watch channel
//! 2. [`stage`]  — one model call; endpoint errors become the stage's text
//! 3. [`log`]    — append-only entries and the token estimate

pub mod engine;
pub mod log;
pub mod stage;

pub use engine::{PipelineEngine, PipelineRunState, RunPhase, StepOutcome};
pub use log::{estimate_tokens, ExecutionLog, ExecutionLogEntry};
pub use stage::{invoke_stage, StageOutcome};
