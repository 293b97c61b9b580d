//! The pipeline state machine.
//!
//! ```text
//!          start()             last advance()
//!   Idle ──────────▶ Running ─────────────────▶ Completed
//!    ▲                  │                           │
//!    │                  │ stage panicked            │
//!    │                  ▼                           │
//!    └──── reset() ── Failed ◀──────────────────────┘ reset()
//! ```
//!
//! Each [`PipelineEngine::advance`] runs exactly one stage: it publishes the
//! stage as current, awaits the endpoint, appends the log entry and feeds the
//! output forward as the next stage's input. A failing call does not stop the
//! run (see [`super::stage`]); only a panic inside the call, or dropping the
//! `advance` future before the call returns, moves the engine to `Failed`.

use super::log::{ExecutionLog, ExecutionLogEntry};
use super::stage::invoke_stage;
use crate::agents::AgentDefinition;
use crate::endpoint::ModelEndpoint;
use crate::error::ReviewError;
use crate::progress::{self, ProgressCallback};
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{error, info, warn};

/// Lifecycle phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Snapshot published to observers after every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunState {
    pub phase: RunPhase,
    /// Stage in flight, `None` outside of a stage call.
    pub current_agent_id: Option<String>,
    /// `completed_stages / total_stages * 100`.
    pub progress_percent: f64,
    pub status_message: String,
    pub completed_stages: usize,
    pub total_stages: usize,
}

impl PipelineRunState {
    pub fn idle() -> Self {
        Self {
            phase: RunPhase::Idle,
            current_agent_id: None,
            progress_percent: 0.0,
            status_message: String::new(),
            completed_stages: 0,
            total_stages: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == RunPhase::Running
    }
}

/// Result of one [`PipelineEngine::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Stage `index` (0-based) was logged and more stages remain.
    StageLogged { index: usize },
    /// The final stage was logged; the engine is `Completed`.
    Completed,
}

pub struct PipelineEngine {
    endpoint: Arc<dyn ModelEndpoint>,
    observer: ProgressCallback,
    stages: Vec<AgentDefinition>,
    next_stage: usize,
    current_input: String,
    credential: String,
    log: ExecutionLog,
    state: watch::Sender<PipelineRunState>,
}

impl PipelineEngine {
    pub fn new(endpoint: Arc<dyn ModelEndpoint>) -> Self {
        let (state, _) = watch::channel(PipelineRunState::idle());
        Self {
            endpoint,
            observer: progress::noop(),
            stages: Vec::new(),
            next_stage: 0,
            current_input: String::new(),
            credential: String::new(),
            log: ExecutionLog::default(),
            state,
        }
    }

    pub fn with_observer(mut self, observer: ProgressCallback) -> Self {
        self.observer = observer;
        self
    }

    pub(crate) fn set_observer(&mut self, observer: ProgressCallback) {
        self.observer = observer;
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    /// Current state snapshot.
    pub fn state(&self) -> PipelineRunState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> RunPhase {
        self.state.borrow().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() == RunPhase::Running
    }

    /// Stages of the active or last run, in execution order.
    pub fn stages(&self) -> &[AgentDefinition] {
        &self.stages
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<PipelineRunState> {
        self.state.subscribe()
    }

    /// State changes as a `Stream`, starting with the current state.
    pub fn progress_stream(&self) -> WatchStream<PipelineRunState> {
        WatchStream::new(self.state.subscribe())
    }

    /// Enter `Running` with a fixed list of stages.
    ///
    /// `stages` is the caller's ordered snapshot; later edits to the agent
    /// store do not affect this run. A finished or failed run is cleared
    /// first. On rejection nothing changes.
    pub fn start(
        &mut self,
        stages: Vec<AgentDefinition>,
        source_text: &str,
        credential: &str,
    ) -> Result<(), ReviewError> {
        if self.is_running() {
            return Err(ReviewError::RunInProgress);
        }
        if source_text.is_empty() {
            return Err(ReviewError::EmptySourceText);
        }
        if credential.trim().is_empty() {
            return Err(ReviewError::MissingCredential);
        }
        if stages.is_empty() {
            return Err(ReviewError::EmptySelection);
        }

        self.log.clear();
        let total = stages.len();
        self.stages = stages;
        self.next_stage = 0;
        self.current_input = source_text.to_string();
        self.credential = credential.to_string();

        info!("Pipeline started with {} agents", total);
        self.publish(PipelineRunState {
            phase: RunPhase::Running,
            current_agent_id: None,
            progress_percent: 0.0,
            status_message: format!("Starting pipeline with {total} agents..."),
            completed_stages: 0,
            total_stages: total,
        });
        self.observer.on_run_start(total);
        Ok(())
    }

    /// Run the next stage.
    pub async fn advance(&mut self) -> Result<StepOutcome, ReviewError> {
        if !self.is_running() {
            return Err(ReviewError::NotRunning);
        }
        let index = self.next_stage;
        let total = self.stages.len();
        let Some(agent) = self.stages.get(index).cloned() else {
            return Err(ReviewError::Internal(format!(
                "stage {index} out of range in a run of {total}"
            )));
        };

        self.publish(PipelineRunState {
            phase: RunPhase::Running,
            current_agent_id: Some(agent.id.clone()),
            progress_percent: percent(index, total),
            status_message: format!("Running Agent: {}...", agent.name),
            completed_stages: index,
            total_stages: total,
        });
        self.observer.on_stage_start(index + 1, total, &agent.name);
        info!("[{}/{}] Running agent {} ({})", index + 1, total, agent.id, agent.model_id);

        let guard = InFlight {
            state: &self.state,
            observer: &self.observer,
            agent_id: &agent.id,
            completed: index,
            total,
            armed: true,
        };
        let call = invoke_stage(
            self.endpoint.as_ref(),
            &self.credential,
            &agent,
            &self.current_input,
        );
        let caught = AssertUnwindSafe(call).catch_unwind().await;
        guard.disarm();
        let outcome = match caught {
            Ok(outcome) => outcome,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                return Err(self.fail(&agent.id, detail));
            }
        };

        let entry = ExecutionLogEntry {
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            input: std::mem::take(&mut self.current_input),
            output: outcome.output,
            latency_seconds: outcome.latency_seconds,
            tokens: outcome.tokens,
            timestamp: Utc::now(),
        };
        self.current_input = entry.output.clone();
        self.log.push(entry);
        self.next_stage = index + 1;
        let completed = self.next_stage;

        if let Some(entry) = self.log.last() {
            self.observer.on_stage_complete(index + 1, total, entry);
        }

        if completed == total {
            info!("Pipeline completed: {} agents", total);
            self.publish(PipelineRunState {
                phase: RunPhase::Completed,
                current_agent_id: None,
                progress_percent: 100.0,
                status_message: "Pipeline execution completed.".to_string(),
                completed_stages: completed,
                total_stages: total,
            });
            self.observer.on_run_complete(total);
            Ok(StepOutcome::Completed)
        } else {
            self.publish(PipelineRunState {
                phase: RunPhase::Running,
                current_agent_id: None,
                progress_percent: percent(completed, total),
                status_message: format!("Completed {completed}/{total} agents"),
                completed_stages: completed,
                total_stages: total,
            });
            Ok(StepOutcome::StageLogged { index })
        }
    }

    /// Advance until the run completes or fails.
    pub async fn run_to_completion(&mut self) -> Result<(), ReviewError> {
        loop {
            if self.advance().await? == StepOutcome::Completed {
                return Ok(());
            }
        }
    }

    /// Discard the log and return to `Idle`.
    pub fn reset(&mut self) -> Result<(), ReviewError> {
        if self.is_running() {
            return Err(ReviewError::RunInProgress);
        }
        self.log.clear();
        self.stages.clear();
        self.next_stage = 0;
        self.current_input.clear();
        self.credential.clear();
        self.publish(PipelineRunState::idle());
        Ok(())
    }

    fn fail(&self, agent_id: &str, detail: String) -> ReviewError {
        error!("Pipeline aborted in agent {}: {}", agent_id, detail);
        let completed = self.log.len();
        let total = self.stages.len();
        let message = format!("Pipeline failed in {agent_id}: {detail}");
        self.publish(PipelineRunState {
            phase: RunPhase::Failed,
            current_agent_id: None,
            progress_percent: percent(completed, total),
            status_message: message.clone(),
            completed_stages: completed,
            total_stages: total,
        });
        self.observer.on_run_failed(&message);
        ReviewError::StageAborted {
            agent_id: agent_id.to_string(),
            detail,
        }
    }

    fn publish(&self, state: PipelineRunState) {
        self.state.send_replace(state);
    }
}

/// Marks the engine `Failed` if an `advance` future is dropped mid-call,
/// so `reset` can recover the engine.
struct InFlight<'a> {
    state: &'a watch::Sender<PipelineRunState>,
    observer: &'a ProgressCallback,
    agent_id: &'a str,
    completed: usize,
    total: usize,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let message = format!("Pipeline failed in {}: stage call was abandoned", self.agent_id);
        warn!("{}", message);
        self.state.send_replace(PipelineRunState {
            phase: RunPhase::Failed,
            current_agent_id: None,
            progress_percent: percent(self.completed, self.total),
            status_message: message.clone(),
            completed_stages: self.completed,
            total_stages: self.total,
        });
        self.observer.on_run_failed(&message);
    }
}

fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64 * 100.0
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "stage panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::default_agents;
    use crate::endpoint::mock::{MockEndpoint, MockReply};

    fn engine(mock: MockEndpoint) -> (PipelineEngine, Arc<MockEndpoint>) {
        let mock = Arc::new(mock);
        (PipelineEngine::new(mock.clone()), mock)
    }

    #[test]
    fn new_engine_is_idle() {
        let (engine, _) = engine(MockEndpoint::echo());
        let state = engine.state();
        assert_eq!(state, PipelineRunState::idle());
        assert!(engine.log().is_empty());
    }

    #[test]
    fn start_checks_preconditions_in_order() {
        let (mut engine, _) = engine(MockEndpoint::echo());
        let stages = default_agents();

        let err = engine.start(stages.clone(), "", "").unwrap_err();
        assert!(matches!(err, ReviewError::EmptySourceText));
        let err = engine.start(Vec::new(), "text", "").unwrap_err();
        assert!(matches!(err, ReviewError::MissingCredential));
        let err = engine.start(Vec::new(), "text", "key").unwrap_err();
        assert!(matches!(err, ReviewError::EmptySelection));
        assert_eq!(engine.phase(), RunPhase::Idle);
    }

    #[test]
    fn start_while_running_is_rejected() {
        let (mut engine, _) = engine(MockEndpoint::echo());
        engine.start(default_agents(), "text", "key").unwrap();
        let err = engine.start(default_agents(), "text", "key").unwrap_err();
        assert!(matches!(err, ReviewError::RunInProgress));
        assert!(matches!(engine.reset(), Err(ReviewError::RunInProgress)));
    }

    #[tokio::test]
    async fn advance_when_idle_is_rejected() {
        let (mut engine, _) = engine(MockEndpoint::echo());
        assert!(matches!(engine.advance().await, Err(ReviewError::NotRunning)));
    }

    #[tokio::test]
    async fn stages_chain_outputs() {
        let (mut engine, mock) = engine(MockEndpoint::scripted([
            MockReply::Text("first".into()),
            MockReply::Text("second".into()),
        ]));
        let stages = default_agents()[..2].to_vec();
        engine.start(stages, "source", "key").unwrap();

        assert_eq!(engine.advance().await.unwrap(), StepOutcome::StageLogged { index: 0 });
        let mid = engine.state();
        assert_eq!(mid.phase, RunPhase::Running);
        assert_eq!(mid.progress_percent, 50.0);
        assert_eq!(mid.completed_stages, 1);

        assert_eq!(engine.advance().await.unwrap(), StepOutcome::Completed);
        let entries = engine.log().entries();
        assert_eq!(entries[0].input, "source");
        assert_eq!(entries[1].input, "first");
        assert_eq!(entries[1].output, "second");

        let done = engine.state();
        assert_eq!(done.phase, RunPhase::Completed);
        assert_eq!(done.current_agent_id, None);
        assert_eq!(done.progress_percent, 100.0);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn failed_call_does_not_stop_the_run() {
        let (mut engine, _) = engine(MockEndpoint::scripted([
            MockReply::Fail(crate::error::EndpointError::Transport("reset by peer".into())),
            MockReply::Text("recovered".into()),
        ]));
        engine.start(default_agents()[..2].to_vec(), "source", "key").unwrap();
        engine.run_to_completion().await.unwrap();

        let entries = engine.log().entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].output.starts_with("Error executing agent"));
        assert_eq!(entries[0].tokens, 0);
        assert_eq!(entries[1].input, entries[0].output);
        assert_eq!(engine.phase(), RunPhase::Completed);
    }

    #[tokio::test]
    async fn panic_moves_to_failed_and_keeps_log() {
        let (mut engine, _) = engine(MockEndpoint::scripted([
            MockReply::Text("ok".into()),
            MockReply::Panic("endpoint exploded".into()),
        ]));
        engine.start(default_agents()[..3].to_vec(), "source", "key").unwrap();
        let err = engine.run_to_completion().await.unwrap_err();
        match err {
            ReviewError::StageAborted { agent_id, detail } => {
                assert_eq!(agent_id, "agent-2");
                assert!(detail.contains("endpoint exploded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(engine.phase(), RunPhase::Failed);
        assert_eq!(engine.state().current_agent_id, None);
        assert_eq!(engine.log().len(), 1);

        engine.reset().unwrap();
        assert_eq!(engine.phase(), RunPhase::Idle);
        assert!(engine.log().is_empty());
    }

    #[tokio::test]
    async fn restart_after_completion_clears_previous_log() {
        let (mut engine, _) = engine(MockEndpoint::echo());
        engine.start(default_agents()[..2].to_vec(), "a", "key").unwrap();
        engine.run_to_completion().await.unwrap();
        engine.start(default_agents()[..1].to_vec(), "b", "key").unwrap();
        engine.run_to_completion().await.unwrap();
        assert_eq!(engine.log().len(), 1);
        assert_eq!(engine.log().entries()[0].input, "b");
    }

    /// Records which agent the published state names at call time.
    #[derive(Default)]
    struct Probe {
        rx: std::sync::Mutex<Option<watch::Receiver<PipelineRunState>>>,
        seen: std::sync::Mutex<Vec<Option<String>>>,
    }

    #[async_trait::async_trait]
    impl ModelEndpoint for Probe {
        async fn generate(
            &self,
            _credential: &str,
            _request: &crate::endpoint::ModelRequest,
        ) -> Result<crate::endpoint::ModelResponse, crate::error::EndpointError> {
            let current = self
                .rx
                .lock()
                .unwrap()
                .as_ref()
                .and_then(|rx| rx.borrow().current_agent_id.clone());
            self.seen.lock().unwrap().push(current);
            Ok(crate::endpoint::ModelResponse { text: "ok".into() })
        }

        fn name(&self) -> &str {
            "probe"
        }
    }

    #[tokio::test]
    async fn current_agent_is_published_before_the_call() {
        let probe = Arc::new(Probe::default());
        let mut engine = PipelineEngine::new(probe.clone());
        *probe.rx.lock().unwrap() = Some(engine.subscribe());

        engine.start(default_agents()[..2].to_vec(), "a", "key").unwrap();
        engine.run_to_completion().await.unwrap();

        let seen = probe.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![Some("agent-1".to_string()), Some("agent-2".to_string())]);
        assert_eq!(engine.state().current_agent_id, None);
    }

    #[test]
    fn whitespace_source_text_is_accepted() {
        let (mut engine, _) = engine(MockEndpoint::echo());
        engine.start(default_agents()[..1].to_vec(), " \n", "key").unwrap();
        assert!(engine.is_running());
    }

    /// Never answers within a test's lifetime.
    struct Stalled;

    #[async_trait::async_trait]
    impl ModelEndpoint for Stalled {
        async fn generate(
            &self,
            _credential: &str,
            _request: &crate::endpoint::ModelRequest,
        ) -> Result<crate::endpoint::ModelResponse, crate::error::EndpointError> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(crate::endpoint::ModelResponse { text: "late".into() })
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn abandoned_stage_fails_the_run_and_reset_recovers() {
        let mut engine = PipelineEngine::new(Arc::new(Stalled));
        engine.start(default_agents()[..2].to_vec(), "source", "key").unwrap();

        let step = tokio::time::timeout(std::time::Duration::from_millis(50), engine.advance()).await;
        assert!(step.is_err(), "call should still be pending");

        let state = engine.state();
        assert_eq!(state.phase, RunPhase::Failed);
        assert_eq!(state.current_agent_id, None);
        assert!(state.status_message.contains("agent-1"));
        assert!(engine.log().is_empty());

        engine.reset().unwrap();
        assert_eq!(engine.phase(), RunPhase::Idle);
        engine.start(default_agents()[..1].to_vec(), "again", "key").unwrap();
        assert!(engine.is_running());
    }

    #[test]
    fn percent_handles_zero_total() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }

    #[test]
    fn panic_message_downcasts() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "stage panicked");
    }
}
