//! The review session: one explicit owner for everything a review needs.
//!
//! ```text
//!   ReviewSession
//!    ├─ credential ──────────────┐ (persisted on every change)
//!    ├─ AgentStore + Selection   │
//!    ├─ document + page range    ├──▶ OCR ──▶ source text ──▶ PipelineEngine
//!    ├─ source text              │                               └─ ExecutionLog
//!    ├─ notes + RefinementConfig ┘ (config persisted on save)
//!    └─ SettingsStore (optional)
//! ```
//!
//! Agent definitions and the selection are frozen while a run is in
//! progress: every mutation is refused with [`ReviewError::RunInProgress`]
//! until the run completes, fails, or is reset.

use crate::agents::{AgentField, AgentSelection, AgentStore};
use crate::config::{RefinementConfig, ReviewConfig};
use crate::document::{self, RenderOptions, SourceDocument};
use crate::endpoint::gemini::GeminiEndpoint;
use crate::endpoint::provider::ProviderEndpoint;
use crate::endpoint::ModelEndpoint;
use crate::error::ReviewError;
use crate::export;
use crate::metrics::{self, RunMetrics};
use crate::ocr;
use crate::pages::{default_range, parse_page_range};
use crate::pipeline::{ExecutionLog, PipelineEngine, PipelineRunState, StepOutcome};
use crate::progress::{self, ProgressCallback};
use crate::prompts::{NotePreset, DEFAULT_NOTES, MARKDOWN_TRANSFORM_PROMPT};
use crate::refine;
use crate::store::SettingsStore;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{info, warn};

/// Build the endpoint `config` asks for: an edgequake-llm provider when
/// `provider_name` is set, otherwise the direct Gemini API.
pub fn endpoint_for(config: &ReviewConfig) -> Result<Arc<dyn ModelEndpoint>, ReviewError> {
    match &config.provider_name {
        Some(name) => Ok(Arc::new(ProviderEndpoint::new(name.clone()))),
        None => {
            let gemini = GeminiEndpoint::new(&config.api_base_url, config.api_timeout_secs)
                .map_err(|e| ReviewError::InvalidConfig(format!("HTTP client: {e}")))?;
            Ok(Arc::new(gemini))
        }
    }
}

/// Result of [`ReviewSession::extract_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrOutcome {
    /// Text was extracted and is now the session's source text.
    Extracted { pages: usize, chars: usize },
    /// The page count needed confirmation and the caller declined.
    Declined { pages: usize },
}

#[derive(Debug, Clone)]
struct LoadedDocument {
    source: SourceDocument,
    page_count: usize,
}

pub struct ReviewSession {
    config: ReviewConfig,
    endpoint: Arc<dyn ModelEndpoint>,
    observer: ProgressCallback,
    settings: Option<SettingsStore>,
    credential: String,
    agents: AgentStore,
    selection: AgentSelection,
    document: Option<LoadedDocument>,
    page_range: String,
    ocr_model: String,
    source_text: String,
    engine: PipelineEngine,
    notes: String,
    refinement: RefinementConfig,
}

impl ReviewSession {
    /// A fresh session with the default agents, all selected.
    pub fn new(config: ReviewConfig, endpoint: Arc<dyn ModelEndpoint>) -> Self {
        let agents = AgentStore::default();
        let selection = AgentSelection::all(&agents);
        Self {
            ocr_model: config.ocr_model.clone(),
            engine: PipelineEngine::new(Arc::clone(&endpoint)),
            config,
            endpoint,
            observer: progress::noop(),
            settings: None,
            credential: String::new(),
            agents,
            selection,
            document: None,
            page_range: String::new(),
            source_text: String::new(),
            notes: DEFAULT_NOTES.to_string(),
            refinement: RefinementConfig::default(),
        }
    }

    pub fn with_observer(mut self, observer: ProgressCallback) -> Self {
        self.engine.set_observer(Arc::clone(&observer));
        self.observer = observer;
        self
    }

    /// Attach a settings store and apply whatever it holds.
    pub fn with_settings_store(mut self, store: SettingsStore) -> Result<Self, ReviewError> {
        let settings = store.load()?;
        if let Some(key) = settings.gemini_api_key {
            self.credential = key;
        }
        if let Some(cfg) = settings.note_ai_config {
            self.refinement = cfg;
        }
        info!("Loaded settings from {}", store.path().display());
        self.settings = Some(store);
        Ok(self)
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    // ── Credential ───────────────────────────────────────────────────────

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn has_credential(&self) -> bool {
        !self.credential.trim().is_empty()
    }

    /// Replace the credential and persist it when a store is attached.
    pub fn set_credential(&mut self, credential: impl Into<String>) -> Result<(), ReviewError> {
        self.credential = credential.into();
        if let Some(store) = &self.settings {
            store.save_credential(&self.credential)?;
        }
        Ok(())
    }

    /// Use `credential` for this session only.
    pub fn use_credential(&mut self, credential: impl Into<String>) {
        self.credential = credential.into();
    }

    // ── Agents ───────────────────────────────────────────────────────────

    pub fn agents(&self) -> &AgentStore {
        &self.agents
    }

    pub fn selection(&self) -> &AgentSelection {
        &self.selection
    }

    pub fn update_agent(&mut self, id: &str, field: AgentField) -> Result<(), ReviewError> {
        self.ensure_idle()?;
        self.agents.update(id, field)
    }

    pub fn update_agent_at(&mut self, index: usize, field: AgentField) -> Result<(), ReviewError> {
        self.ensure_idle()?;
        self.agents.update_at(index, field)
    }

    pub fn reset_agents(&mut self) -> Result<(), ReviewError> {
        self.ensure_idle()?;
        self.agents.reset_to_defaults();
        self.selection.retain_existing(&self.agents);
        Ok(())
    }

    /// Swap in a whole new set of definitions; every one is selected.
    pub fn replace_agents(&mut self, agents: AgentStore) -> Result<(), ReviewError> {
        self.ensure_idle()?;
        self.selection = AgentSelection::all(&agents);
        self.agents = agents;
        Ok(())
    }

    pub fn toggle_agent(&mut self, id: &str) -> Result<bool, ReviewError> {
        self.ensure_idle()?;
        self.selection.toggle(&self.agents, id)
    }

    pub fn toggle_all_agents(&mut self) -> Result<(), ReviewError> {
        self.ensure_idle()?;
        self.selection.toggle_all(&self.agents);
        Ok(())
    }

    /// Select exactly `ids`.
    pub fn select_only<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> Result<(), ReviewError> {
        self.ensure_idle()?;
        let mut selection = AgentSelection::none();
        for id in ids {
            if !selection.contains(id) {
                selection.toggle(&self.agents, id)?;
            }
        }
        self.selection = selection;
        Ok(())
    }

    // ── Document & OCR ───────────────────────────────────────────────────

    /// Make `doc` the current document.
    ///
    /// Clears the source text and proposes a default page range. On failure
    /// the previous document stays loaded.
    pub async fn load_document(&mut self, doc: SourceDocument) -> Result<usize, ReviewError> {
        let page_count = document::page_count(&doc).await?;
        self.page_range = if doc.is_pdf() {
            default_range(page_count, self.config.default_page_window)
        } else {
            "1".to_string()
        };
        info!(
            "Loaded '{}' ({} pages), page range {}",
            doc.name(),
            page_count,
            self.page_range
        );
        self.document = Some(LoadedDocument {
            source: doc,
            page_count,
        });
        self.source_text.clear();
        Ok(page_count)
    }

    pub async fn open_document(&mut self, path: impl AsRef<Path>) -> Result<usize, ReviewError> {
        let doc = SourceDocument::open(path).await?;
        self.load_document(doc).await
    }

    pub fn document(&self) -> Option<&SourceDocument> {
        self.document.as_ref().map(|d| &d.source)
    }

    pub fn page_count(&self) -> Option<usize> {
        self.document.as_ref().map(|d| d.page_count)
    }

    pub fn page_range(&self) -> &str {
        &self.page_range
    }

    pub fn set_page_range(&mut self, range: impl Into<String>) {
        self.page_range = range.into();
    }

    /// Pages the current range selects; always `[1]` for an image.
    pub fn selected_pages(&self) -> Vec<usize> {
        match &self.document {
            Some(d) if d.source.is_pdf() => parse_page_range(&self.page_range, d.page_count),
            Some(_) => vec![1],
            None => Vec::new(),
        }
    }

    pub fn ocr_model(&self) -> &str {
        &self.ocr_model
    }

    pub fn set_ocr_model(&mut self, model: impl Into<String>) {
        self.ocr_model = model.into();
    }

    /// Rasterise the selected pages and transcribe them.
    ///
    /// When more pages are selected than the confirmation threshold,
    /// `confirm(pages)` decides whether to go ahead. On any failure the
    /// source text is left as it was.
    pub async fn extract_text<F>(&mut self, confirm: F) -> Result<OcrOutcome, ReviewError>
    where
        F: FnOnce(usize) -> bool,
    {
        if !self.has_credential() {
            return Err(ReviewError::MissingCredential);
        }
        let Some(doc) = &self.document else {
            return Err(ReviewError::NoDocument);
        };
        let pages = self.selected_pages();
        if pages.is_empty() {
            return Err(ReviewError::NoPagesSelected {
                range: self.page_range.clone(),
                total: doc.page_count,
            });
        }
        if pages.len() > self.config.page_confirm_threshold && !confirm(pages.len()) {
            info!("OCR of {} pages declined", pages.len());
            return Ok(OcrOutcome::Declined { pages: pages.len() });
        }

        let options = RenderOptions {
            scale: self.config.render_scale,
            max_pixels: self.config.max_rendered_pixels,
        };
        let images = document::rasterize(&doc.source, &pages, options, Arc::clone(&self.observer)).await?;
        let text = ocr::run_ocr(
            self.endpoint.as_ref(),
            &self.credential,
            &self.ocr_model,
            images,
            &self.observer,
        )
        .await?;

        let chars = text.chars().count();
        self.source_text = text;
        Ok(OcrOutcome::Extracted {
            pages: pages.len(),
            chars,
        })
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    /// Replace the source text directly, e.g. after manual correction.
    pub fn set_source_text(&mut self, text: impl Into<String>) {
        self.source_text = text.into();
    }

    // ── Pipeline ─────────────────────────────────────────────────────────

    /// Enter `Running` with the selected agents, in store order.
    pub fn start_pipeline(&mut self) -> Result<(), ReviewError> {
        let stages = self.selection.resolve(&self.agents);
        self.engine.start(stages, &self.source_text, &self.credential)
    }

    /// Run one stage of the active run.
    pub async fn advance_pipeline(&mut self) -> Result<StepOutcome, ReviewError> {
        self.engine.advance().await
    }

    /// Start a run and drive it to the end.
    pub async fn run_pipeline(&mut self) -> Result<(), ReviewError> {
        self.start_pipeline()?;
        self.engine.run_to_completion().await
    }

    /// Discard the log and return the engine to idle.
    pub fn clear_log(&mut self) -> Result<(), ReviewError> {
        self.engine.reset()
    }

    pub fn log(&self) -> &ExecutionLog {
        self.engine.log()
    }

    pub fn run_state(&self) -> PipelineRunState {
        self.engine.state()
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineRunState> {
        self.engine.subscribe()
    }

    pub fn progress_stream(&self) -> WatchStream<PipelineRunState> {
        self.engine.progress_stream()
    }

    pub fn metrics(&self) -> RunMetrics {
        metrics::summarize(self.engine.log())
    }

    // ── Notes ────────────────────────────────────────────────────────────

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    pub fn refinement_config(&self) -> &RefinementConfig {
        &self.refinement
    }

    /// Change the refinement settings in memory; see
    /// [`Self::save_refinement_config`] to persist them.
    pub fn set_refinement_config(&mut self, config: RefinementConfig) {
        self.refinement = config;
    }

    pub fn save_refinement_config(&self) -> Result<(), ReviewError> {
        match &self.settings {
            Some(store) => store.save_refinement(&self.refinement),
            None => {
                warn!("No settings store attached; refinement settings not saved");
                Ok(())
            }
        }
    }

    /// Rewrite the notes with the configured refinement prompt.
    pub async fn refine_notes(&mut self) -> Result<(), ReviewError> {
        let prompt = self.refinement.prompt.clone();
        self.refine_notes_with(&prompt).await
    }

    /// Make `preset` the refinement prompt. No call is made; the next
    /// [`Self::refine_notes`] uses it and [`Self::save_refinement_config`]
    /// persists it.
    pub fn apply_note_preset(&mut self, preset: NotePreset) {
        self.refinement.prompt = preset.prompt().to_string();
    }

    pub async fn transform_notes_to_markdown(&mut self) -> Result<(), ReviewError> {
        self.refine_notes_with(MARKDOWN_TRANSFORM_PROMPT).await
    }

    /// Notes are replaced only when the call succeeds.
    pub async fn refine_notes_with(&mut self, prompt: &str) -> Result<(), ReviewError> {
        let refined = refine::refine_text(
            self.endpoint.as_ref(),
            &self.credential,
            &self.notes,
            prompt,
            &self.refinement,
        )
        .await?;
        self.notes = refined;
        Ok(())
    }

    pub fn export_notes_html(&self) -> String {
        export::notes_to_html(&self.notes)
    }

    fn ensure_idle(&self) -> Result<(), ReviewError> {
        if self.engine.is_running() {
            Err(ReviewError::RunInProgress)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::mock::{MockEndpoint, MockReply};
    use crate::endpoint::Part;
    use crate::error::EndpointError;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn session(mock: MockEndpoint) -> (ReviewSession, Arc<MockEndpoint>) {
        let mock = Arc::new(mock);
        (ReviewSession::new(ReviewConfig::default(), mock.clone()), mock)
    }

    fn png_document() -> SourceDocument {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        SourceDocument::from_bytes("label.png", buf).unwrap()
    }

    #[test]
    fn starts_with_defaults() {
        let (s, _) = session(MockEndpoint::echo());
        assert_eq!(s.agents().len(), 5);
        assert_eq!(s.selection().len(), 5);
        assert_eq!(s.notes(), DEFAULT_NOTES);
        assert_eq!(s.ocr_model(), "gemini-2.5-flash");
        assert!(!s.has_credential());
    }

    #[tokio::test]
    async fn image_upload_is_one_page() {
        let (mut s, _) = session(MockEndpoint::echo());
        s.set_source_text("stale");
        let pages = s.load_document(png_document()).await.unwrap();
        assert_eq!(pages, 1);
        assert_eq!(s.page_range(), "1");
        assert_eq!(s.selected_pages(), vec![1]);
        assert_eq!(s.source_text(), "");
    }

    #[tokio::test]
    async fn ocr_of_image_sets_source_text() {
        let (mut s, mock) = session(MockEndpoint::scripted([MockReply::Text("LABEL TEXT".into())]));
        s.use_credential("key");
        s.load_document(png_document()).await.unwrap();
        let outcome = s.extract_text(|_| true).await.unwrap();
        assert_eq!(outcome, OcrOutcome::Extracted { pages: 1, chars: 10 });
        assert_eq!(s.source_text(), "LABEL TEXT");
        assert_eq!(mock.calls()[0].image_count(), 1);
        let expected = crate::document::encode::encode_bytes(s.document().unwrap().bytes(), "image/png");
        assert_eq!(mock.calls()[0].instruction_parts[1], Part::Image(expected));
    }

    #[tokio::test]
    async fn ocr_requires_credential_then_document() {
        let (mut s, _) = session(MockEndpoint::echo());
        assert!(matches!(s.extract_text(|_| true).await, Err(ReviewError::MissingCredential)));
        s.use_credential("key");
        assert!(matches!(s.extract_text(|_| true).await, Err(ReviewError::NoDocument)));
    }

    #[tokio::test]
    async fn ocr_failure_keeps_previous_text() {
        let (mut s, _) = session(MockEndpoint::scripted([MockReply::Fail(EndpointError::Transport(
            "timeout".into(),
        ))]));
        s.use_credential("key");
        s.load_document(png_document()).await.unwrap();
        s.set_source_text("manual");
        let err = s.extract_text(|_| true).await.unwrap_err();
        assert!(matches!(err, ReviewError::OcrFailure(_)));
        assert_eq!(s.source_text(), "manual");
    }

    #[tokio::test]
    async fn refine_replaces_notes_only_on_success() {
        let (mut s, _) = session(MockEndpoint::scripted([
            MockReply::Text("- [ ] one".into()),
            MockReply::Fail(EndpointError::Api {
                status: 500,
                message: "x".into(),
            }),
        ]));
        s.use_credential("key");
        s.refine_notes().await.unwrap();
        assert_eq!(s.notes(), "- [ ] one");
        assert!(s.transform_notes_to_markdown().await.is_err());
        assert_eq!(s.notes(), "- [ ] one");
    }

    #[tokio::test]
    async fn preset_sets_the_prompt_without_a_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let (s, mock) = session(MockEndpoint::scripted([MockReply::Text("- [ ] dosage".into())]));
        let mut s = s.with_settings_store(SettingsStore::open(&path)).unwrap();
        s.use_credential("key");

        s.apply_note_preset(NotePreset::Checklist);
        assert_eq!(mock.call_count(), 0);
        assert_eq!(s.notes(), DEFAULT_NOTES);
        assert_eq!(s.refinement_config().prompt, NotePreset::Checklist.prompt());

        s.save_refinement_config().unwrap();
        let saved = SettingsStore::open(&path).load().unwrap().note_ai_config.unwrap();
        assert_eq!(saved.prompt, NotePreset::Checklist.prompt());

        s.refine_notes().await.unwrap();
        assert_eq!(mock.call_count(), 1);
        match &mock.calls()[0].content_parts[0] {
            Part::Text(text) => assert!(text.starts_with(NotePreset::Checklist.prompt())),
            other => panic!("unexpected part: {other:?}"),
        }
        assert_eq!(s.notes(), "- [ ] dosage");
    }

    #[tokio::test]
    async fn large_selection_waits_for_confirmation() {
        let config = ReviewConfig::builder().page_confirm_threshold(0).build().unwrap();
        let mock = Arc::new(MockEndpoint::scripted([MockReply::Text("LABEL".into())]));
        let mut s = ReviewSession::new(config, mock.clone());
        s.use_credential("key");
        s.load_document(png_document()).await.unwrap();
        s.set_source_text("previous");

        let mut asked = None;
        let outcome = s
            .extract_text(|pages| {
                asked = Some(pages);
                false
            })
            .await
            .unwrap();
        assert_eq!(outcome, OcrOutcome::Declined { pages: 1 });
        assert_eq!(asked, Some(1));
        assert_eq!(mock.call_count(), 0);
        assert_eq!(s.source_text(), "previous");

        let outcome = s.extract_text(|_| true).await.unwrap();
        assert_eq!(outcome, OcrOutcome::Extracted { pages: 1, chars: 5 });
        assert_eq!(mock.call_count(), 1);
        assert_eq!(s.source_text(), "LABEL");
    }

    #[tokio::test]
    async fn whitespace_ocr_text_can_feed_the_pipeline() {
        let (mut s, _) = session(MockEndpoint::scripted([
            MockReply::Text(" \n".into()),
            MockReply::Text("reviewed".into()),
        ]));
        s.use_credential("key");
        s.load_document(png_document()).await.unwrap();
        s.select_only(["agent-1"]).unwrap();

        let outcome = s.extract_text(|_| true).await.unwrap();
        assert_eq!(outcome, OcrOutcome::Extracted { pages: 1, chars: 2 });
        s.run_pipeline().await.unwrap();
        assert_eq!(s.log().entries()[0].input, " \n");
    }

    #[test]
    fn select_only_keeps_store_order_on_resolve() {
        let (mut s, _) = session(MockEndpoint::echo());
        s.select_only(["agent-5", "agent-1", "agent-5"]).unwrap();
        let ids: Vec<_> = s.selection().resolve(s.agents()).into_iter().map(|a| a.id).collect();
        assert_eq!(ids, ["agent-1", "agent-5"]);
        assert!(s.select_only(["nope"]).is_err());
    }

    #[test]
    fn settings_are_applied_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::open(&path);
        store.save_credential("from-disk").unwrap();

        let (s, _) = session(MockEndpoint::echo());
        let mut s = s.with_settings_store(SettingsStore::open(&path)).unwrap();
        assert_eq!(s.credential(), "from-disk");

        s.set_credential("changed").unwrap();
        s.set_refinement_config(RefinementConfig {
            max_tokens: 900,
            ..RefinementConfig::default()
        });
        s.save_refinement_config().unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.gemini_api_key.as_deref(), Some("changed"));
        assert_eq!(reloaded.note_ai_config.map(|c| c.max_tokens), Some(900));
    }

    #[test]
    fn export_uses_current_notes() {
        let (mut s, _) = session(MockEndpoint::echo());
        s.set_notes("## Findings\n- **dose** too high");
        let html = s.export_notes_html();
        assert!(html.contains("<h2>Findings</h2>"));
        assert!(html.contains("<li><b>dose</b> too high</li>"));
    }
}
