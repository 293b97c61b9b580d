//! CLI binary for tfda-review.
//!
//! A thin shim over the library crate: flags map to `ReviewConfig` and
//! session calls, results go to stdout, progress and logs to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tfda_review::config::{is_known_model, KNOWN_MODELS};
use tfda_review::endpoint::mock::MockEndpoint;
use tfda_review::{
    endpoint_for, AgentDefinition, AgentField, AgentStore, ExecutionLogEntry, ModelEndpoint,
    NotePreset, OcrOutcome, ProgressCallback, ProgressObserver, ReviewConfig, ReviewSession,
    SettingsStore,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal observer: one bar for the OCR phase (rendering fills the first
/// half, the OCR call the second) and one for the agent run.
struct CliObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn start_bar(&self, len: u64, prefix: &'static str, unit: &str) -> Option<ProgressBar> {
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  \
             ⏱ {{elapsed_precise}}  {{msg}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(len);
        bar.set_style(style);
        bar.set_prefix(prefix);
        bar.enable_steady_tick(Duration::from_millis(80));

        let mut slot = self.bar.lock().ok()?;
        if let Some(old) = slot.replace(bar.clone()) {
            old.finish_and_clear();
        }
        Some(bar)
    }

    fn current(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|b| b.clone())
    }

    fn finish(&self) {
        if let Some(bar) = self.bar.lock().ok().and_then(|mut b| b.take()) {
            bar.finish_and_clear();
        }
    }
}

impl ProgressObserver for CliObserver {
    fn on_render_page(&self, page_num: usize, index: usize, total: usize) {
        let bar = if index == 1 {
            self.start_bar(100, "OCR", "%")
        } else {
            self.current()
        };
        if let Some(bar) = bar {
            bar.set_position((index as u64 * 50) / total.max(1) as u64);
            bar.set_message(format!("Rendering page {page_num}..."));
        }
    }

    fn on_ocr_start(&self, image_count: usize, model: &str) {
        let bar = self.current().or_else(|| self.start_bar(100, "OCR", "%"));
        if let Some(bar) = bar {
            bar.set_position(50);
            bar.set_message(format!("Sending {image_count} images to {model}..."));
        }
    }

    fn on_ocr_complete(&self, text_len: usize) {
        self.finish();
        eprintln!("{} OCR complete: {} chars", green("✔"), bold(&text_len.to_string()));
    }

    fn on_run_start(&self, total_stages: usize) {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Running {total_stages} agents…"))
        );
        self.start_bar(total_stages as u64, "Agents", "agents");
    }

    fn on_stage_start(&self, _index: usize, _total: usize, agent_name: &str) {
        if let Some(bar) = self.current() {
            bar.set_message(format!("Running Agent: {agent_name}..."));
        }
    }

    fn on_stage_complete(&self, index: usize, total: usize, entry: &ExecutionLogEntry) {
        let Some(bar) = self.current() else { return };
        let failed = entry.output.starts_with("Error executing agent");
        bar.println(format!(
            "  {} {:>2}/{:<2} {:<36} {}  {}",
            if failed { red("✗") } else { green("✓") },
            index,
            total,
            entry.agent_name,
            dim(&format!("{:>6} tok", entry.tokens)),
            dim(&format!("{:.2}s", entry.latency_seconds)),
        ));
        bar.inc(1);
    }

    fn on_run_complete(&self, total_stages: usize) {
        self.finish();
        eprintln!("{} {} agents completed", green("✔"), bold(&total_stages.to_string()));
    }

    fn on_run_failed(&self, message: &str) {
        self.finish();
        eprintln!("{} {}", red("✘"), red(message));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # List the configured agents
  tfda-review agents

  # OCR the first three pages of a submission
  tfda-review ocr --pages 1-3 submission.pdf -o submission.md

  # OCR then run every agent, Markdown report on stdout
  tfda-review run submission.pdf

  # Run two agents over an existing transcription, JSON output
  tfda-review run --text submission.md --select agent-2,agent-5 --json

  # Tweak an agent for one run
  tfda-review run --set agent-2.temperature=0.4 --set agent-5.max_tokens=8000 label.png

  # Turn notes into a checklist and save them back
  tfda-review refine --preset checklist --in-place notes.md

  # Printable HTML of the notes
  tfda-review export-notes notes.md -o notes.html

  # Offline wiring check (echo endpoint, no API calls)
  tfda-review --dry-run run --text sample.txt

AGENT FIELDS (for --set ID.FIELD=VALUE):
  name, description, system_prompt, user_prompt, model,
  temperature, top_p, max_tokens

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  TFDA_PROVIDER           Route calls through an edgequake-llm provider
  TFDA_SETTINGS           Settings file (default: <config dir>/tfda-review/settings.json)
  PDFIUM_LIB_PATH         Path to libpdfium
"#;

/// Multi-agent regulatory document review.
#[derive(Parser, Debug)]
#[command(
    name = "tfda-review",
    version,
    about = "OCR regulatory submissions and review them with a chain of LLM agents",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Gemini API key (used for this invocation only unless --save-key).
    #[arg(long, env = "GEMINI_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Persist --api-key to the settings file.
    #[arg(long, global = true)]
    save_key: bool,

    /// edgequake-llm provider (openai, anthropic, ollama, …) instead of direct Gemini.
    #[arg(long, env = "TFDA_PROVIDER", global = true)]
    provider: Option<String>,

    /// Settings file holding the API key and notes refinement settings.
    #[arg(long, env = "TFDA_SETTINGS", global = true)]
    settings: Option<PathBuf>,

    /// Base URL of the Gemini API.
    #[arg(long, env = "TFDA_API_BASE_URL", global = true)]
    api_base_url: Option<String>,

    /// Per-call timeout in seconds.
    #[arg(long, env = "TFDA_API_TIMEOUT", default_value_t = 120, global = true)]
    api_timeout: u64,

    /// Use an in-process echo endpoint; no network calls are made.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Disable progress bars.
    #[arg(long, env = "TFDA_NO_PROGRESS", global = true)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TFDA_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TFDA_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List agent definitions.
    Agents {
        #[command(flatten)]
        agents: AgentArgs,

        /// Print definitions as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract text from a PDF or image.
    Ocr {
        #[command(flatten)]
        doc: DocumentArgs,

        /// Write the transcription to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract text (or read it) and run the agent pipeline over it.
    Run {
        #[command(flatten)]
        doc: DocumentArgs,

        #[command(flatten)]
        agents: AgentArgs,

        /// Treat INPUT as an already-extracted UTF-8 text file.
        #[arg(long)]
        text: bool,

        /// Output the execution log and metrics as JSON.
        #[arg(long)]
        json: bool,

        /// Write the report to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Refine a notes file with the model.
    Refine {
        /// Notes file (Markdown or plain text).
        notes: PathBuf,

        /// Use a one-click preset prompt.
        #[arg(long, value_enum, conflicts_with_all = ["markdown", "prompt"])]
        preset: Option<PresetArg>,

        /// Convert the notes to well-structured Markdown.
        #[arg(long, conflicts_with = "prompt")]
        markdown: bool,

        /// Refinement prompt (overrides the saved one).
        #[arg(long)]
        prompt: Option<String>,

        /// Refinement model (overrides the saved one).
        #[arg(long)]
        model: Option<String>,

        /// Max output tokens (overrides the saved value).
        #[arg(long, value_parser = clap::value_parser!(u32).range(100..=8192))]
        max_tokens: Option<u32>,

        /// Persist prompt/model/max-tokens as the new refinement settings.
        #[arg(long)]
        save_config: bool,

        /// Overwrite the notes file with the result.
        #[arg(long, conflicts_with = "output")]
        in_place: bool,

        /// Write the result to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert a notes file to printable HTML.
    ExportNotes {
        /// Notes file; omitted means the default notes template.
        notes: Option<PathBuf>,

        /// Write HTML to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct DocumentArgs {
    /// PDF, PNG or JPEG file.
    input: PathBuf,

    /// Page selection such as 1-5 or 1,3,7-9 (default: first five pages).
    #[arg(long, env = "TFDA_PAGES")]
    pages: Option<String>,

    /// Vision model used for OCR.
    #[arg(long, env = "TFDA_OCR_MODEL")]
    model: Option<String>,

    /// Render scale (1.0 = 72 DPI).
    #[arg(long, env = "TFDA_RENDER_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Skip the confirmation for large page selections.
    #[arg(short = 'y', long)]
    yes: bool,
}

#[derive(Args, Debug)]
struct AgentArgs {
    /// JSON file with an array of agent definitions replacing the defaults.
    #[arg(long, env = "TFDA_AGENTS_FILE")]
    agents_file: Option<PathBuf>,

    /// Field override ID.FIELD=VALUE, repeatable.
    #[arg(long = "set", value_name = "ID.FIELD=VALUE")]
    overrides: Vec<String>,

    /// Comma-separated agent ids to run (default: all).
    #[arg(long, value_delimiter = ',')]
    select: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PresetArg {
    FixGrammar,
    Checklist,
}

impl From<PresetArg> for NotePreset {
    fn from(v: PresetArg) -> Self {
        match v {
            PresetArg::FixGrammar => NotePreset::FixGrammar,
            PresetArg::Checklist => NotePreset::Checklist,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are suppressed while a progress bar is shown.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::ExportNotes { notes, output } => {
            let text = match notes {
                Some(path) => read_text(path).await?,
                None => tfda_review::prompts::DEFAULT_NOTES.to_string(),
            };
            let html = tfda_review::notes_to_html(&text);
            write_output(output.as_deref(), &html).await?;
            return Ok(());
        }
        Command::Agents { agents, json } => {
            let mut session = build_session(&cli, 2.0, None)?;
            apply_agent_args(&mut session, agents).await?;
            print_agents(&session, *json)?;
            return Ok(());
        }
        _ => {}
    }

    let observer: Option<ProgressCallback> = if show_progress {
        Some(CliObserver::new() as Arc<dyn ProgressObserver>)
    } else {
        None
    };

    match &cli.command {
        Command::Ocr { doc, output } => {
            let mut session = build_session(&cli, doc.scale, observer)?;
            if !extract(&mut session, doc, cli.quiet).await? {
                return Ok(());
            }
            write_output(output.as_deref(), session.source_text()).await?;
        }

        Command::Run {
            doc,
            agents,
            text,
            json,
            output,
        } => {
            let mut session = build_session(&cli, doc.scale, observer)?;
            apply_agent_args(&mut session, agents).await?;

            if *text {
                let source = read_text(&doc.input).await?;
                session.set_source_text(source);
            } else if !extract(&mut session, doc, cli.quiet).await? {
                return Ok(());
            }

            session.run_pipeline().await.context("Pipeline failed")?;

            let rendered = if *json {
                let report = serde_json::json!({
                    "log": session.log().entries(),
                    "metrics": session.metrics(),
                });
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            } else {
                markdown_report(&session)
            };
            write_output(output.as_deref(), &rendered).await?;

            if !cli.quiet && !*json {
                let m = session.metrics();
                eprintln!(
                    "   {} agents  /  ~{} tokens  /  avg {}s",
                    dim(&m.total_executions.to_string()),
                    dim(&m.total_tokens.to_string()),
                    dim(&format!("{:.2}", m.average_latency_seconds.unwrap_or(0.0))),
                );
            }
        }

        Command::Refine {
            notes,
            preset,
            markdown,
            prompt,
            model,
            max_tokens,
            save_config,
            in_place,
            output,
        } => {
            let mut session = build_session(&cli, 2.0, observer)?;
            session.set_notes(read_text(notes).await?);

            let mut config = session.refinement_config().clone();
            if let Some(p) = prompt {
                config.prompt = p.clone();
            }
            if let Some(m) = model {
                warn_if_unknown_model(&session, m);
                config.model = m.clone();
            }
            if let Some(t) = max_tokens {
                config.max_tokens = *t;
            }
            session.set_refinement_config(config);
            if let Some(p) = preset {
                session.apply_note_preset((*p).into());
            }
            if *save_config {
                session
                    .save_refinement_config()
                    .context("Failed to save refinement settings")?;
            }

            let busy = (!cli.quiet).then(|| spinner("Refining notes…"));
            let result = if *markdown {
                session.transform_notes_to_markdown().await
            } else {
                session.refine_notes().await
            };
            if let Some(s) = busy {
                s.finish_and_clear();
            }
            result.context("Failed to refine notes")?;

            let target = if *in_place { Some(notes.as_path()) } else { output.as_deref() };
            write_output(target, session.notes()).await?;
        }

        Command::Agents { .. } | Command::ExportNotes { .. } => {}
    }

    Ok(())
}

/// Map global flags to a session.
fn build_session(
    cli: &Cli,
    render_scale: f32,
    observer: Option<ProgressCallback>,
) -> Result<ReviewSession> {
    let mut builder = ReviewConfig::builder()
        .render_scale(render_scale)
        .api_timeout_secs(cli.api_timeout);
    if let Some(url) = &cli.api_base_url {
        builder = builder.api_base_url(url.clone());
    }
    if let Some(p) = &cli.provider {
        builder = builder.provider_name(p.clone());
    }
    let config = builder.build().context("Invalid configuration")?;

    let endpoint: Arc<dyn ModelEndpoint> = if cli.dry_run {
        Arc::new(MockEndpoint::echo())
    } else {
        endpoint_for(&config).context("Failed to create model endpoint")?
    };

    let mut session = ReviewSession::new(config, endpoint);
    if let Some(obs) = observer {
        session = session.with_observer(obs);
    }
    if let Some(path) = cli.settings.clone().or_else(SettingsStore::default_path) {
        session = session
            .with_settings_store(SettingsStore::open(path))
            .context("Failed to load settings")?;
    }

    if let Some(key) = &cli.api_key {
        if cli.save_key {
            session.set_credential(key.clone()).context("Failed to save API key")?;
        } else {
            session.use_credential(key.clone());
        }
    }
    if cli.dry_run && !session.has_credential() {
        session.use_credential("dry-run");
    }
    Ok(session)
}

/// Apply `--agents-file`, `--set` and `--select`, in that order.
async fn apply_agent_args(session: &mut ReviewSession, args: &AgentArgs) -> Result<()> {
    if let Some(path) = &args.agents_file {
        let raw = read_text(path).await?;
        let defs: Vec<AgentDefinition> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid agent definitions in {}", path.display()))?;
        session.replace_agents(AgentStore::from_definitions(defs)?)?;
    }

    for assignment in &args.overrides {
        let (target, value) = assignment
            .split_once('=')
            .with_context(|| format!("Expected ID.FIELD=VALUE, got '{assignment}'"))?;
        let (id, field) = target
            .rsplit_once('.')
            .with_context(|| format!("Expected ID.FIELD=VALUE, got '{assignment}'"))?;
        session
            .update_agent(id, AgentField::parse(field, value)?)
            .with_context(|| format!("Cannot apply '{assignment}'"))?;
    }

    if !args.select.is_empty() {
        session.select_only(args.select.iter().map(String::as_str))?;
    }

    for agent in session.agents().list() {
        warn_if_unknown_model(session, &agent.model_id);
        if !agent.has_valid_bounds() {
            tracing::warn!(
                "Agent {} has out-of-range parameters (temperature {}, top_p {}, max_tokens {})",
                agent.id,
                agent.temperature,
                agent.top_p,
                agent.max_output_tokens
            );
        }
    }
    Ok(())
}

/// Gemini rejects model ids it does not serve; provider routing accepts any.
fn warn_if_unknown_model(session: &ReviewSession, model: &str) {
    if session.config().provider_name.is_none() && !is_known_model(model) {
        tracing::warn!("Model '{}' is not one of {}", model, KNOWN_MODELS.join(", "));
    }
}

/// Load the document and run OCR. Returns `false` when the user declined.
async fn extract(session: &mut ReviewSession, doc: &DocumentArgs, quiet: bool) -> Result<bool> {
    let pages = session
        .open_document(&doc.input)
        .await
        .with_context(|| format!("Failed to load {}", doc.input.display()))?;
    if let Some(range) = &doc.pages {
        session.set_page_range(range.clone());
    }
    if let Some(model) = &doc.model {
        warn_if_unknown_model(session, model);
        session.set_ocr_model(model.clone());
    }
    if !quiet {
        eprintln!(
            "{} {}  {}",
            cyan("◆"),
            bold(&doc.input.display().to_string()),
            dim(&format!("{pages} pages, range {}", session.page_range())),
        );
    }

    let assume_yes = doc.yes;
    let outcome = session
        .extract_text(|n| assume_yes || confirm_pages(n))
        .await
        .context("OCR failed")?;

    match outcome {
        OcrOutcome::Extracted { .. } => Ok(true),
        OcrOutcome::Declined { pages } => {
            eprintln!("{} Skipped OCR of {pages} pages", cyan("⚠"));
            Ok(false)
        }
    }
}

fn confirm_pages(pages: usize) -> bool {
    eprint!("You are about to process {pages} pages. This might take a while. Continue? [y/N] ");
    let _ = io::stderr().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_agents(session: &ReviewSession, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(session.agents().list())
            .context("Failed to serialise agents")?;
        println!("{out}");
        return Ok(());
    }
    for (i, a) in session.agents().list().iter().enumerate() {
        let mark = if session.selection().contains(&a.id) {
            green("●")
        } else {
            dim("○")
        };
        println!("{mark} {} {}  {}", bold(&a.id), a.name, dim(&a.description));
        println!(
            "    {}",
            dim(&format!(
                "#{i}  {}  temperature {}  top_p {}  max_tokens {}",
                a.model_id, a.temperature, a.top_p, a.max_output_tokens
            ))
        );
    }
    Ok(())
}

fn markdown_report(session: &ReviewSession) -> String {
    let entries = session.log().entries();
    let total = entries.len();
    let mut out = String::new();
    for (i, e) in entries.iter().enumerate() {
        out.push_str(&format!(
            "## [{}/{}] {}\n\n_{:.2}s, ~{} tokens_\n\n{}\n\n",
            i + 1,
            total,
            e.agent_name,
            e.latency_seconds,
            e.tokens,
            e.output.trim_end()
        ));
    }
    out
}

fn spinner(msg: &'static str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    bar.set_message(msg);
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            tokio::fs::write(p, content)
                .await
                .with_context(|| format!("Failed to write {}", p.display()))?;
            eprintln!("{} {}", green("✔"), bold(&p.display().to_string()));
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(content.as_bytes())
                .context("Failed to write to stdout")?;
            if !content.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }
    Ok(())
}
