//! CLI binary for suprimento-client.
//!
//! A thin terminal front end over the library's [`Workflow`]: it uploads a
//! case-file PDF, prompts for the review fields, submits them and saves the
//! generated document.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use suprimento_client::config::DEFAULT_BASE_URL;
use suprimento_client::review::certidoes;
use suprimento_client::{
    ClientConfig, DownloadOutcome, FieldErrors, FollowUp, GeneratedArtifactRef, Navigator,
    Notification, NotificationLevel, NotificationSink, RawUploadFile, ReviewField, ReviewForm,
    Workflow, WorkflowContext, WorkflowError,
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

// ── Terminal notifications and spinner ───────────────────────────────────────

/// Console side of the workflow: prints notifications and owns the spinner
/// shown while a network call is in flight. Lines printed while the spinner
/// is active go through [`ProgressBar::println`] so they land above it.
struct Console {
    quiet: bool,
    show_progress: bool,
    spinner: Mutex<Option<ProgressBar>>,
}

impl Console {
    fn new(quiet: bool, show_progress: bool) -> Arc<Self> {
        Arc::new(Self {
            quiet,
            show_progress,
            spinner: Mutex::new(None),
        })
    }

    fn slot(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.spinner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spin(&self, prefix: &'static str, message: impl Into<String>) {
        if !self.show_progress {
            return;
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix(prefix);
        bar.set_message(message.into());
        bar.enable_steady_tick(Duration::from_millis(80));
        *self.slot() = Some(bar);
    }

    fn done(&self) {
        if let Some(bar) = self.slot().take() {
            bar.finish_and_clear();
        }
    }

    fn print(&self, line: String) {
        match self.slot().as_ref() {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }
}

impl NotificationSink for Console {
    fn notify(&self, notification: &Notification) {
        let mut line = match notification.level {
            NotificationLevel::Success if self.quiet => return,
            NotificationLevel::Success => format!("{} {}", green("✔"), notification.message),
            NotificationLevel::Error => format!("{} {}", red("✘"), red(&notification.message)),
        };
        match notification.follow_up {
            Some(FollowUp::Retry) => line.push_str(&dim("  (can be retried)")),
            Some(FollowUp::StartNewWorkflow) => line.push_str(&dim("  (ready for a new document)")),
            None => {}
        }
        self.print(line);
    }
}

impl Navigator for Console {
    fn reset_workflow(&self) {
        if !self.quiet {
            self.print(format!("\n{} {}", cyan("◆"), bold("New workflow")));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload, review interactively, generate and download
  suprimento processo.pdf

  # Save into a specific directory on a remote service
  suprimento --api-url https://sentencas.example.org -o sentencas/ processo.pdf

  # Non-interactive: accept the processed fields, fixing one of them
  suprimento --yes --fields '{"data": "12/03/2024"}' processo.pdf

  # Review the fields the service processed last, without uploading
  suprimento --resume

  # Machine-readable summary on stdout
  suprimento --yes --json processo.pdf > result.json

REVIEW FIELDS (names accepted by --fields):
  numero_processo  requerente  parentesco  nome_falecido  local_obito
  data (DD/MM/YYYY)  id_parecer  id_declaracao  id_certidoes (list or "a, b; c")

ENVIRONMENT VARIABLES:
  SUPRIMENTO_API_URL         Base URL of the document service
  SUPRIMENTO_OUTPUT_DIR      Directory where generated documents are saved
  SUPRIMENTO_TIMEOUT         Per-request timeout in seconds
  SUPRIMENTO_UPLOAD_TIMEOUT  Upload timeout in seconds
  RUST_LOG                   Override the log filter (e.g. suprimento_client=debug)
"#;

/// Generate court sentences from case-file PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "suprimento",
    version,
    about = "Generate court sentences from case-file PDFs",
    long_about = "Upload a case-file PDF to the document service, review and correct the \
extracted fields, generate the sentence and download the resulting ODT document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Case-file PDF to upload.
    #[arg(required_unless_present = "resume")]
    input: Option<PathBuf>,

    /// Skip the upload and review the fields the service processed last.
    #[arg(long, conflicts_with = "input")]
    resume: bool,

    /// Base URL of the document service.
    #[arg(long, env = "SUPRIMENTO_API_URL", default_value = DEFAULT_BASE_URL)]
    api_url: String,

    /// Directory where generated documents are saved.
    #[arg(short, long, env = "SUPRIMENTO_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Accept the processed fields without prompting and never ask to retry.
    #[arg(short, long, env = "SUPRIMENTO_YES")]
    yes: bool,

    /// JSON object of field overrides, e.g. '{"data": "12/03/2024"}'.
    #[arg(long, env = "SUPRIMENTO_FIELDS")]
    fields: Option<String>,

    /// Print a JSON summary on stdout.
    #[arg(long, env = "SUPRIMENTO_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SUPRIMENTO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SUPRIMENTO_QUIET")]
    quiet: bool,

    /// Per-request timeout in seconds.
    #[arg(long, env = "SUPRIMENTO_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Upload timeout in seconds.
    #[arg(long, env = "SUPRIMENTO_UPLOAD_TIMEOUT", default_value_t = 300)]
    upload_timeout: u64,
}

/// Where the review data comes from.
enum Source {
    File(PathBuf),
    LatestReview,
}

/// Result of one completed workflow.
struct Report {
    case: String,
    artifact: GeneratedArtifactRef,
    saved_to: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Spinners and notifications already report progress, so library logs
    // stay at error level unless asked for.
    let show_progress = !cli.quiet && !cli.json;
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

    // ── Build config ─────────────────────────────────────────────────────
    let overrides = cli
        .fields
        .as_deref()
        .map(parse_overrides)
        .transpose()?
        .unwrap_or_default();

    let config = ClientConfig::builder()
        .base_url(&cli.api_url)
        .request_timeout_secs(cli.timeout)
        .upload_timeout_secs(cli.upload_timeout)
        .download_dir(&cli.output_dir)
        .build()
        .context("Invalid configuration")?;

    let console = Console::new(cli.quiet, show_progress);
    let ctx = WorkflowContext::from_config(&config)
        .context("Failed to set up the document service client")?
        .with_notifier(console.clone())
        .with_navigator(console.clone());
    let mut workflow = Workflow::new(ctx);
    let interactive = !cli.yes;

    // ── Run workflows ────────────────────────────────────────────────────
    let mut source = match &cli.input {
        Some(path) => Source::File(path.clone()),
        None => Source::LatestReview,
    };
    loop {
        let report = run(&mut workflow, &console, &source, &overrides, interactive).await?;
        print_report(&cli, &report)?;

        if !interactive || !confirm("Start a new workflow with another PDF?", false)? {
            break;
        }
        workflow
            .restart()
            .context("Cannot start a new workflow")?;
        let Some(next) = read_answer("PDF to upload (empty to quit): ")? else {
            break;
        };
        if next.trim().is_empty() {
            break;
        }
        source = Source::File(PathBuf::from(next.trim()));
    }

    Ok(())
}

/// Drive one document from upload (or resume) to a saved file.
async fn run(
    workflow: &mut Workflow,
    console: &Console,
    source: &Source,
    overrides: &[(ReviewField, String)],
    interactive: bool,
) -> Result<Report> {
    // ── Upload ───────────────────────────────────────────────────────────
    match source {
        Source::File(path) => upload(workflow, console, path, interactive).await?,
        Source::LatestReview => {
            console.spin("Loading", "latest processed fields");
            let result = workflow.resume_latest_review().await.map(|_| ());
            console.done();
            result.context("Failed to load the latest review")?;
        }
    }

    // ── Review ───────────────────────────────────────────────────────────
    let form = workflow
        .review_mut()
        .context("No review data after upload")?;
    apply_overrides(form, overrides);
    if interactive {
        review_fields(form, &ReviewField::ALL)?;
    }

    // ── Submit ───────────────────────────────────────────────────────────
    let case = workflow
        .review()
        .map(|form| form.numero_processo.trim().to_string())
        .unwrap_or_default();
    let artifact = loop {
        console.spin("Generating", format!("sentence for case {case}"));
        let result = workflow.submit().await;
        console.done();
        match result {
            Ok(artifact) => break artifact,
            Err(WorkflowError::Validation(errors)) => {
                print_field_errors(console, &errors);
                if !interactive {
                    bail!(
                        "{} review field(s) are invalid; correct them with --fields",
                        errors.len()
                    );
                }
                let pending: Vec<ReviewField> = errors.fields().collect();
                let form = workflow
                    .review_mut()
                    .context("Review data was lost after a failed submission")?;
                review_fields(form, &pending)?;
            }
            Err(e) if interactive && e.is_retryable() => {
                if !confirm("Retry document generation?", true)? {
                    return Err(e).context("Document generation failed");
                }
            }
            Err(e) => return Err(e).context("Document generation failed"),
        }
    };

    // ── Download ─────────────────────────────────────────────────────────
    let saved_to = loop {
        console.spin("Downloading", artifact.filename.clone());
        let outcome = workflow.start_download().await;
        console.done();
        match outcome {
            DownloadOutcome::Saved(path) => break path,
            DownloadOutcome::Failed(e) => {
                if interactive && confirm("Retry the download?", true)? {
                    continue;
                }
                return Err(e).context("Download failed");
            }
            other => bail!("Download did not run: {other:?}"),
        }
    };

    Ok(Report {
        case,
        artifact,
        saved_to,
    })
}

async fn upload(
    workflow: &mut Workflow,
    console: &Console,
    path: &Path,
    interactive: bool,
) -> Result<()> {
    let file = RawUploadFile::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    loop {
        workflow
            .select_file(file.clone())
            .with_context(|| format!("Cannot upload {}", path.display()))?;
        console.spin("Uploading", file.name.clone());
        let result = workflow.upload().await.map(|_| ());
        console.done();
        match result {
            Ok(()) => return Ok(()),
            Err(e) if interactive && e.is_retryable() => {
                if !confirm("Retry the upload?", true)? {
                    return Err(e).with_context(|| format!("Upload of {} failed", path.display()));
                }
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Upload of {} failed", path.display()))
            }
        }
    }
}

// ── Review prompts ───────────────────────────────────────────────────────────

/// Prompt for `fields`, then keep re-prompting only the ones still invalid.
fn review_fields(form: &mut ReviewForm, fields: &[ReviewField]) -> Result<()> {
    let mut pending = fields.to_vec();
    while !pending.is_empty() {
        for &field in &pending {
            prompt_field(form, field)?;
        }
        pending.retain(|&field| match form.validate_field(field) {
            Some(msg) => {
                eprintln!("  {} {}: {}", red("✘"), bold(field.label()), msg);
                true
            }
            None => false,
        });
    }
    Ok(())
}

/// Ask for one field, showing its current value as the default.
fn prompt_field(form: &mut ReviewForm, field: ReviewField) -> Result<()> {
    let question = format!(
        "{} {}: ",
        bold(field.label()),
        dim(&format!("[{}]", form.get(field)))
    );
    let answer = prompt(&question)?;
    let answer = answer.trim();

    if !answer.is_empty() {
        match field {
            ReviewField::Data => {
                let masked = form.input_date(answer);
                if masked != answer {
                    eprintln!("  {} {}", dim("→"), masked);
                }
            }
            _ => form.set(field, answer),
        }
    }
    if field == ReviewField::IdCertidoes {
        let preview = form.certidoes_preview();
        eprintln!(
            "  {} {} certificate(s): {}",
            dim("→"),
            preview.len(),
            preview.join(" | ")
        );
    }
    Ok(())
}

fn print_field_errors(console: &Console, errors: &FieldErrors) {
    for (field, msg) in errors.iter() {
        console.print(format!("  {} {}: {}", red("✘"), bold(field.label()), msg));
    }
}

/// Parse `--fields` into overrides keyed by review field.
fn parse_overrides(raw: &str) -> Result<Vec<(ReviewField, String)>> {
    let value: Value = serde_json::from_str(raw).context("--fields is not valid JSON")?;
    let Value::Object(map) = value else {
        bail!("--fields must be a JSON object");
    };

    map.into_iter()
        .map(|(key, value)| {
            let field = ReviewField::from_name(&key)
                .with_context(|| format!("Unknown review field '{key}' in --fields"))?;
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Array(items) => {
                    let items = items
                        .iter()
                        .map(|item| {
                            item.as_str()
                                .with_context(|| format!("Items of '{key}' must be strings"))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    certidoes::join(&items)
                }
                other => bail!("Field '{key}' must be a string, got {other}"),
            };
            Ok((field, text))
        })
        .collect()
}

fn apply_overrides(form: &mut ReviewForm, overrides: &[(ReviewField, String)]) {
    for (field, value) in overrides {
        match field {
            ReviewField::Data => {
                form.input_date(value);
            }
            _ => form.set(*field, value.as_str()),
        }
    }
}

// ── Terminal input ───────────────────────────────────────────────────────────

/// Print `question` on stderr and read one line; `None` once stdin is closed.
fn read_answer(question: &str) -> Result<Option<String>> {
    let mut stderr = io::stderr();
    write!(stderr, "{question}").context("Failed to write prompt")?;
    stderr.flush().ok();

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn prompt(question: &str) -> Result<String> {
    match read_answer(question)? {
        Some(answer) => Ok(answer),
        None => bail!("stdin closed while prompting; pass --yes to run without prompts"),
    }
}

/// Yes/no question. A closed stdin counts as "no".
fn confirm(question: &str, default: bool) -> Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let Some(answer) = read_answer(&format!("{question} {} ", dim(hint)))? else {
        return Ok(false);
    };
    Ok(match answer.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" | "s" | "sim" => true,
        _ => false,
    })
}

// ── Output ───────────────────────────────────────────────────────────────────

fn print_report(cli: &Cli, report: &Report) -> Result<()> {
    if cli.json {
        let value = serde_json::json!({
            "numero_processo": report.case,
            "filename": report.artifact.filename,
            "download_url": report.artifact.download_url,
            "saved_to": report.saved_to.display().to_string(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).context("Failed to serialise summary")?
        );
        return Ok(());
    }

    println!("{}", report.saved_to.display());
    if !cli.quiet {
        eprintln!(
            "{}  case {}  →  {}",
            green("✔"),
            report.case,
            bold(&report.artifact.filename),
        );
    }
    Ok(())
}
