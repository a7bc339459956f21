//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use color_eyre::Section;
use color_eyre::eyre::{Report, Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use coursepress_core::preflight::run_preflight;
use coursepress_core::research::generate_research_brief;
use coursepress_core::resolve::lesson_plan;
use coursepress_core::services::{ResearchBriefRequest, WebResearcher};
use coursepress_core::{
    CancelToken, ProgressReporter, ProgressState, ProviderKeys, PublishOutcome, PublishSettings,
    PublishStatus, PublishStep, Services, publish,
};
use coursepress_remote::{ChatProvider, HttpRemoteStore, SearchProvider};
use coursepress_shared::{
    AppConfig, ContentGenerationMethod, Credentials, KnowledgeLibraries, Outline, PublishError,
    init_config, load_config, load_config_from, provider_keys, resolve_credentials,
    resolve_remote_credentials,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// coursepress: publish a generated ebook outline to a remote CMS.
#[derive(Parser)]
#[command(
    name = "coursepress",
    version,
    about = "Enrich an ebook outline with LLM content and publish it to a remote CMS.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.coursepress/coursepress.toml).
    #[arg(long, global = true, env = "COURSEPRESS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Generation method override.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum MethodArg {
    Primary,
    Hybrid,
}

impl From<MethodArg> for ContentGenerationMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Primary => Self::Primary,
            MethodArg::Hybrid => Self::Hybrid,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Publish an outline: preflight, then create and link every node.
    Publish {
        /// Outline JSON produced by the outline stage.
        #[arg(long)]
        outline: PathBuf,

        /// Knowledge-library assignments (`{"chapter-0": "vs_..."}`).
        #[arg(long)]
        libraries: Option<PathBuf>,

        /// Write the published structure as JSON to this path.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Override the generation method from config and outline.
        #[arg(long)]
        method: Option<MethodArg>,

        /// Attach a web reference block to every topic.
        #[arg(long)]
        web_references: bool,
    },

    /// Run the remote-store preflight checks only.
    Check,

    /// Summarize an outline and the library each lesson will use.
    Outline {
        /// Outline JSON file.
        #[arg(long)]
        outline: PathBuf,

        /// Knowledge-library assignments.
        #[arg(long)]
        libraries: Option<PathBuf>,
    },

    /// Generate a research brief for a book topic.
    Research {
        /// What the book is about.
        #[arg(long)]
        topic: String,

        /// Points the brief must cover.
        #[arg(long, default_value = "")]
        must_haves: String,

        /// Anything else to take into account.
        #[arg(long, default_value = "")]
        other: String,

        /// Write the brief to this path instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "coursepress=info",
        1 => "coursepress=debug",
        _ => "coursepress=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Publish {
            outline,
            libraries,
            out,
            method,
            web_references,
        } => {
            let args = PublishArgs {
                outline,
                libraries,
                out,
                method,
                web_references,
            };
            cmd_publish(config_path, args).await
        }
        Command::Check => cmd_check(config_path).await,
        Command::Outline { outline, libraries } => {
            cmd_outline(config_path, &outline, libraries.as_deref())
        }
        Command::Research {
            topic,
            must_haves,
            other,
            out,
        } => cmd_research(config_path, topic, must_haves, other, out.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn read_outline(path: &Path) -> Result<Outline> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| PublishError::io(path, e))
        .wrap_err("could not read the outline")?;
    let outline = Outline::from_json(&json)?;
    outline.validate()?;
    Ok(outline)
}

fn read_libraries(path: Option<&Path>) -> Result<KnowledgeLibraries> {
    let Some(path) = path else {
        return Ok(KnowledgeLibraries::new());
    };
    let json = std::fs::read_to_string(path)
        .map_err(|e| PublishError::io(path, e))
        .wrap_err("could not read the library assignments")?;
    Ok(KnowledgeLibraries::from_json(&json)?)
}

/// Attach the error's hint as a suggestion, if it has one.
fn with_hint(error: PublishError) -> Report {
    match error.hint() {
        Some(hint) => Report::new(error).suggestion(hint),
        None => Report::new(error),
    }
}

fn build_services(config: &AppConfig, credentials: &Credentials) -> Result<Services> {
    let store = HttpRemoteStore::new(&config.remote, &credentials.remote)?;
    let generator = ChatProvider::new(&config.primary_provider)?;
    let web: Option<Arc<dyn WebResearcher>> = match credentials.web {
        Some(_) => Some(Arc::new(SearchProvider::new(&config.web_provider)?)),
        None => None,
    };
    Ok(Services {
        store: Arc::new(store),
        generator: Arc::new(generator),
        web,
    })
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: &CancelToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, aborting after the current call");
            token.cancel();
        }
    });
}

// ---------------------------------------------------------------------------
// publish
// ---------------------------------------------------------------------------

struct PublishArgs {
    outline: PathBuf,
    libraries: Option<PathBuf>,
    out: Option<PathBuf>,
    method: Option<MethodArg>,
    web_references: bool,
}

async fn cmd_publish(config_path: Option<&Path>, args: PublishArgs) -> Result<()> {
    let config = load(config_path)?;
    let outline = read_outline(&args.outline)?;
    let libraries = read_libraries(args.libraries.as_deref())?;

    let mut settings = PublishSettings::resolve(&config, &outline);
    if let Some(method) = args.method {
        settings.method = method.into();
    }
    if args.web_references {
        settings.include_web_references = true;
    }

    let credentials = resolve_credentials(&config, settings.method).map_err(with_hint)?;
    let services = build_services(&config, &credentials)?;
    let keys = ProviderKeys::from(&credentials);

    info!(
        title = %outline.title,
        items = outline.total_items(),
        libraries = libraries.len(),
        method = ?settings.method,
        "publishing outline"
    );

    let cancel = CancelToken::new();
    cancel_on_ctrl_c(&cancel);

    let reporter = CliProgress::new();
    let result = publish(
        &services,
        &keys,
        &outline,
        &libraries,
        &settings,
        &cancel,
        &reporter,
    )
    .await;
    reporter.finish();

    match result {
        Ok(outcome) => {
            print_outcome(&outcome);
            if let Some(path) = &args.out {
                let json = serde_json::to_string_pretty(&outcome)?;
                std::fs::write(path, json)
                    .map_err(|e| PublishError::io(path, e))
                    .wrap_err("could not write the published structure")?;
                println!("  Report:   {}", path.display());
            }
            println!();
            Ok(())
        }
        Err(PublishError::Aborted) => {
            let state = reporter.last_state();
            println!();
            println!("  Publishing aborted.");
            println!(
                "  Processed {} of {} items before the stop; nodes already created remain in the remote store.",
                state.processed_items, state.total_items
            );
            println!();
            Err(eyre!("publishing aborted by user"))
        }
        Err(e) => {
            println!();
            println!("  Publishing failed.");
            println!();
            Err(with_hint(e))
        }
    }
}

fn print_outcome(outcome: &PublishOutcome) {
    println!();
    match outcome.status {
        PublishStatus::Complete => println!("  Book published successfully!"),
        PublishStatus::CompletedWithErrors => {
            println!("  Book published with {} failed node operation(s).", outcome.failures.len())
        }
    }
    println!("  Root id:  {}", outcome.root.id);
    println!("  Root URL: {}", outcome.root.url);
    println!(
        "  Nodes:    {} of {}",
        outcome.structure.node_count(),
        outcome.progress.total_items
    );
    let debug = &outcome.progress.debug;
    if debug.fallback_credentials_used > 0 || debug.placeholders_used > 0 {
        println!(
            "  Fallback: {} call(s) used the fallback key, {} placeholder(s) inserted",
            debug.fallback_credentials_used, debug.placeholders_used
        );
    }
    println!("  Time:     {:.1}s", outcome.elapsed_ms as f64 / 1000.0);
    for failure in &outcome.failures {
        println!(
            "    ✗ {} {:?} \"{}\": {}",
            failure.key, failure.stage, failure.title, failure.message
        );
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
    last: Mutex<ProgressState>,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            bar,
            last: Mutex::new(ProgressState::default()),
        }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn last_state(&self) -> ProgressState {
        self.last
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for CliProgress {
    fn update(&self, state: &ProgressState) {
        self.bar.set_length(state.total_items as u64);
        self.bar.set_position(state.processed_items as u64);
        let detail = match state.step {
            PublishStep::CreatingRoot
            | PublishStep::CreatingChapters
            | PublishStep::CreatingTopics
            | PublishStep::CreatingLessons => state.current_item.as_str(),
            _ => state.message.as_str(),
        };
        self.bar.set_message(format!("{}: {detail}", state.step.label()));
        if let Ok(mut last) = self.last.lock() {
            *last = state.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// check / outline / research
// ---------------------------------------------------------------------------

async fn cmd_check(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let credentials = resolve_remote_credentials(&config.remote).map_err(with_hint)?;
    let store = HttpRemoteStore::new(&config.remote, &credentials)?;

    run_preflight(&store, &CancelToken::new())
        .await
        .map_err(with_hint)?;

    println!("  Remote store {} is ready:", config.remote.base_url);
    println!("    ✓ reachable");
    println!("    ✓ API surface available ({})", config.remote.api_root);
    println!("    ✓ credentials accepted for {}", credentials.username);
    Ok(())
}

fn cmd_outline(config_path: Option<&Path>, outline: &Path, libraries: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let outline = read_outline(outline)?;
    let libraries = read_libraries(libraries)?;

    let topics: usize = outline.chapters.iter().map(|c| c.topics.len()).sum();
    let plan = lesson_plan(&outline, &libraries, config.publish.library_inheritance);

    println!();
    println!("  {}", outline.title);
    println!(
        "  {} chapter(s), {} topic(s), {} lesson(s): {} items to publish",
        outline.chapters.len(),
        topics,
        plan.len(),
        outline.total_items()
    );
    println!();
    for lesson in &plan {
        let library = lesson
            .library
            .as_ref()
            .map(|l| l.as_str())
            .unwrap_or("-");
        let context = if lesson.has_user_context { "  +context" } else { "" };
        println!("  {:<16} {:<20} {}{context}", lesson.key.to_string(), library, lesson.title);
    }
    println!();
    Ok(())
}

async fn cmd_research(
    config_path: Option<&Path>,
    topic: String,
    must_haves: String,
    other_considerations: String,
    out: Option<&Path>,
) -> Result<()> {
    let config = load(config_path)?;
    let keys = provider_keys(&config.primary_provider);
    if keys.is_empty() {
        return Err(eyre!(
            "primary provider API key not found. Set the {} environment variable.",
            config.primary_provider.api_key_env
        ));
    }
    let generator = ChatProvider::new(&config.primary_provider)?;

    let cancel = CancelToken::new();
    cancel_on_ctrl_c(&cancel);

    let request = ResearchBriefRequest {
        topic,
        must_haves,
        other_considerations,
    };
    let brief = generate_research_brief(
        &generator,
        &keys,
        &request,
        &config.primary_provider.options,
        &cancel,
    )
    .await
    .map_err(with_hint)?;

    match out {
        Some(path) => {
            std::fs::write(path, &brief)
                .map_err(|e| PublishError::io(path, e))
                .wrap_err("could not write the research brief")?;
            println!("Research brief written to: {}", path.display());
        }
        None => println!("{brief}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
