use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::future::AbortHandle;
use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use writing_compiler::app::{Action, ActionOutcome, App, SettingsUpdate};
use writing_compiler::config::{self, SettingsStore};
use writing_compiler::error::CompilerError;
use writing_compiler::store::FileStore;
use writing_compiler::ui::{self, Painter};

/// Exit status when the validator reports unresolved links.
const EXIT_REPORT_FAILED: i32 = 1;
/// Exit status for configuration, network and response errors.
const EXIT_ERROR: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "writing-compiler",
    version,
    about = "Find unresolved links in prose and rewrite them with an OpenAI-compatible model"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings directory (default: ~/.config/writing-compiler)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Log filter for stderr, e.g. `debug` or `writing_compiler=trace`
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the validator and print its report
    Validate(RunArgs),
    /// Run the validator, then rewrite the text against its report
    Fix(RunArgs),
    /// Inspect or change stored settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Input file; stdin when omitted or `-`
    file: Option<PathBuf>,

    /// API key for this run only (also read from WRITING_COMPILER_API_KEY, GROQ_API_KEY, OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Reject reports whose summary disagrees with their diagnostics
    #[arg(long)]
    strict: bool,

    /// Print JSON instead of the formatted report
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print current settings (API key masked)
    Show,
    /// Change and save settings
    Set(SetArgs),
    /// Delete stored settings
    Reset,
    /// Remove the stored API key
    ClearKey,
    /// Print the effective prompts
    Prompts,
}

#[derive(Args, Debug)]
struct SetArgs {
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    model_validator: Option<String>,
    #[arg(long)]
    model_rewriter: Option<String>,
    /// Store the API key on disk
    #[arg(long)]
    persist_api_key: Option<bool>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    system_prompt_validator_file: Option<PathBuf>,
    #[arg(long)]
    system_prompt_rewriter_file: Option<PathBuf>,
    #[arg(long)]
    validator_template_file: Option<PathBuf>,
    #[arg(long)]
    rewriter_template_file: Option<PathBuf>,
    /// Restore the built-in prompts before applying other changes
    #[arg(long)]
    clear_prompts: bool,
}

fn init_tracing(level: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let dir = config::resolve_config_dir(cli.config_dir)
        .context("Could not determine config directory; pass --config-dir")?;
    let store = SettingsStore::new(FileStore::new(dir));
    let painter = Painter::new(use_color());

    match cli.command {
        Command::Validate(args) => {
            let code = run_action(store, Action::Validate, args, painter).await?;
            std::process::exit(code);
        }
        Command::Fix(args) => {
            let code = run_action(store, Action::ValidateThenFix, args, painter).await?;
            std::process::exit(code);
        }
        Command::Settings(command) => run_settings(App::new(store), command, painter),
    }
}

fn use_color() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}

async fn run_action(
    store: SettingsStore<FileStore>,
    action: Action,
    args: RunArgs,
    painter: Painter,
) -> Result<i32> {
    let text = read_input(args.file.as_deref())?;
    if text.trim().is_empty() {
        bail!("Input text is empty");
    }

    let session_key = args.api_key.or_else(config::api_key_from_env);
    let mut app = App::new(store).with_session_api_key(session_key);

    let session = match app.prepare() {
        Ok(session) => session,
        Err(err) => return Ok(report_error(&err, painter)),
    };
    let compiler = session.compiler(args.strict);
    for warning in compiler.configuration_warnings() {
        tracing::warn!("{}", warning);
    }

    let (abort_handle, registration) = AbortHandle::new_pair();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort_handle.abort();
        }
    });

    let result = app.run(&compiler, action, &text, registration).await;
    ctrl_c.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => return Ok(report_error(&err, painter)),
    };

    if args.json {
        print_json(&outcome)?;
    } else {
        print_outcome(&outcome, &text, painter);
    }

    let passed = outcome.validation().report.pass;
    Ok(match outcome {
        ActionOutcome::Validated(_) if !passed => EXIT_REPORT_FAILED,
        _ => 0,
    })
}

fn report_error(err: &CompilerError, painter: Painter) -> i32 {
    tracing::debug!(error = %err, "action failed");
    eprintln!("{}", ui::render_error(&err.user_message(), painter));
    if let CompilerError::Schema(schema) = err {
        for issue in &schema.issues {
            eprintln!("  {}", issue);
        }
    }
    if err.is_cancelled() {
        EXIT_CANCELLED
    } else {
        EXIT_ERROR
    }
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

fn print_outcome(outcome: &ActionOutcome, text: &str, painter: Painter) {
    let validation = outcome.validation();
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "{}", ui::render_report(&validation.report, text, painter));
    if !validation.issues.is_empty() {
        let _ = write!(
            out,
            "\n{}",
            ui::render_consistency_issues(&validation.issues, painter)
        );
    }
    if let Some(rewritten) = outcome.rewritten() {
        let _ = write!(out, "\n{}", ui::render_rewrite(rewritten, painter));
    }
}

fn print_json(outcome: &ActionOutcome) -> Result<()> {
    let validation = outcome.validation();
    let value = match outcome.rewritten() {
        None if validation.issues.is_empty() => serde_json::to_value(&validation.report)?,
        rewritten => {
            let issues: Vec<String> = validation.issues.iter().map(ToString::to_string).collect();
            let mut value = serde_json::json!({
                "report": validation.report,
                "consistency_issues": issues,
            });
            if let Some(rewritten) = rewritten {
                value["rewritten"] = serde_json::Value::String(rewritten.to_string());
            }
            value
        }
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run_settings(
    app: App<FileStore>,
    command: SettingsCommand,
    painter: Painter,
) -> Result<()> {
    match command {
        SettingsCommand::Show => {
            let settings = app.load_settings()?;
            println!(
                "{}",
                painter.muted(&format!(
                    "# {}",
                    app.settings_store()
                        .inner()
                        .path_for(config::SETTINGS_KEY)
                        .display()
                ))
            );
            print!("{}", ui::render_settings(&settings, painter));
        }
        SettingsCommand::Set(args) => {
            let update = settings_update(args)?;
            if update.is_empty() {
                bail!("Nothing to change; see `writing-compiler settings set --help`");
            }
            let persisting_key = update.api_key.is_some();
            let saved = app.update_settings(update)?;
            if persisting_key && !saved.persist_api_key {
                eprintln!(
                    "  Note: the API key was not stored because persistApiKey is false. \
                     Add --persist-api-key true to keep it."
                );
            }
            print!("{}", ui::render_settings(&saved, painter));
        }
        SettingsCommand::Reset => {
            app.settings_store().reset()?;
            println!("Settings reset to defaults.");
        }
        SettingsCommand::ClearKey => {
            app.settings_store().clear_credential()?;
            println!("Stored API key removed.");
        }
        SettingsCommand::Prompts => {
            let settings = app.load_settings()?;
            print!("{}", ui::render_prompts(&settings, painter));
        }
    }
    Ok(())
}

fn settings_update(args: SetArgs) -> Result<SettingsUpdate> {
    Ok(SettingsUpdate {
        base_url: args.base_url,
        model_validator: args.model_validator,
        model_rewriter: args.model_rewriter,
        persist_api_key: args.persist_api_key,
        api_key: args.api_key,
        system_prompt_validator: read_optional(args.system_prompt_validator_file.as_deref())?,
        system_prompt_rewriter: read_optional(args.system_prompt_rewriter_file.as_deref())?,
        validator_prompt_template: read_optional(args.validator_template_file.as_deref())?,
        rewriter_prompt_template: read_optional(args.rewriter_template_file.as_deref())?,
        reset_prompts: args.clear_prompts,
    })
}

fn read_optional(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(p).with_context(|| format!("Failed to read {}", p.display()))
    })
    .transpose()
}
