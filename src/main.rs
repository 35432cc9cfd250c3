use std::{
    io::{self, Write},
    panic,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{execute, style::ResetColor};
use tracing::info;

use ctfd_instance::{
    backend::HttpBackend,
    cli::{self, RootCommand, run_interactive, spawn_stdin_reader},
    clock::SystemClock,
    controller::{ControllerDeps, InstanceController},
    logging::{init_logging, print_log_location},
    settings::Settings,
    terminal::{TerminalView, input_channel},
    types::TaskContext,
};

#[derive(Parser, Debug)]
#[command(
    name = "ctfd-instance",
    about = "Start, stop and watch the on-demand instance of a CTFd challenge",
    long_about = "Drives the instance lifecycle of one challenge from the terminal: start and stop requests, connection links and an expiry countdown.",
    version = env!("CTFD_INSTANCE_BUILD_VERSION"),
    author
)]
struct Cli {
    /// Image identifier of the challenge.
    #[arg(long, global = true, value_name = "IMAGE")]
    image: Option<String>,

    /// Display name of the challenge; defaults to the image.
    #[arg(long, global = true, value_name = "NAME")]
    task: Option<String>,

    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    /// Settings file to use instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Instance(RootCommand),
    /// Write the effective settings to the settings file and exit.
    InitConfig,
}

enum RunOutcome {
    Continue,
    Exit(i32),
}

#[tokio::main]
async fn main() -> Result<()> {
    let log = match init_logging() {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("warning: failed to initialize logging: {err}");
            None
        }
    };
    if let Some(handle) = log.as_ref() {
        install_panic_hook_with_log(handle.path.clone());
    }

    match run_app().await {
        Ok(RunOutcome::Continue) => {
            if let Some(handle) = log.as_ref() {
                print_log_location(&handle.path);
            }
            Ok(())
        }
        Ok(RunOutcome::Exit(code)) => {
            drop(log);
            std::process::exit(code);
        }
        Err(err) => {
            if let Some(handle) = log.as_ref() {
                print_log_location(&handle.path);
            }
            Err(err)
        }
    }
}

async fn run_app() -> Result<RunOutcome> {
    let cli = Cli::parse();

    if matches!(cli.command, Some(Command::InitConfig)) {
        let path = init_config(cli.config.as_deref(), cli.base_url.as_deref())?;
        if !cli.quiet {
            println!("Settings written to {}", path.display());
        }
        return Ok(RunOutcome::Exit(0));
    }

    let Some(context) = task_context(cli.image.as_deref(), cli.task.as_deref()) else {
        eprintln!("error[IMAGE_REQUIRED]: --image is required and cannot be empty");
        return Ok(RunOutcome::Exit(2));
    };

    let settings = load_settings(cli.config.as_deref(), cli.base_url.as_deref());
    let backend = Arc::new(
        HttpBackend::new(settings.backend_config()).context("failed to build HTTP client")?,
    );
    let clock = Arc::new(SystemClock);

    if let Some(Command::Instance(command)) = cli.command {
        let code = cli::run(
            backend.as_ref(),
            clock.as_ref(),
            &context,
            command,
            cli.json,
            cli.quiet,
        )
        .await;
        return Ok(RunOutcome::Exit(code));
    }

    info!(
        identifier = %context.identifier,
        base_url = %settings.base_url,
        "starting interactive session"
    );

    let (tx, input) = input_channel();
    spawn_stdin_reader(tx);
    let view = Arc::new(TerminalView::stdout(context.task_name.clone(), input));
    let controller = InstanceController::new(
        context,
        ControllerDeps {
            backend,
            view: view.clone(),
            modal: view.clone(),
            solve_signal: view.clone(),
            clock,
        },
        settings.controller_config(),
    );

    run_interactive(&controller, &view).await;
    Ok(RunOutcome::Continue)
}

fn task_context(image: Option<&str>, task: Option<&str>) -> Option<TaskContext> {
    let image = image.map(str::trim).filter(|value| !value.is_empty())?;
    let task = task
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(image);
    Some(TaskContext::new(image, task))
}

fn load_settings(config: Option<&Path>, base_url: Option<&str>) -> Settings {
    let mut settings = match config {
        Some(path) => Settings::load_from_path(path),
        None => Settings::load(),
    };
    if let Some(base_url) = base_url {
        settings.base_url = base_url.to_string();
        settings.validate();
    }
    settings
}

/// Loads the effective settings (file plus `--base-url`) and saves them back,
/// creating the file when it does not exist yet.
fn init_config(config: Option<&Path>, base_url: Option<&str>) -> Result<PathBuf> {
    let path = match config {
        Some(path) => path.to_path_buf(),
        None => Settings::config_path().context("unable to determine config path")?,
    };
    let settings = load_settings(Some(&path), base_url);
    settings.save_to_path(&path)?;
    info!(path = %path.display(), "settings written");
    Ok(path)
}

fn install_panic_hook_with_log(log_path: PathBuf) {
    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let mut stderr = io::stderr();
        let _ = execute!(stderr, ResetColor);
        let _ = stderr.flush();
        eprintln!();
        eprintln!("  Log file: {}", log_path.display());
        eprintln!();
        previous_hook(panic_info);
    }));
}
