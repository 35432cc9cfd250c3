//! Command surface of the terminal host: the one-shot `status` subcommand and
//! the interactive command loop.

use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;
use std::thread;

use clap::Subcommand;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::backend::InstanceBackend;
use crate::clock::Clock;
use crate::controller::InstanceController;
use crate::countdown::format_remaining;
use crate::logging::{get_log_directory, most_recent_log};
use crate::modal::ModalControl;
use crate::poller::classify;
use crate::terminal::TerminalView;
use crate::types::{ActionOutcome, TaskContext, UiState};

const SCHEMA_VERSION: &str = "ctfd-instance.v1";

#[derive(Debug, Clone, Subcommand)]
pub enum RootCommand {
    /// Poll the backend once, print the instance state and exit.
    Status,
}

#[derive(Debug)]
struct CommandOutput {
    command: &'static str,
    data: Value,
    text: String,
}

#[derive(Debug)]
struct CliError {
    exit_code: i32,
    code: &'static str,
    message: String,
}

type CliResult<T> = Result<T, CliError>;

pub async fn run(
    backend: &dyn InstanceBackend,
    clock: &dyn Clock,
    context: &TaskContext,
    command: RootCommand,
    json_output: bool,
    quiet: bool,
) -> i32 {
    let result = match command {
        RootCommand::Status => status(backend, clock, context).await,
    };

    match result {
        Ok(output) => {
            print_success(output, context, json_output, quiet);
            0
        }
        Err(err) => {
            print_error(&err, json_output);
            err.exit_code
        }
    }
}

async fn status(
    backend: &dyn InstanceBackend,
    clock: &dyn Clock,
    context: &TaskContext,
) -> CliResult<CommandOutput> {
    let report = backend.fetch_status().await.map_err(|err| CliError {
        exit_code: 5,
        code: "BACKEND_ERROR",
        message: err.to_string(),
    })?;

    let state = classify(&report, &context.identifier);
    let now_ms = clock.now_epoch_millis();
    let remaining = state.record().and_then(|record| {
        format_remaining(record.expires_at_epoch_millis().saturating_sub(now_ms))
    });

    let data = json!({
        "state": state.as_str(),
        "instance": state.record(),
        "links": state.record().map(|record| record.links()).unwrap_or_default(),
        "remaining": remaining,
    });

    Ok(CommandOutput {
        command: "status",
        data,
        text: render_status_text(&state, remaining.as_deref()),
    })
}

fn render_status_text(state: &UiState, remaining: Option<&str>) -> String {
    let Some(record) = state.record() else {
        return state.as_str().to_string();
    };

    let mut lines = vec![format!(
        "{} {} ({}) expires in {}",
        state.as_str(),
        record.identifier,
        record.short_id(),
        remaining.unwrap_or("0:00")
    )];

    let rows = record
        .links()
        .into_iter()
        .enumerate()
        .map(|(index, link)| {
            vec![
                (index + 1).to_string(),
                link.address,
                link.protocol.unwrap_or_default(),
                link.url,
            ]
        })
        .collect::<Vec<_>>();
    if !rows.is_empty() {
        lines.push(render_text_table(&["#", "ADDRESS", "PROTO", "URL"], &rows));
    }

    lines.join("\n")
}

fn render_text_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();

    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            widths[index] = widths[index].max(cell.chars().count());
        }
    }

    let border = format!(
        "+{}+",
        widths
            .iter()
            .map(|width| "-".repeat(*width + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    let mut lines = vec![border.clone()];
    lines.push(format_row(headers.iter().copied(), &widths));
    lines.push(border.clone());
    for row in rows {
        lines.push(format_row(row.iter().map(String::as_str), &widths));
    }
    lines.push(border);
    lines.join("\n")
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    format!(
        "| {} |",
        cells
            .enumerate()
            .map(|(index, cell)| format!("{cell:<width$}", width = widths[index]))
            .collect::<Vec<_>>()
            .join(" | ")
    )
}

fn print_success(output: CommandOutput, context: &TaskContext, json_output: bool, quiet: bool) {
    if json_output {
        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "command": output.command,
            "task": context,
            "data": output.data
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(value) => println!("{value}"),
            Err(_) => println!("{}", payload),
        }
        return;
    }

    if quiet {
        return;
    }

    println!("{}", output.text);
}

fn print_error(err: &CliError, json_output: bool) {
    error!(code = err.code, message = %err.message, "cli command failed");

    if json_output {
        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "error": {
                "code": err.code,
                "message": err.message
            }
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(value) => eprintln!("{value}"),
            Err(_) => eprintln!("{}", payload),
        }
        return;
    }

    eprintln!("error[{}]: {}", err.code, err.message);
}

/// One line typed into the interactive session.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum InteractiveCommand {
    Start,
    Stop,
    Restart,
    Status,
    Confirm,
    Dismiss,
    Open(usize),
    Notify(String),
    Logs,
    Help,
    Quit,
}

impl FromStr for InteractiveCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "restart" => Self::Restart,
            "status" => Self::Status,
            "ok" => Self::Confirm,
            "dismiss" | "close" => Self::Dismiss,
            "open" => {
                let position = rest
                    .parse::<usize>()
                    .map_err(|_| format!("usage: open <n> (got '{rest}')"))?;
                Self::Open(position)
            }
            "notify" if !rest.is_empty() => Self::Notify(rest.to_string()),
            "notify" => return Err("usage: notify <text>".to_string()),
            "logs" => Self::Logs,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            _ => return Err(format!("unknown command '{verb}'; type help")),
        };

        if !rest.is_empty() && !matches!(command, Self::Open(_) | Self::Notify(_)) {
            return Err(format!("'{verb}' takes no arguments"));
        }
        Ok(command)
    }
}

/// Forward stdin lines into `tx` from a dedicated thread.
pub fn spawn_stdin_reader(tx: mpsc::UnboundedSender<String>) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to read stdin");
                    break;
                }
            }
        }
    });
}

/// Drive one task view until `quit` or end of input.
pub async fn run_interactive(controller: &InstanceController, view: &TerminalView) {
    view.set_visible(true);
    controller.activate().await;
    view.print_info("Type help for a list of commands.");

    loop {
        let Some(line) = view.input().lock().await.recv().await else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<InteractiveCommand>() {
            Ok(InteractiveCommand::Quit) => break,
            Ok(command) => dispatch(controller, view, command).await,
            Err(message) => view.print_error(&message),
        }
    }

    view.set_visible(false);
    controller.deactivate();
}

async fn dispatch(controller: &InstanceController, view: &TerminalView, command: InteractiveCommand) {
    match command {
        InteractiveCommand::Start => report_outcome(view, controller.start_instance().await),
        InteractiveCommand::Restart => report_outcome(view, controller.restart_instance().await),
        InteractiveCommand::Stop => report_outcome(view, controller.stop_instance().await),
        InteractiveCommand::Status => view.print_status(&controller.state()),
        InteractiveCommand::Confirm => close_dialog(controller, view, ModalControl::Confirm),
        InteractiveCommand::Dismiss => close_dialog(controller, view, ModalControl::Dismiss),
        InteractiveCommand::Open(position) => match view.link(position) {
            Some(link) => {
                info!(url = %link.url, "opening connection link");
                if let Err(err) = open::that(&link.url) {
                    view.print_error(&format!("failed to open {}: {err}", link.url));
                }
            }
            None => view.print_error(&format!("no link {position}")),
        },
        InteractiveCommand::Notify(message) => view.push_notification(message),
        InteractiveCommand::Logs => {
            let dir = get_log_directory().ok();
            view.print_info(&latest_log_message(dir.as_deref()));
        }
        InteractiveCommand::Help => view.print_help(),
        InteractiveCommand::Quit => {}
    }
}

/// Path of the newest log file in `log_dir`, as shown by `logs`.
fn latest_log_message(log_dir: Option<&Path>) -> String {
    match log_dir.and_then(most_recent_log) {
        Some(path) => format!("Log file: {}", path.display()),
        None => "No log file yet.".to_string(),
    }
}

fn close_dialog(controller: &InstanceController, view: &TerminalView, control: ModalControl) {
    if !controller.close_modal(control) {
        view.print_info("No dialog is open.");
    }
}

fn report_outcome(view: &TerminalView, outcome: ActionOutcome) {
    if outcome == ActionOutcome::Declined {
        view.print_info("Stop cancelled.");
    }
}
