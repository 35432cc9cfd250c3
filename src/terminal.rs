//! Line-oriented terminal rendering of one task view.
//!
//! The terminal plays three roles for the controller: the container region
//! ([`InstanceView`]), the dialog surface ([`ModalPresenter`]) and the place
//! solve notifications show up ([`SolveSignalSource`]).

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use crossterm::style::{Stylize, style};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, warn};

use crate::modal::{ModalContent, ModalPresenter};
use crate::types::{ConnectionLink, RegionId, UiState};
use crate::view::{InstanceView, Panel};
use crate::watcher::SolveSignalSource;

/// Input lines shared between the command loop and confirmation prompts.
pub type SharedInput = Arc<AsyncMutex<mpsc::UnboundedReceiver<String>>>;

pub fn input_channel() -> (mpsc::UnboundedSender<String>, SharedInput) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Arc::new(AsyncMutex::new(rx)))
}

#[derive(Debug, Default)]
struct Screen {
    panel: Option<Panel>,
    /// Region currently able to receive countdown text.
    countdown_region: Option<RegionId>,
    countdown_text: Option<String>,
    printed_minutes: Option<String>,
    modal: Option<ModalContent>,
    hidden: bool,
    notification: Option<String>,
}

pub struct TerminalView {
    task_name: String,
    out: Mutex<Box<dyn Write + Send>>,
    screen: Mutex<Screen>,
    input: SharedInput,
}

impl TerminalView {
    pub fn new(task_name: impl Into<String>, out: Box<dyn Write + Send>, input: SharedInput) -> Self {
        Self {
            task_name: task_name.into(),
            out: Mutex::new(out),
            screen: Mutex::new(Screen::default()),
            input,
        }
    }

    pub fn stdout(task_name: impl Into<String>, input: SharedInput) -> Self {
        Self::new(task_name, Box::new(io::stdout()), input)
    }

    pub fn input(&self) -> &SharedInput {
        &self.input
    }

    pub fn panel(&self) -> Option<Panel> {
        lock(&self.screen).panel.clone()
    }

    pub fn links(&self) -> Vec<ConnectionLink> {
        match lock(&self.screen).panel.as_ref() {
            Some(Panel::Active { links, .. }) => links.clone(),
            _ => Vec::new(),
        }
    }

    /// Link by its 1-based position in the active panel.
    pub fn link(&self, position: usize) -> Option<ConnectionLink> {
        position
            .checked_sub(1)
            .and_then(|index| self.links().into_iter().nth(index))
    }

    pub fn countdown_text(&self) -> Option<String> {
        lock(&self.screen).countdown_text.clone()
    }

    pub fn open_modal(&self) -> Option<ModalContent> {
        lock(&self.screen).modal.clone()
    }

    /// Record a platform notification, as if it had popped up next to the task.
    pub fn push_notification(&self, message: impl Into<String>) {
        lock(&self.screen).notification = Some(message.into());
    }

    pub fn set_visible(&self, visible: bool) {
        lock(&self.screen).hidden = !visible;
    }

    pub fn print_status(&self, state: &UiState) {
        let countdown = self.countdown_text();
        self.write_lines(|out| {
            match state {
                UiState::InstanceActive(record) => {
                    writeln!(
                        out,
                        "{} {} ({})",
                        style("running").green().bold(),
                        record.identifier,
                        record.short_id()
                    )?;
                    if let Some(remaining) = countdown {
                        writeln!(out, "  expires in {remaining}")?;
                    }
                }
                UiState::Expired => writeln!(out, "{}", style("expired").yellow().bold())?,
                UiState::NoInstance => writeln!(out, "{}", style("no instance").dim())?,
            }
            Ok(())
        });
    }

    pub fn print_info(&self, message: &str) {
        self.write_lines(|out| writeln!(out, "{message}"));
    }

    pub fn print_error(&self, message: &str) {
        self.write_lines(|out| writeln!(out, "{} {message}", style("error:").red().bold()));
    }

    pub fn print_help(&self) {
        self.write_lines(|out| {
            writeln!(out, "{}", style("commands").bold())?;
            for (command, help) in HELP {
                writeln!(out, "  {command:<14} {help}")?;
            }
            Ok(())
        });
    }

    fn write_lines(&self, f: impl FnOnce(&mut dyn Write) -> io::Result<()>) {
        let mut out = lock(&self.out);
        let result = f(&mut **out).and_then(|()| out.flush());
        if let Err(err) = result {
            warn!(error = %err, "failed to write to terminal");
        }
    }
}

const HELP: &[(&str, &str)] = &[
    ("start", "start an instance for this task"),
    ("stop", "stop the running instance"),
    ("restart", "request a fresh instance"),
    ("status", "show the current instance state"),
    ("ok", "confirm the open dialog"),
    ("dismiss", "close the open dialog"),
    ("open <n>", "open connection link n in the browser"),
    ("notify <text>", "simulate a platform notification"),
    ("logs", "show where the log file is"),
    ("help", "show this list"),
    ("quit", "leave"),
];

#[async_trait]
impl InstanceView for TerminalView {
    fn render(&self, panel: &Panel) {
        {
            let mut screen = lock(&self.screen);
            screen.countdown_region = panel.countdown_region().cloned();
            screen.countdown_text = None;
            screen.printed_minutes = None;
            screen.panel = Some(panel.clone());
        }

        let task_name = self.task_name.as_str();
        self.write_lines(|out| match panel {
            Panel::StartAffordance => writeln!(
                out,
                "No instance running for {task_name}. Type {} to launch one.",
                style("start").bold()
            ),
            Panel::Loading => writeln!(out, "{}", style("Starting instance...").dim()),
            Panel::Active {
                identifier, links, ..
            } => {
                writeln!(
                    out,
                    "{} {identifier}",
                    style("Instance running:").green().bold()
                )?;
                for (index, link) in links.iter().enumerate() {
                    let protocol = link.protocol.as_deref().unwrap_or("?");
                    writeln!(
                        out,
                        "  [{}] {} ({protocol}) {}",
                        index + 1,
                        style(&link.address).cyan(),
                        style(&link.url).underlined()
                    )?;
                }
                Ok(())
            }
            Panel::Expired => writeln!(
                out,
                "{} The instance will be refreshed shortly.",
                style("Instance expired.").yellow().bold()
            ),
        });
    }

    fn render_countdown(&self, region: &RegionId, remaining: &str) {
        let print = {
            let mut screen = lock(&self.screen);
            if screen.countdown_region.as_ref() != Some(region) {
                debug!(region = %region, "countdown region not mounted; skipping");
                return;
            }
            screen.countdown_text = Some(remaining.to_string());

            // One line per minute; `status` shows the exact value.
            let minutes = remaining.split(':').next().unwrap_or(remaining).to_string();
            let changed = screen.printed_minutes.as_deref() != Some(minutes.as_str());
            if changed {
                screen.printed_minutes = Some(minutes);
            }
            changed
        };

        if print {
            self.write_lines(|out| writeln!(out, "  expires in {}", style(remaining).bold()));
        }
    }

    async fn confirm(&self, prompt: &str) -> bool {
        self.write_lines(|out| write!(out, "{prompt} {} ", style("[y/N]").bold()));

        let answer = self.input.lock().await.recv().await;
        answer.is_some_and(|line| matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

impl ModalPresenter for TerminalView {
    fn present(&self, content: &ModalContent) {
        lock(&self.screen).modal = Some(content.clone());
        self.write_lines(|out| {
            writeln!(out, "┌ {}", style(&content.title).bold())?;
            for line in content.body.lines() {
                writeln!(out, "│ {line}")?;
            }
            writeln!(
                out,
                "└ type {} for \"{}\" or {}",
                style("ok").bold(),
                content.confirm_label,
                style("dismiss").bold()
            )
        });
    }

    fn hide(&self) {
        lock(&self.screen).modal = None;
    }
}

impl SolveSignalSource for TerminalView {
    fn view_visible(&self) -> bool {
        !lock(&self.screen).hidden
    }

    fn latest_notification(&self) -> Option<String> {
        lock(&self.screen).notification.clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
