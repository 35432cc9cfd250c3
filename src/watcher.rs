//! One-shot watcher for the platform's "flag correct" notification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use regex::Regex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_500);
pub const DEFAULT_SOLVE_PATTERN: &str = "Correct";

/// Where solve notifications for the current task view show up.
pub trait SolveSignalSource: Send + Sync {
    fn view_visible(&self) -> bool;
    fn latest_notification(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct SolvePattern(Regex);

impl SolvePattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    /// Build from a user-supplied pattern, keeping the default when it is invalid.
    pub fn or_default(pattern: &str) -> Self {
        match Self::new(pattern) {
            Ok(pattern) => pattern,
            Err(err) => {
                warn!(pattern, error = %err, "invalid solve pattern; using default");
                Self::default()
            }
        }
    }

    pub fn is_match(&self, message: &str) -> bool {
        self.0.is_match(message.trim())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for SolvePattern {
    fn default() -> Self {
        Self(Regex::new(DEFAULT_SOLVE_PATTERN).expect("valid default solve pattern"))
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WatchOutcome {
    /// Still watching; nothing qualifying yet.
    Waiting,
    /// The view went away; the watcher stopped without firing.
    ViewHidden,
    /// A solve was seen; the callback ran and the watcher stopped.
    Solved,
    /// Already stopped; nothing was checked.
    Stopped,
}

struct Activation {
    stopped: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Activation {
    fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Returns `true` only for the caller that actually stopped it.
    fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::SeqCst)
    }

    fn inspect(
        &self,
        source: &dyn SolveSignalSource,
        pattern: &SolvePattern,
        on_solved: &(dyn Fn() + Send + Sync),
    ) -> WatchOutcome {
        if self.stopped.load(Ordering::SeqCst) {
            return WatchOutcome::Stopped;
        }

        if !source.view_visible() {
            if self.stop() {
                debug!("task view hidden; flag watcher stopped");
            }
            return WatchOutcome::ViewHidden;
        }

        let solved = source
            .latest_notification()
            .is_some_and(|message| pattern.is_match(&message));
        if !solved {
            return WatchOutcome::Waiting;
        }

        if !self.stop() {
            return WatchOutcome::Stopped;
        }
        debug!("solve notification seen; reconciling once");
        on_solved();
        WatchOutcome::Solved
    }
}

pub struct FlagEventWatcher {
    interval: Duration,
    pattern: SolvePattern,
    activation: Mutex<Arc<Activation>>,
}

impl FlagEventWatcher {
    pub fn new(interval: Duration, pattern: SolvePattern) -> Self {
        let idle = Activation::new();
        idle.stop();
        Self {
            interval: interval.max(Duration::from_millis(1)),
            pattern,
            activation: Mutex::new(Arc::new(idle)),
        }
    }

    /// Begin a fresh activation, ending any previous one.
    ///
    /// `on_solved` runs at most once for this activation. Must be called from
    /// within a tokio runtime.
    pub fn engage(
        &self,
        source: Arc<dyn SolveSignalSource>,
        on_solved: impl Fn() + Send + Sync + 'static,
    ) {
        let activation = Arc::new(Activation::new());
        let previous = std::mem::replace(&mut *lock(&self.activation), Arc::clone(&activation));
        end(&previous);

        let pattern = self.pattern.clone();
        let interval = self.interval;
        let looped = Arc::clone(&activation);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match looped.inspect(source.as_ref(), &pattern, &on_solved) {
                    WatchOutcome::Waiting => {}
                    WatchOutcome::ViewHidden | WatchOutcome::Solved | WatchOutcome::Stopped => break,
                }
            }
        });

        *lock(&activation.handle) = Some(handle);
        debug!(interval_ms = interval.as_millis() as u64, "flag watcher engaged");
    }

    /// Run one check of the current activation immediately.
    pub fn check(
        &self,
        source: &dyn SolveSignalSource,
        on_solved: impl Fn() + Send + Sync,
    ) -> WatchOutcome {
        let activation = Arc::clone(&lock(&self.activation));
        let outcome = activation.inspect(source, &self.pattern, &on_solved);
        if matches!(outcome, WatchOutcome::ViewHidden | WatchOutcome::Solved) {
            end(&activation);
        }
        outcome
    }

    /// Stop watching. Safe to call any number of times.
    pub fn disengage(&self) {
        let activation = Arc::clone(&lock(&self.activation));
        end(&activation);
    }

    pub fn is_engaged(&self) -> bool {
        !lock(&self.activation).stopped.load(Ordering::SeqCst)
    }
}

impl Drop for FlagEventWatcher {
    fn drop(&mut self) {
        self.disengage();
    }
}

fn end(activation: &Activation) {
    activation.stop();
    if let Some(handle) = lock(&activation.handle).take() {
        handle.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
