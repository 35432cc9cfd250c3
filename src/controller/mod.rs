//! Per-view controller for one task's instance.
//!
//! Every trigger (activation, start/stop completion, countdown expiry, solve
//! notification) funnels into [`InstanceController::reconcile`]. Results are
//! applied in issue order: a reconciliation that completes after a
//! later-issued one has already been applied is dropped.

mod actions;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::backend::InstanceBackend;
use crate::clock::Clock;
use crate::countdown::{
    CountdownObserver, CountdownPhase, CountdownTimer, DEFAULT_GRACE_DELAY, DEFAULT_TICK_INTERVAL,
};
use crate::modal::{ModalControl, ModalNotifier, ModalPresenter, ModalRequest};
use crate::poller::classify;
use crate::types::{RegionId, TaskContext, UiState};
use crate::view::{InstanceView, Panel};
use crate::watcher::{DEFAULT_POLL_INTERVAL, FlagEventWatcher, SolvePattern, SolveSignalSource};

pub const DEFAULT_COOLDOWN_MINUTES: u64 = 5;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub tick_interval: Duration,
    pub grace_delay: Duration,
    pub flag_poll_interval: Duration,
    pub cooldown_minutes: u64,
    pub solve_pattern: SolvePattern,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            grace_delay: DEFAULT_GRACE_DELAY,
            flag_poll_interval: DEFAULT_POLL_INTERVAL,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            solve_pattern: SolvePattern::default(),
        }
    }
}

/// Collaborators a controller talks to.
pub struct ControllerDeps {
    pub backend: Arc<dyn InstanceBackend>,
    pub view: Arc<dyn InstanceView>,
    pub modal: Arc<dyn ModalPresenter>,
    pub solve_signal: Arc<dyn SolveSignalSource>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct InstanceController {
    inner: Arc<Inner>,
}

struct Inner {
    context: TaskContext,
    backend: Arc<dyn InstanceBackend>,
    view: Arc<dyn InstanceView>,
    solve_signal: Arc<dyn SolveSignalSource>,
    modal: ModalNotifier,
    countdown: CountdownTimer,
    watcher: FlagEventWatcher,
    cooldown_minutes: u64,
    tickets: AtomicU64,
    render: Mutex<RenderState>,
}

struct RenderState {
    mounted: bool,
    applied_ticket: u64,
    /// Bumped whenever the countdown binding changes; stale countdown
    /// callbacks compare against it and bail out.
    generation: u64,
    ui: UiState,
}

impl InstanceController {
    pub fn new(context: TaskContext, deps: ControllerDeps, config: ControllerConfig) -> Self {
        let ControllerDeps {
            backend,
            view,
            modal,
            solve_signal,
            clock,
        } = deps;

        Self {
            inner: Arc::new(Inner {
                context,
                backend,
                view,
                solve_signal,
                modal: ModalNotifier::new(modal),
                countdown: CountdownTimer::new(clock, config.tick_interval, config.grace_delay),
                watcher: FlagEventWatcher::new(config.flag_poll_interval, config.solve_pattern),
                cooldown_minutes: config.cooldown_minutes,
                tickets: AtomicU64::new(0),
                render: Mutex::new(RenderState {
                    mounted: false,
                    applied_ticket: 0,
                    generation: 0,
                    ui: UiState::NoInstance,
                }),
            }),
        }
    }

    pub fn context(&self) -> &TaskContext {
        &self.inner.context
    }

    pub fn state(&self) -> UiState {
        lock(&self.inner.render).ui.clone()
    }

    pub fn is_active(&self) -> bool {
        lock(&self.inner.render).mounted
    }

    pub fn countdown_phase(&self) -> CountdownPhase {
        self.inner.countdown.phase()
    }

    pub fn countdown_region(&self) -> Option<RegionId> {
        self.inner.countdown.armed_region()
    }

    pub fn watcher_engaged(&self) -> bool {
        self.inner.watcher.is_engaged()
    }

    pub fn modal(&self) -> &ModalNotifier {
        &self.inner.modal
    }

    pub fn close_modal(&self, control: ModalControl) -> bool {
        self.inner.modal.close(control)
    }

    /// Post-render entry point: mount the modal surface, start watching for
    /// solves and reconcile once.
    pub async fn activate(&self) -> UiState {
        lock(&self.inner.render).mounted = true;
        info!(
            identifier = %self.inner.context.identifier,
            task = %self.inner.context.task_name,
            "task view activated"
        );

        self.inner.modal.ensure_container();
        self.inner
            .watcher
            .engage(Arc::clone(&self.inner.solve_signal), self.deferred_reconcile());
        self.reconcile().await
    }

    /// Tear down timers. Results that arrive afterwards are ignored.
    pub fn deactivate(&self) {
        {
            let mut render = lock(&self.inner.render);
            render.mounted = false;
            render.generation += 1;
        }
        self.inner.countdown.cancel();
        self.inner.watcher.disengage();
        info!(identifier = %self.inner.context.identifier, "task view deactivated");
    }

    /// Fetch backend state and make the view match it.
    ///
    /// Returns the classification of this poll even when a newer poll had
    /// already been applied and this result was dropped.
    pub async fn reconcile(&self) -> UiState {
        let ticket = self.inner.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let identifier = self.inner.context.identifier.as_str();

        let state = match self.inner.backend.fetch_status().await {
            Ok(report) => classify(&report, identifier),
            Err(err) => {
                debug!(identifier, ticket, error = %err, "status poll failed; treating as no instance");
                UiState::NoInstance
            }
        };

        self.apply(ticket, &state);
        state
    }

    fn apply(&self, ticket: u64, state: &UiState) {
        let inner = &self.inner;
        let mut render = lock(&inner.render);
        if !render.mounted {
            debug!(ticket, "view inactive; dropping reconcile result");
            return;
        }
        if ticket < render.applied_ticket {
            debug!(
                ticket,
                applied = render.applied_ticket,
                "newer reconcile already applied; dropping stale result"
            );
            return;
        }

        render.applied_ticket = ticket;
        render.generation += 1;
        render.ui = state.clone();

        match state {
            UiState::InstanceActive(record) => {
                debug!(
                    ticket,
                    instance = %record.short_id(),
                    expires_at = record.expires_at_epoch_seconds,
                    "instance active"
                );
                inner.view.render(&Panel::active(record));
                inner.countdown.arm(
                    record.expires_at_epoch_millis(),
                    record.countdown_region(),
                    Arc::new(CountdownBridge {
                        inner: Arc::downgrade(&self.inner),
                        generation: render.generation,
                    }),
                );
            }
            UiState::NoInstance | UiState::Expired => {
                debug!(ticket, "no matching instance");
                inner.countdown.cancel();
                inner.view.render(&Panel::StartAffordance);
            }
        }
    }

    fn show_loading(&self) {
        let mut render = lock(&self.inner.render);
        if !render.mounted {
            return;
        }
        render.generation += 1;
        self.inner.countdown.cancel();
        self.inner.view.render(&Panel::Loading);
    }

    fn notify(&self, request: ModalRequest) {
        if !self.is_active() {
            debug!(title = %request.content.title, "view inactive; modal suppressed");
            return;
        }
        self.inner.modal.show(request);
    }

    /// A callback that schedules one reconciliation on the current runtime.
    ///
    /// Must be created from within a tokio runtime; it may be invoked from
    /// anywhere.
    fn deferred_reconcile(&self) -> impl Fn() + Send + Sync + 'static {
        let weak = Arc::downgrade(&self.inner);
        let runtime = Handle::current();
        move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let controller = InstanceController { inner };
            runtime.spawn(async move {
                controller.reconcile().await;
            });
        }
    }
}

struct CountdownBridge {
    inner: Weak<Inner>,
    generation: u64,
}

impl CountdownBridge {
    /// Run `f` only if this bridge still belongs to the live countdown.
    fn with_current(&self, f: impl FnOnce(&Arc<Inner>, &mut RenderState)) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut render = lock(&inner.render);
        if !render.mounted || render.generation != self.generation {
            return;
        }
        f(&inner, &mut render);
    }
}

impl CountdownObserver for CountdownBridge {
    fn tick(&self, region: &RegionId, remaining: &str) {
        self.with_current(|inner, _| inner.view.render_countdown(region, remaining));
    }

    fn expired(&self, region: &RegionId) {
        self.with_current(|inner, render| {
            info!(region = %region, "instance expired");
            render.ui = UiState::Expired;
            inner.view.render(&Panel::Expired);
        });
    }

    fn grace_elapsed(&self) {
        let mut due = None;
        self.with_current(|inner, _| due = Some(Arc::clone(inner)));
        if let Some(inner) = due {
            let controller = InstanceController { inner };
            tokio::spawn(async move {
                controller.reconcile().await;
            });
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
