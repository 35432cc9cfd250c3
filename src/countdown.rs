//! Per-view countdown bound to one instance's expiry.
//!
//! A [`CountdownTimer`] owns at most one live poll session. Arming replaces the
//! previous session unconditionally, which also drops a grace-delay
//! re-reconciliation that has not fired yet.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::types::RegionId;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_GRACE_DELAY: Duration = Duration::from_secs(7);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CountdownPhase {
    Idle,
    Armed,
    Ticking,
    Expired,
    /// Grace delay elapsed and the re-reconciliation was handed off.
    Reconciling,
}

/// Receives countdown output. Called from the countdown task.
pub trait CountdownObserver: Send + Sync {
    fn tick(&self, region: &RegionId, remaining: &str);
    fn expired(&self, region: &RegionId);
    fn grace_elapsed(&self);
}

/// Render `minutes:seconds` for a positive remaining duration.
pub fn format_remaining(remaining_ms: i64) -> Option<String> {
    if remaining_ms <= 0 {
        return None;
    }

    let minutes = remaining_ms / 60_000;
    let seconds = (remaining_ms % 60_000) / 1_000;
    Some(format!("{minutes}:{seconds:02}"))
}

struct PollSession {
    region: RegionId,
    expires_at_ms: i64,
    phase: Arc<Mutex<CountdownPhase>>,
    handle: JoinHandle<()>,
}

pub struct CountdownTimer {
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    grace_delay: Duration,
    session: Mutex<Option<PollSession>>,
}

impl CountdownTimer {
    pub fn new(clock: Arc<dyn Clock>, tick_interval: Duration, grace_delay: Duration) -> Self {
        Self {
            clock,
            tick_interval: tick_interval.max(Duration::from_millis(1)),
            grace_delay,
            session: Mutex::new(None),
        }
    }

    /// Start counting down to `expires_at_ms`, replacing any previous session.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(
        &self,
        expires_at_ms: i64,
        region: RegionId,
        observer: Arc<dyn CountdownObserver>,
    ) {
        let mut slot = lock(&self.session);
        if let Some(previous) = slot.take() {
            debug!(region = %previous.region, "replacing countdown session");
            previous.handle.abort();
        }

        let phase = Arc::new(Mutex::new(CountdownPhase::Armed));
        let handle = tokio::spawn(run_countdown(CountdownRun {
            clock: Arc::clone(&self.clock),
            expires_at_ms,
            region: region.clone(),
            tick_interval: self.tick_interval,
            grace_delay: self.grace_delay,
            phase: Arc::clone(&phase),
            observer,
        }));

        debug!(region = %region, expires_at_ms, "countdown armed");
        *slot = Some(PollSession {
            region,
            expires_at_ms,
            phase,
            handle,
        });
    }

    /// Stop the current session. Returns `false` when nothing was armed.
    pub fn cancel(&self) -> bool {
        let Some(session) = lock(&self.session).take() else {
            return false;
        };

        session.handle.abort();
        debug!(region = %session.region, "countdown cancelled");
        true
    }

    pub fn phase(&self) -> CountdownPhase {
        lock(&self.session)
            .as_ref()
            .map(|session| *lock(&session.phase))
            .unwrap_or(CountdownPhase::Idle)
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.session).is_some()
    }

    pub fn armed_region(&self) -> Option<RegionId> {
        lock(&self.session)
            .as_ref()
            .map(|session| session.region.clone())
    }

    pub fn armed_expiry_millis(&self) -> Option<i64> {
        lock(&self.session)
            .as_ref()
            .map(|session| session.expires_at_ms)
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct CountdownRun {
    clock: Arc<dyn Clock>,
    expires_at_ms: i64,
    region: RegionId,
    tick_interval: Duration,
    grace_delay: Duration,
    phase: Arc<Mutex<CountdownPhase>>,
    observer: Arc<dyn CountdownObserver>,
}

async fn run_countdown(run: CountdownRun) {
    let mut ticker = tokio::time::interval(run.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let remaining_ms = run.expires_at_ms.saturating_sub(run.clock.now_epoch_millis());

        if let Some(text) = format_remaining(remaining_ms) {
            *lock(&run.phase) = CountdownPhase::Ticking;
            trace!(region = %run.region, remaining = %text, "countdown tick");
            run.observer.tick(&run.region, &text);
            continue;
        }

        *lock(&run.phase) = CountdownPhase::Expired;
        debug!(
            region = %run.region,
            grace_ms = run.grace_delay.as_millis() as u64,
            "instance expired; waiting before re-reconciling"
        );
        run.observer.expired(&run.region);

        tokio::time::sleep(run.grace_delay).await;
        *lock(&run.phase) = CountdownPhase::Reconciling;
        run.observer.grace_elapsed();
        return;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
