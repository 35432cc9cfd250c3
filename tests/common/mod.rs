#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ctfd_instance::backend::{BackendError, InstanceBackend};
use ctfd_instance::clock::Clock;
use ctfd_instance::controller::{ControllerConfig, ControllerDeps, InstanceController};
use ctfd_instance::modal::{ModalContent, ModalPresenter};
use ctfd_instance::types::{
    ActionReply, InstanceRecord, InstanceRequest, RegionId, StatusReport, TaskContext,
};
use ctfd_instance::view::{InstanceView, Panel};
use ctfd_instance::watcher::SolveSignalSource;

pub const ANCHOR_MS: i64 = 1_700_000_000_000;
pub const ANCHOR_SECS: i64 = ANCHOR_MS / 1000;

pub fn context() -> TaskContext {
    TaskContext::new("img-x", "Pwn1")
}

pub fn record(instance_id: &str, expires_in_secs: i64) -> InstanceRecord {
    InstanceRecord {
        identifier: "img-x".to_string(),
        instance_id: instance_id.to_string(),
        host: "10.0.0.5".to_string(),
        ports: vec!["1337/tcp".to_string(), "8080/tcp".to_string()],
        expires_at_epoch_seconds: ANCHOR_SECS + expires_in_secs,
    }
}

pub fn active(record: InstanceRecord) -> StatusReport {
    StatusReport {
        success: true,
        records: vec![record],
    }
}

pub fn empty() -> StatusReport {
    StatusReport {
        success: true,
        records: Vec::new(),
    }
}

pub fn rejected(message: Option<&str>) -> BackendError {
    BackendError::Rejected {
        status: Some(403),
        message: message.map(str::to_string),
    }
}

/// Scripted backend. Queued status answers are used first, then the
/// standing answer.
pub struct FakeBackend {
    queued: Mutex<VecDeque<(Duration, Result<StatusReport, BackendError>)>>,
    standing: Mutex<Result<StatusReport, BackendError>>,
    action: Mutex<Result<ActionReply, BackendError>>,
    status_calls: AtomicUsize,
    requests: Mutex<Vec<InstanceRequest>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            standing: Mutex::new(Ok(empty())),
            action: Mutex::new(Ok(ActionReply::default())),
            status_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBackend {
    pub fn set_status(&self, report: StatusReport) {
        *self.standing.lock().expect("standing lock") = Ok(report);
    }

    pub fn queue_status(&self, delay: Duration, report: Result<StatusReport, BackendError>) {
        self.queued
            .lock()
            .expect("queued lock")
            .push_back((delay, report));
    }

    pub fn set_action(&self, result: Result<ActionReply, BackendError>) {
        *self.action.lock().expect("action lock") = result;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<InstanceRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl InstanceBackend for FakeBackend {
    async fn fetch_status(&self) -> Result<StatusReport, BackendError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.queued.lock().expect("queued lock").pop_front();
        let (delay, result) = match queued {
            Some(entry) => entry,
            None => (
                Duration::ZERO,
                self.standing.lock().expect("standing lock").clone(),
            ),
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn request_instance(
        &self,
        request: &InstanceRequest,
    ) -> Result<ActionReply, BackendError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.action.lock().expect("action lock").clone()
    }
}

pub struct RecordingView {
    panels: Mutex<Vec<Panel>>,
    countdowns: Mutex<Vec<(RegionId, String)>>,
    prompts: Mutex<Vec<String>>,
    answer: AtomicBool,
}

impl Default for RecordingView {
    fn default() -> Self {
        Self {
            panels: Mutex::new(Vec::new()),
            countdowns: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            answer: AtomicBool::new(true),
        }
    }
}

impl RecordingView {
    pub fn answer(&self, yes: bool) {
        self.answer.store(yes, Ordering::SeqCst);
    }

    pub fn panels(&self) -> Vec<Panel> {
        self.panels.lock().expect("panels lock").clone()
    }

    pub fn last_panel(&self) -> Option<Panel> {
        self.panels().last().cloned()
    }

    pub fn countdowns(&self) -> Vec<(RegionId, String)> {
        self.countdowns.lock().expect("countdowns lock").clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl InstanceView for RecordingView {
    fn render(&self, panel: &Panel) {
        self.panels.lock().expect("panels lock").push(panel.clone());
    }

    fn render_countdown(&self, region: &RegionId, remaining: &str) {
        self.countdowns
            .lock()
            .expect("countdowns lock")
            .push((region.clone(), remaining.to_string()));
    }

    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        self.answer.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    mounted: AtomicUsize,
    presented: Mutex<Vec<ModalContent>>,
    hidden: AtomicUsize,
}

impl RecordingPresenter {
    pub fn mounted(&self) -> usize {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn presented(&self) -> Vec<ModalContent> {
        self.presented.lock().expect("presented lock").clone()
    }

    pub fn hidden(&self) -> usize {
        self.hidden.load(Ordering::SeqCst)
    }
}

impl ModalPresenter for RecordingPresenter {
    fn mount(&self) {
        self.mounted.fetch_add(1, Ordering::SeqCst);
    }

    fn present(&self, content: &ModalContent) {
        self.presented
            .lock()
            .expect("presented lock")
            .push(content.clone());
    }

    fn hide(&self) {
        self.hidden.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeSignal {
    visible: AtomicBool,
    notification: Mutex<Option<String>>,
}

impl Default for FakeSignal {
    fn default() -> Self {
        Self {
            visible: AtomicBool::new(true),
            notification: Mutex::new(None),
        }
    }
}

impl FakeSignal {
    pub fn notify(&self, message: &str) {
        *self.notification.lock().expect("notification lock") = Some(message.to_string());
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }
}

impl SolveSignalSource for FakeSignal {
    fn view_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn latest_notification(&self) -> Option<String> {
        self.notification.lock().expect("notification lock").clone()
    }
}

/// Wall clock that advances with tokio's (paused) clock.
pub struct PausedClock {
    started: tokio::time::Instant,
}

impl PausedClock {
    pub fn new() -> Self {
        Self {
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for PausedClock {
    fn now_epoch_millis(&self) -> i64 {
        ANCHOR_MS + self.started.elapsed().as_millis() as i64
    }
}

pub struct Harness {
    pub controller: InstanceController,
    pub backend: Arc<FakeBackend>,
    pub view: Arc<RecordingView>,
    pub presenter: Arc<RecordingPresenter>,
    pub signal: Arc<FakeSignal>,
}

pub fn harness(backend: FakeBackend) -> Harness {
    let backend = Arc::new(backend);
    let view = Arc::new(RecordingView::default());
    let presenter = Arc::new(RecordingPresenter::default());
    let signal = Arc::new(FakeSignal::default());

    let controller = InstanceController::new(
        context(),
        ControllerDeps {
            backend: backend.clone(),
            view: view.clone(),
            modal: presenter.clone(),
            solve_signal: signal.clone(),
            clock: Arc::new(PausedClock::new()),
        },
        ControllerConfig::default(),
    );

    Harness {
        controller,
        backend,
        view,
        presenter,
        signal,
    }
}

/// Let spawned tasks run without moving the paused clock.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("buffer lock")).to_string()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
