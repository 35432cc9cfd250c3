//! Single-slot modal dialog with an exactly-once close callback.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

pub type OnClose = Box<dyn FnOnce() + Send + 'static>;

/// What a presenter needs to draw a dialog.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ModalContent {
    pub title: String,
    pub body: String,
    pub confirm_label: String,
}

pub struct ModalRequest {
    pub content: ModalContent,
    on_close: Option<OnClose>,
}

impl ModalRequest {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        confirm_label: impl Into<String>,
    ) -> Self {
        Self {
            content: ModalContent {
                title: title.into(),
                body: body.into(),
                confirm_label: confirm_label.into(),
            },
            on_close: None,
        }
    }

    pub fn on_close(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for ModalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModalRequest")
            .field("content", &self.content)
            .field("has_on_close", &self.on_close.is_some())
            .finish()
    }
}

/// The two controls a dialog offers. Both close it the same way.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ModalControl {
    Confirm,
    Dismiss,
}

pub trait ModalPresenter: Send + Sync {
    /// Make sure the surface the dialog is drawn into exists.
    fn mount(&self) {}
    fn present(&self, content: &ModalContent);
    fn hide(&self);
}

pub struct ModalNotifier {
    presenter: Arc<dyn ModalPresenter>,
    active: Mutex<Option<ModalRequest>>,
}

impl ModalNotifier {
    pub fn new(presenter: Arc<dyn ModalPresenter>) -> Self {
        Self {
            presenter,
            active: Mutex::new(None),
        }
    }

    pub fn ensure_container(&self) {
        self.presenter.mount();
    }

    /// Show `request`, discarding whatever dialog was open before.
    pub fn show(&self, request: ModalRequest) {
        let mut active = lock(&self.active);
        if let Some(previous) = active.take() {
            debug!(
                title = %previous.content.title,
                "superseding open modal without running its close callback"
            );
        }

        debug!(title = %request.content.title, "showing modal");
        self.presenter.present(&request.content);
        *active = Some(request);
    }

    /// Close the open dialog. Returns `false` when nothing was open.
    pub fn close(&self, control: ModalControl) -> bool {
        let Some(request) = lock(&self.active).take() else {
            return false;
        };

        debug!(title = %request.content.title, ?control, "closing modal");
        self.presenter.hide();
        if let Some(callback) = request.on_close {
            callback();
        }
        true
    }

    pub fn is_open(&self) -> bool {
        lock(&self.active).is_some()
    }

    pub fn current(&self) -> Option<ModalContent> {
        lock(&self.active)
            .as_ref()
            .map(|request| request.content.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
