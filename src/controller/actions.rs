//! Start/stop requests and the dialogs that follow them.

use tracing::{debug, info, warn};

use crate::modal::ModalRequest;
use crate::types::{ActionOutcome, InstanceRequest};

use super::InstanceController;

const START_FAILED_FALLBACK: &str = "An unknown error occurred when starting your instance.";
const STOP_FAILED_FALLBACK: &str = "An unknown error occurred while stopping the instance.";

impl InstanceController {
    /// Ask the backend for an instance, then show where it lives.
    pub async fn start_instance(&self) -> ActionOutcome {
        let context = &self.inner.context;
        info!(
            identifier = %context.identifier,
            task = %context.task_name,
            "starting instance"
        );
        self.show_loading();

        match self
            .inner
            .backend
            .request_instance(&InstanceRequest::start(context))
            .await
        {
            Ok(_) => {
                self.reconcile().await;
                self.notify(ModalRequest::new(
                    "Attention!",
                    started_notice(self.inner.cooldown_minutes),
                    "Got it!",
                ));
                ActionOutcome::Started
            }
            Err(err) => {
                warn!(identifier = %context.identifier, error = %err, "instance start failed");
                let message = err.user_message(START_FAILED_FALLBACK);
                self.notify(
                    ModalRequest::new("Error!", message.clone(), "Got it!")
                        .on_close(self.deferred_reconcile()),
                );
                ActionOutcome::Failed(message)
            }
        }
    }

    /// Restarting goes through the same request as starting; the backend
    /// decides what happens to a running instance.
    pub async fn restart_instance(&self) -> ActionOutcome {
        self.start_instance().await
    }

    /// Stop the instance after the user confirms.
    pub async fn stop_instance(&self) -> ActionOutcome {
        let context = &self.inner.context;
        let prompt = format!(
            "Are you sure you want to stop the instance for:\n{}",
            context.task_name
        );
        if !self.inner.view.confirm(&prompt).await {
            debug!(identifier = %context.identifier, "stop declined");
            return ActionOutcome::Declined;
        }

        info!(
            identifier = %context.identifier,
            task = %context.task_name,
            "stopping instance"
        );
        match self
            .inner
            .backend
            .request_instance(&InstanceRequest::stop(context))
            .await
        {
            Ok(_) => {
                self.notify(
                    ModalRequest::new(
                        "Attention!",
                        format!(
                            "The instance for\n{}\nwas stopped successfully.",
                            context.task_name
                        ),
                        "Close",
                    )
                    .on_close(self.deferred_reconcile()),
                );
                ActionOutcome::Stopped
            }
            Err(err) => {
                warn!(identifier = %context.identifier, error = %err, "instance stop failed");
                let message = err.user_message(STOP_FAILED_FALLBACK);
                self.notify(
                    ModalRequest::new("Error", message.clone(), "Close")
                        .on_close(self.deferred_reconcile()),
                );
                ActionOutcome::Failed(message)
            }
        }
    }
}

fn started_notice(cooldown_minutes: u64) -> String {
    let window = match cooldown_minutes {
        1 => "minute".to_string(),
        minutes => format!("{minutes} minutes"),
    };
    format!(
        "An instance was started for you.\nNote that you can only restart or stop an instance once per {window}!"
    )
}
