mod common;

use std::time::Duration;

use ctfd_instance::countdown::CountdownPhase;
use ctfd_instance::modal::{ModalContent, ModalControl};
use ctfd_instance::types::{ActionOutcome, ActionReply, UiState};
use ctfd_instance::view::Panel;

use common::{FakeBackend, active, empty, harness, record, rejected, settle};

fn modal(title: &str, body: &str, label: &str) -> ModalContent {
    ModalContent {
        title: title.to_string(),
        body: body.to_string(),
        confirm_label: label.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn activation_mounts_modal_and_renders_start_affordance() {
    let h = harness(FakeBackend::default());

    let state = h.controller.activate().await;

    assert_eq!(state, UiState::NoInstance);
    assert_eq!(h.presenter.mounted(), 1);
    assert_eq!(h.view.panels(), vec![Panel::StartAffordance]);
    assert_eq!(h.controller.countdown_phase(), CountdownPhase::Idle);
    assert!(h.controller.watcher_engaged());
}

#[tokio::test(start_paused = true)]
async fn start_shows_links_countdown_and_cooldown_notice() {
    let h = harness(FakeBackend::default());
    h.controller.activate().await;
    let running = record("abcdef0123456789", 300);
    h.backend.set_status(active(running.clone()));

    let outcome = h.controller.start_instance().await;
    settle().await;

    assert_eq!(outcome, ActionOutcome::Started);
    assert_eq!(h.backend.requests().len(), 1);
    assert!(!h.backend.requests()[0].stop);
    assert_eq!(
        h.view.panels(),
        vec![Panel::StartAffordance, Panel::Loading, Panel::active(&running)]
    );

    let Some(Panel::Active { links, .. }) = h.view.last_panel() else {
        panic!("expected active panel");
    };
    let addresses = links
        .iter()
        .map(|link| link.address.as_str())
        .collect::<Vec<_>>();
    assert_eq!(addresses, vec!["10.0.0.5:1337", "10.0.0.5:8080"]);

    assert_eq!(h.controller.countdown_region(), Some(running.countdown_region()));
    assert_eq!(
        h.view.countdowns().first(),
        Some(&(running.countdown_region(), "5:00".to_string()))
    );
    tokio::time::sleep(Duration::from_millis(1_001)).await;
    assert_eq!(
        h.view.countdowns().last().map(|(_, text)| text.as_str()),
        Some("4:59")
    );

    assert_eq!(
        h.presenter.presented(),
        vec![modal(
            "Attention!",
            "An instance was started for you.\nNote that you can only restart or stop an instance once per 5 minutes!",
            "Got it!",
        )]
    );

    assert!(h.controller.close_modal(ModalControl::Confirm));
    settle().await;
    let UiState::InstanceActive(shown) = h.controller.state() else {
        panic!("expected an active instance after closing the notice");
    };
    assert_eq!(shown, running);
    assert_eq!(shown.links().len(), 2);
    assert!(!h.controller.modal().is_open());
}

#[tokio::test(start_paused = true)]
async fn failed_start_shows_backend_message_and_reconciles_on_close() {
    let backend = FakeBackend::default();
    backend.set_action(Err(rejected(Some("rate limited"))));
    let h = harness(backend);
    h.controller.activate().await;

    let outcome = h.controller.start_instance().await;

    assert_eq!(outcome, ActionOutcome::Failed("rate limited".to_string()));
    assert_eq!(
        h.presenter.presented(),
        vec![modal("Error!", "rate limited", "Got it!")]
    );
    assert_eq!(h.backend.status_calls(), 1);

    assert!(h.controller.close_modal(ModalControl::Dismiss));
    settle().await;
    assert_eq!(h.backend.status_calls(), 2);

    assert!(!h.controller.close_modal(ModalControl::Confirm));
    settle().await;
    assert_eq!(h.backend.status_calls(), 2);
    assert_eq!(h.view.last_panel(), Some(Panel::StartAffordance));
}

#[tokio::test(start_paused = true)]
async fn failed_start_without_message_uses_generic_text() {
    let backend = FakeBackend::default();
    backend.set_action(Err(rejected(None)));
    let h = harness(backend);
    h.controller.activate().await;

    let outcome = h.controller.start_instance().await;

    let expected = "An unknown error occurred when starting your instance.";
    assert_eq!(outcome, ActionOutcome::Failed(expected.to_string()));
    assert_eq!(h.presenter.presented(), vec![modal("Error!", expected, "Got it!")]);
}

#[tokio::test(start_paused = true)]
async fn declined_stop_makes_no_request() {
    let h = harness(FakeBackend::default());
    h.backend.set_status(active(record("abcdef0123456789", 300)));
    h.controller.activate().await;
    h.view.answer(false);

    let outcome = h.controller.stop_instance().await;
    settle().await;

    assert_eq!(outcome, ActionOutcome::Declined);
    assert_eq!(
        h.view.prompts(),
        vec!["Are you sure you want to stop the instance for:\nPwn1".to_string()]
    );
    assert!(h.backend.requests().is_empty());
    assert_eq!(h.backend.status_calls(), 1);
    assert!(h.presenter.presented().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_confirms_then_reconciles_when_dialog_closes() {
    let h = harness(FakeBackend::default());
    h.backend.set_status(active(record("abcdef0123456789", 300)));
    h.controller.activate().await;
    h.backend.set_status(empty());
    h.backend.set_action(Ok(ActionReply {
        message: Some("stopped".to_string()),
    }));

    let outcome = h.controller.stop_instance().await;

    assert_eq!(outcome, ActionOutcome::Stopped);
    assert!(h.backend.requests()[0].stop);
    assert_eq!(
        h.presenter.presented(),
        vec![modal(
            "Attention!",
            "The instance for\nPwn1\nwas stopped successfully.",
            "Close",
        )]
    );
    assert_eq!(h.backend.status_calls(), 1);

    assert!(h.controller.close_modal(ModalControl::Confirm));
    settle().await;

    assert_eq!(h.backend.status_calls(), 2);
    assert_eq!(h.controller.state(), UiState::NoInstance);
    assert_eq!(h.view.last_panel(), Some(Panel::StartAffordance));
    assert_eq!(h.controller.countdown_phase(), CountdownPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn failed_stop_shows_error_dialog() {
    let h = harness(FakeBackend::default());
    h.controller.activate().await;
    h.backend.set_action(Err(rejected(None)));

    let outcome = h.controller.stop_instance().await;

    let expected = "An unknown error occurred while stopping the instance.";
    assert_eq!(outcome, ActionOutcome::Failed(expected.to_string()));
    assert_eq!(h.presenter.presented(), vec![modal("Error", expected, "Close")]);

    assert!(h.controller.close_modal(ModalControl::Dismiss));
    settle().await;
    assert_eq!(h.backend.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_reconcile_result_is_dropped() {
    let h = harness(FakeBackend::default());
    h.controller.activate().await;
    h.backend.queue_status(
        Duration::from_secs(2),
        Ok(active(record("abcdef0123456789", 300))),
    );
    h.backend.queue_status(Duration::ZERO, Ok(empty()));

    let slow = h.controller.clone();
    let slow = tokio::spawn(async move { slow.reconcile().await });
    settle().await;

    let fast = h.controller.reconcile().await;
    let late = slow.await.expect("slow reconcile task");

    assert_eq!(fast, UiState::NoInstance);
    assert!(matches!(late, UiState::InstanceActive(_)));
    assert_eq!(h.controller.state(), UiState::NoInstance);
    assert!(
        !h.view
            .panels()
            .iter()
            .any(|panel| matches!(panel, Panel::Active { .. }))
    );
    assert_eq!(h.controller.countdown_phase(), CountdownPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn results_after_deactivate_are_ignored() {
    let h = harness(FakeBackend::default());
    h.controller.activate().await;
    h.backend.queue_status(
        Duration::from_secs(2),
        Ok(active(record("abcdef0123456789", 300))),
    );

    let pending = h.controller.clone();
    let pending = tokio::spawn(async move { pending.reconcile().await });
    settle().await;
    h.controller.deactivate();
    h.controller.deactivate();
    pending.await.expect("pending reconcile task");

    assert!(!h.controller.is_active());
    assert!(!h.controller.watcher_engaged());
    assert_eq!(h.view.panels(), vec![Panel::StartAffordance]);
    assert_eq!(h.controller.countdown_phase(), CountdownPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn expiry_shows_expired_panel_then_reconciles_after_grace() {
    let h = harness(FakeBackend::default());
    h.backend
        .queue_status(Duration::ZERO, Ok(active(record("abcdef0123456789", 3))));
    h.controller.activate().await;

    tokio::time::sleep(Duration::from_millis(3_500)).await;

    assert_eq!(h.controller.state(), UiState::Expired);
    assert_eq!(h.view.last_panel(), Some(Panel::Expired));
    assert_eq!(h.controller.countdown_phase(), CountdownPhase::Expired);
    assert_eq!(h.backend.status_calls(), 1);
    let texts = h
        .view
        .countdowns()
        .into_iter()
        .map(|(_, text)| text)
        .collect::<Vec<_>>();
    assert_eq!(texts, vec!["0:03", "0:02", "0:01"]);

    tokio::time::sleep(Duration::from_secs(7)).await;

    assert_eq!(h.backend.status_calls(), 2);
    assert_eq!(h.controller.state(), UiState::NoInstance);
    assert_eq!(h.view.last_panel(), Some(Panel::StartAffordance));
    assert_eq!(h.controller.countdown_phase(), CountdownPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn far_past_expiry_is_treated_as_expired() {
    let h = harness(FakeBackend::default());
    let mut stale = record("abcdef0123456789", 0);
    stale.expires_at_epoch_seconds = i64::MIN;
    h.backend.queue_status(Duration::ZERO, Ok(active(stale)));
    h.controller.activate().await;

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.controller.state(), UiState::Expired);
    assert_eq!(h.view.last_panel(), Some(Panel::Expired));
    assert!(h.view.countdowns().is_empty());

    tokio::time::sleep(Duration::from_secs(7)).await;

    assert_eq!(h.backend.status_calls(), 2);
    assert_eq!(h.controller.state(), UiState::NoInstance);
}

#[tokio::test(start_paused = true)]
async fn reconcile_with_new_instance_rebinds_countdown() {
    let h = harness(FakeBackend::default());
    let first = record("aaaaaaaaaaaa", 300);
    let second = record("bbbbbbbbbbbb", 600);
    h.backend.set_status(active(first.clone()));
    h.controller.activate().await;
    settle().await;

    h.backend.set_status(active(second.clone()));
    h.controller.reconcile().await;
    settle().await;
    let rebound_at = h.view.countdowns().len();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(h.controller.countdown_region(), Some(second.countdown_region()));
    let after = &h.view.countdowns()[rebound_at - 1..];
    assert!(after.len() >= 3);
    assert!(
        after
            .iter()
            .all(|(region, _)| *region == second.countdown_region())
    );
    assert_eq!(after[0].1, "10:00");
}

#[tokio::test(start_paused = true)]
async fn solve_notification_triggers_one_reconcile() {
    let h = harness(FakeBackend::default());
    h.backend.set_status(active(record("abcdef0123456789", 3_600)));
    h.controller.activate().await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.backend.status_calls(), 1);

    h.signal.notify("Correct");
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.backend.status_calls(), 2);
    assert!(!h.controller.watcher_engaged());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.backend.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn hidden_view_stops_solve_watcher() {
    let h = harness(FakeBackend::default());
    h.controller.activate().await;

    h.signal.set_visible(false);
    tokio::time::sleep(Duration::from_secs(2)).await;
    h.signal.set_visible(true);
    h.signal.notify("Correct");
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(!h.controller.watcher_engaged());
    assert_eq!(h.backend.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn inactive_view_suppresses_modals() {
    let h = harness(FakeBackend::default());

    let outcome = h.controller.start_instance().await;

    assert_eq!(outcome, ActionOutcome::Started);
    assert!(h.presenter.presented().is_empty());
    assert!(h.view.panels().is_empty());
}
