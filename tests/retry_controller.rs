mod common;

use std::time::Duration;

use common::{PageScript, ScriptedPage, controller, controller_with};
use regen_watch::controller::{BackoffSchedule, IdlePolicy, RetryState, WakeOutcome};
use regen_watch::monitor::{ChangeMonitor, MonitorAction, MutationBatch};

#[tokio::test]
async fn backoff_index_wraps_after_one_retry_per_delay() {
    for n in 1..=4u64 {
        let page = ScriptedPage::busy();
        let intervals: Vec<u64> = (1..=n).map(|i| i * 1_000).collect();
        let schedule = BackoffSchedule::from_millis(&intervals).unwrap();
        let mut controller = controller_with(&page, None, schedule, IdlePolicy::Reschedule);

        assert!(controller.start());
        for k in 1..=(2 * n as usize) {
            assert_eq!(controller.on_wake().await, WakeOutcome::Clicked);
            assert_eq!(controller.session().backoff_index(), k % n as usize);
        }
        assert_eq!(page.clicks(), 2 * n as usize);
    }
}

#[tokio::test]
async fn start_arms_exactly_one_wake_and_stop_clears_it() {
    let page = ScriptedPage::busy();
    let mut controller = controller(&page, Some(5));

    assert!(controller.pending_deadline().is_none());
    assert!(controller.start());
    assert_eq!(controller.session().state(), RetryState::Retrying);
    let pending = *controller.session().pending().unwrap();
    assert_eq!(pending.delay, Duration::from_secs(1));
    assert_eq!(pending.backoff_index, 0);

    // A second start while retrying must not re-arm or duplicate the chain.
    assert!(!controller.start());
    assert_eq!(controller.session().pending().copied(), Some(pending));

    controller.stop();
    assert_eq!(controller.session().state(), RetryState::Idle);
    assert!(controller.pending_deadline().is_none());
}

#[tokio::test]
async fn stop_is_idempotent() {
    let page = ScriptedPage::busy();
    let mut controller = controller(&page, Some(5));

    assert!(controller.start());
    assert_eq!(controller.on_wake().await, WakeOutcome::Clicked);
    controller.stop();

    let after_first = controller.session().snapshot();
    controller.stop();
    controller.stop();
    let after_more = controller.session().snapshot();

    assert_eq!(after_more.state, RetryState::Idle);
    assert_eq!(after_more.backoff_index, after_first.backoff_index);
    assert_eq!(after_more.click_count, after_first.click_count);
    assert_eq!(after_more.next_wake_in_ms, None);
}

#[tokio::test]
async fn stop_resets_backoff_but_keeps_clicks() {
    let page = ScriptedPage::busy();
    let mut controller = controller(&page, None);

    controller.start();
    controller.on_wake().await;
    controller.on_wake().await;
    assert_eq!(controller.session().backoff_index(), 2);

    controller.stop();
    assert_eq!(controller.session().backoff_index(), 0);
    assert_eq!(controller.session().click_count(), 2);

    controller.start();
    assert_eq!(controller.session().pending().unwrap().delay, Duration::from_secs(1));
}

#[tokio::test]
async fn generation_in_progress_does_not_consume_backoff() {
    let page = ScriptedPage::busy();
    page.update(|s| {
        s.error = false;
        s.error_answers = [true].into();
    });
    let mut controller = controller(&page, None);

    controller.start();
    assert_eq!(controller.on_wake().await, WakeOutcome::Clicked);
    assert_eq!(controller.session().backoff_index(), 1);

    page.update(|s| s.generating = true);
    for _ in 0..3 {
        assert_eq!(controller.on_wake().await, WakeOutcome::StillGenerating);
        assert_eq!(controller.session().backoff_index(), 1);
        assert_eq!(controller.session().click_count(), 1);
        assert_eq!(controller.session().pending().unwrap().delay, Duration::from_secs(5));
    }
    assert_eq!(page.clicks(), 1);
}

#[tokio::test]
async fn single_error_leads_to_one_click_and_one_step() {
    let page = ScriptedPage::busy();
    page.update(|s| {
        s.error = false;
        s.error_answers = [true].into();
    });
    let mut controller = controller(&page, Some(5));

    controller.start();
    assert_eq!(controller.on_wake().await, WakeOutcome::Clicked);
    assert_eq!(page.clicks(), 1);
    assert_eq!(controller.session().click_count(), 1);
    assert_eq!(controller.session().backoff_index(), 1);
    assert!(controller.session().snapshot().last_click_at.is_some());
}

#[tokio::test]
async fn cap_stops_the_cycle_before_a_third_click() {
    let page = ScriptedPage::busy();
    let mut controller = controller(&page, Some(2));

    controller.start();
    assert_eq!(controller.on_wake().await, WakeOutcome::Clicked);
    assert_eq!(controller.on_wake().await, WakeOutcome::Clicked);
    assert_eq!(controller.on_wake().await, WakeOutcome::CapReached);

    assert_eq!(page.clicks(), 2);
    assert_eq!(controller.session().state(), RetryState::Idle);
    assert!(controller.pending_deadline().is_none());

    // The cap also refuses new cycles for the rest of the session.
    assert!(!controller.start());
}

#[tokio::test]
async fn raising_the_cap_at_runtime_allows_more_clicks() {
    let page = ScriptedPage::busy();
    let mut controller = controller(&page, Some(1));

    controller.start();
    controller.on_wake().await;
    assert_eq!(controller.on_wake().await, WakeOutcome::CapReached);

    assert!(!controller.set_max_clicks(0));
    assert_eq!(controller.session().max_clicks(), Some(1));

    assert!(controller.set_max_clicks(3));
    assert!(controller.start());
    assert_eq!(controller.on_wake().await, WakeOutcome::Clicked);
    assert_eq!(page.clicks(), 2);
}

#[tokio::test]
async fn missing_control_skips_the_click_but_keeps_polling() {
    let page = ScriptedPage::new(PageScript {
        error: true,
        ..PageScript::default()
    });
    let mut controller = controller(&page, Some(5));

    controller.start();
    assert_eq!(controller.on_wake().await, WakeOutcome::ClickSkipped);
    assert_eq!(
        page.locate_calls(),
        ["marker_ancestor", "container_with_marker", "markup_scan"]
    );
    assert_eq!(controller.session().click_count(), 0);
    assert_eq!(controller.session().backoff_index(), 1);
    assert!(controller.is_retrying());
    assert!(controller.pending_deadline().is_some());
}

#[tokio::test]
async fn strategies_are_tried_in_order_until_one_matches() {
    let page = ScriptedPage::new(PageScript {
        error: true,
        buttons: vec!["container_with_marker", "markup_scan"],
        ..PageScript::default()
    });
    let mut controller = controller(&page, None);

    controller.start();
    assert_eq!(controller.on_wake().await, WakeOutcome::Clicked);
    assert_eq!(page.locate_calls(), ["marker_ancestor", "container_with_marker"]);
}

#[tokio::test]
async fn normal_output_at_wake_finishes_the_cycle() {
    let page = ScriptedPage::busy();
    let mut controller = controller(&page, None);

    controller.start();
    controller.on_wake().await;
    page.show_answer();

    assert_eq!(controller.on_wake().await, WakeOutcome::Finished);
    assert_eq!(controller.session().state(), RetryState::Idle);
    assert_eq!(controller.session().backoff_index(), 0);
    assert!(controller.pending_deadline().is_none());
}

#[tokio::test]
async fn unrecognized_page_rearms_by_default() {
    let page = ScriptedPage::new(PageScript::default());
    let mut controller = controller(&page, None);

    controller.start();
    assert_eq!(controller.on_wake().await, WakeOutcome::Unrecognized);
    assert!(controller.is_retrying());
    assert_eq!(controller.session().pending().unwrap().backoff_index, 0);
}

#[tokio::test]
async fn unrecognized_page_ends_cycle_under_halt_policy() {
    let page = ScriptedPage::new(PageScript::default());
    let mut controller =
        controller_with(&page, None, BackoffSchedule::default(), IdlePolicy::Halt);

    controller.start();
    assert_eq!(controller.on_wake().await, WakeOutcome::Unrecognized);
    assert_eq!(controller.session().state(), RetryState::Idle);
    assert!(controller.pending_deadline().is_none());
}

#[tokio::test]
async fn wake_without_pending_is_ignored() {
    let page = ScriptedPage::busy();
    let mut controller = controller(&page, None);

    assert_eq!(controller.on_wake().await, WakeOutcome::NotArmed);
    assert_eq!(page.clicks(), 0);
    assert!(page.locate_calls().is_empty());
}

#[tokio::test]
async fn broken_page_degrades_to_inaction() {
    let page = ScriptedPage::busy();
    let mut controller = controller(&page, None);
    controller.start();

    page.update(|s| s.broken = true);
    assert!(!controller.inspector().has_error_banner().await);
    assert!(!controller.inspector().is_generating().await);
    assert!(!controller.inspector().has_normal_output().await);
    assert!(controller.inspector().find_regenerate_button().await.is_none());

    assert_eq!(controller.on_wake().await, WakeOutcome::Unrecognized);
    assert_eq!(page.clicks(), 0);
}

#[tokio::test]
async fn normal_output_requires_messages_and_no_other_signal() {
    let page = ScriptedPage::new(PageScript::default());
    let controller = controller(&page, None);
    let inspector = controller.inspector();

    assert!(!inspector.has_normal_output().await);

    page.update(|s| s.messages = 1);
    assert!(inspector.has_normal_output().await);

    page.update(|s| s.generating = true);
    assert!(!inspector.has_normal_output().await);

    page.update(|s| {
        s.generating = false;
        s.error = true;
    });
    assert!(!inspector.has_normal_output().await);
}

#[tokio::test]
async fn monitor_starts_on_error_and_stops_on_answer() {
    let page = ScriptedPage::busy();
    let mut controller = controller(&page, Some(5));
    let mut monitor = ChangeMonitor::new();

    assert_eq!(
        monitor.on_mutations(&mut controller, MutationBatch::new(3)).await,
        MonitorAction::Started
    );
    assert!(controller.pending_deadline().is_some());

    // Already retrying: more error mutations change nothing.
    assert_eq!(
        monitor.on_mutations(&mut controller, MutationBatch::new(1)).await,
        MonitorAction::Nothing
    );

    page.show_answer();
    assert_eq!(
        monitor.on_mutations(&mut controller, MutationBatch::new(1)).await,
        MonitorAction::Stopped
    );
    assert!(controller.pending_deadline().is_none());

    // Idle and nothing wrong: nothing to do.
    assert_eq!(
        monitor.on_mutations(&mut controller, MutationBatch::new(1)).await,
        MonitorAction::Nothing
    );
    assert_eq!(monitor.batches(), 4);
    assert_eq!(monitor.records(), 6);
}

#[tokio::test]
async fn monitor_reports_declined_start_when_capped_out() {
    let page = ScriptedPage::busy();
    let mut controller = controller(&page, Some(1));
    let mut monitor = ChangeMonitor::new();

    controller.start();
    controller.on_wake().await;
    controller.on_wake().await;
    assert!(!controller.is_retrying());

    assert_eq!(
        monitor.on_mutations(&mut controller, MutationBatch::new(1)).await,
        MonitorAction::StartDeclined
    );
    assert_eq!(monitor.initial_check(&mut controller).await, MonitorAction::StartDeclined);
}

#[tokio::test]
async fn initial_check_only_starts_on_error() {
    let quiet = ScriptedPage::new(PageScript::default());
    let mut idle = controller(&quiet, None);
    assert_eq!(
        ChangeMonitor::new().initial_check(&mut idle).await,
        MonitorAction::Nothing
    );
    assert!(!idle.is_retrying());

    let busy = ScriptedPage::busy();
    let mut retrying = controller(&busy, None);
    assert_eq!(
        ChangeMonitor::new().initial_check(&mut retrying).await,
        MonitorAction::Started
    );
    assert!(retrying.is_retrying());
}

#[tokio::test]
async fn capped_out_banner_keeps_declining_without_arming() {
    let page = ScriptedPage::busy();
    let mut controller = controller(&page, Some(1));
    let mut monitor = ChangeMonitor::new();

    controller.start();
    controller.on_wake().await;
    assert_eq!(controller.on_wake().await, WakeOutcome::CapReached);

    for _ in 0..20 {
        assert_eq!(
            monitor.on_mutations(&mut controller, MutationBatch::new(1)).await,
            MonitorAction::StartDeclined
        );
    }
    assert!(controller.pending_deadline().is_none());
    assert_eq!(controller.schedule().len(), 3);
    assert_eq!(page.clicks(), 1);
}
