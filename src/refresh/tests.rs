use super::testing::*;
use super::*;
use crate::login::testing::ScriptedPrompter;
use crate::storage::DisplayMode;
use crate::tray::IndicatorStatus;
use serde_json::json;
use tokio::sync::Notify;

#[tokio::test]
async fn team_spend_cycle_renders_currency() {
    let h = harness(
        team_config(),
        Some("tok"),
        FakeTransport::replying(vec![Ok(json!({
            "teamMemberSpend": [{"email": "a@x.com", "includedSpendCents": 1234}]
        }))]),
        ScriptedPrompter::default(),
    );

    let outcome = h.orchestrator.refresh().await;

    let RefreshOutcome::Rendered(result) = outcome else {
        panic!("expected render, got {:?}", outcome);
    };
    assert_eq!(result.used, Some(1234.0));
    assert_eq!(
        result.used_path.as_deref(),
        Some("teamMemberSpend.0.includedSpendCents")
    );
    assert_eq!(h.indicator.last().text, "Cursor $12.34");
    assert_eq!(h.orchestrator.current_view().text, "Cursor $12.34");
    assert_eq!(h.orchestrator.state(), CycleState::Idle);
    assert_eq!(h.transport.tokens.lock().unwrap().as_slice(), ["tok"]);
    let requests = h.transport.requests.lock().unwrap();
    assert_eq!(requests[0].body, Some(json!({"teamId": 42})));
}

#[tokio::test]
async fn individual_plan_cycle_computes_percent() {
    let h = harness(
        UsageConfig {
            display_mode: DisplayMode::Percent,
            ..summary_config()
        },
        Some("tok"),
        FakeTransport::replying(vec![Ok(json!({
            "individualUsage": {"plan": {"limit": 5000, "breakdown": {"total": 1250}}}
        }))]),
        ScriptedPrompter::default(),
    );

    let outcome = h.orchestrator.refresh().await;

    let RefreshOutcome::Rendered(result) = outcome else {
        panic!("expected render, got {:?}", outcome);
    };
    assert_eq!(result.percent, Some(25.0));
    assert_eq!(h.indicator.last().text, "Cursor 25%");
}

#[tokio::test]
async fn forbidden_enters_auth_recovery_without_retry() {
    let h = harness(
        summary_config(),
        Some("tok"),
        FakeTransport::replying(vec![Err(FetchError::Auth(ResponseInfo::new(403, "")))]),
        ScriptedPrompter::default(),
    );

    let outcome = h.orchestrator.refresh().await;

    assert_eq!(outcome, RefreshOutcome::AuthRecovery(RecoveryChoice::Dismissed));
    assert_eq!(h.transport.calls(), 1);
    assert_eq!(h.prompter.choice_count(), 1);
    let view = h.indicator.last();
    assert_eq!(view.status, IndicatorStatus::AuthExpired);
    assert_eq!(view.text, "Cursor: token expired");
    assert_eq!(h.indicator.notifications.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn in_band_auth_failure_is_treated_as_auth_error() {
    let h = harness(
        summary_config(),
        Some("tok"),
        FakeTransport::replying(vec![Ok(json!({"error": "Unauthorized access"}))]),
        ScriptedPrompter::default(),
    );

    let outcome = h.orchestrator.refresh().await;

    assert!(matches!(outcome, RefreshOutcome::AuthRecovery(_)));
    assert_eq!(h.indicator.last().status, IndicatorStatus::AuthExpired);
}

#[tokio::test]
async fn recovery_update_token_stores_it_for_next_cycle() {
    let prompter = ScriptedPrompter::with_answers(&[Some("new-token")]);
    prompter.push_choice(Some(0));
    let h = harness(
        summary_config(),
        Some("old-token"),
        FakeTransport::replying(vec![Err(FetchError::Auth(ResponseInfo::new(401, "")))]),
        prompter,
    );

    let outcome = h.orchestrator.refresh().await;
    assert_eq!(outcome, RefreshOutcome::AuthRecovery(RecoveryChoice::UpdateToken));
    assert_eq!(h.transport.calls(), 1);
    assert_eq!(
        h.orchestrator.credentials().get().unwrap().as_deref(),
        Some("new-token")
    );

    h.orchestrator.refresh().await;
    assert_eq!(
        h.transport.tokens.lock().unwrap().as_slice(),
        ["old-token", "new-token"]
    );
}

#[tokio::test]
async fn recovery_open_settings_delegates_to_host() {
    let prompter = ScriptedPrompter::default();
    prompter.push_choice(Some(1));
    let h = harness(
        summary_config(),
        Some("tok"),
        FakeTransport::replying(vec![Err(FetchError::Auth(ResponseInfo::new(401, "")))]),
        prompter,
    );

    h.orchestrator.refresh().await;

    let opened = h.settings_ui.opened.lock().unwrap();
    assert_eq!(opened.as_slice(), [h.settings.path().to_path_buf()]);
}

#[tokio::test]
async fn request_error_renders_error_and_notifies_once() {
    let h = harness(
        summary_config(),
        Some("tok"),
        FakeTransport::replying(vec![Err(FetchError::Request(ResponseInfo::new(
            500,
            "internal",
        )))]),
        ScriptedPrompter::default(),
    );

    let outcome = h.orchestrator.refresh().await;

    let RefreshOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(message.contains("500"));
    assert_eq!(h.indicator.last().status, IndicatorStatus::Error);
    assert_eq!(h.indicator.notifications.lock().unwrap().len(), 1);
    assert_eq!(h.prompter.choice_count(), 0);
}

#[tokio::test]
async fn invalid_team_id_fails_before_network() {
    let h = harness(
        UsageConfig {
            team_id: Some("acme".to_string()),
            ..team_config()
        },
        Some("tok"),
        FakeTransport::default(),
        ScriptedPrompter::default(),
    );

    let outcome = h.orchestrator.refresh().await;

    assert!(matches!(outcome, RefreshOutcome::Failed(_)));
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn unrecognized_response_shows_no_data() {
    let h = harness(
        summary_config(),
        Some("tok"),
        FakeTransport::replying(vec![Ok(json!({"foo": {"bar": "baz"}}))]),
        ScriptedPrompter::default(),
    );

    let outcome = h.orchestrator.refresh().await;

    let RefreshOutcome::Rendered(result) = outcome else {
        panic!("expected render, got {:?}", outcome);
    };
    assert_eq!(result.used, None);
    assert_eq!(h.indicator.last().status, IndicatorStatus::NoData);
}

#[tokio::test]
async fn declined_token_prompt_skips_network() {
    let h = harness(
        summary_config(),
        None,
        FakeTransport::default(),
        ScriptedPrompter::with_answers(&[None]),
    );

    let outcome = h.orchestrator.refresh().await;

    assert_eq!(outcome, RefreshOutcome::MissingSettings);
    assert_eq!(h.transport.calls(), 0);
    assert_eq!(h.indicator.last().status, IndicatorStatus::MissingSettings);
    assert_eq!(h.orchestrator.state(), CycleState::Idle);
}

#[tokio::test]
async fn concurrent_trigger_is_dropped() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let transport = FakeTransport::gated(
        vec![Ok(json!({"spend": 100}))],
        started.clone(),
        release.clone(),
    );
    let h = harness(summary_config(), Some("tok"), transport, ScriptedPrompter::default());

    let first = tokio::spawn({
        let orchestrator = h.orchestrator.clone();
        async move { orchestrator.refresh().await }
    });
    started.notified().await;
    assert!(h.orchestrator.is_refreshing());

    assert_eq!(h.orchestrator.refresh().await, RefreshOutcome::Skipped);
    assert_eq!(h.transport.calls(), 1);

    release.notify_one();
    let first = first.await.expect("join");
    assert!(matches!(first, RefreshOutcome::Rendered(_)));
    assert!(!h.orchestrator.is_refreshing());
    assert_eq!(h.transport.calls(), 1);
}

#[tokio::test]
async fn presentation_change_rerenders_from_cache() {
    let h = harness(
        summary_config(),
        Some("tok"),
        FakeTransport::replying(vec![Ok(json!({
            "individualUsage": {"plan": {"limit": 5000, "breakdown": {"total": 1250}}}
        }))]),
        ScriptedPrompter::default(),
    );
    h.orchestrator.refresh().await;
    assert_eq!(h.indicator.last().text, "Cursor $12.50 / $50.00");

    let next = UsageConfig {
        display_mode: DisplayMode::Percent,
        ..h.orchestrator.applied_config()
    };
    let change = h.orchestrator.apply_settings(next).await;

    assert!(change.presentation && !change.request);
    assert_eq!(h.transport.calls(), 1);
    assert_eq!(h.indicator.last().text, "Cursor 25%");
}

#[tokio::test]
async fn presentation_change_without_cache_fetches() {
    let h = harness(
        summary_config(),
        Some("tok"),
        FakeTransport::replying(vec![Ok(json!({"spend": 5}))]),
        ScriptedPrompter::default(),
    );

    let next = UsageConfig {
        display_mode: DisplayMode::Percent,
        ..summary_config()
    };
    h.settings.save(&next).unwrap();
    let change = h.orchestrator.reload_settings().await.unwrap();

    assert!(change.presentation);
    assert_eq!(h.transport.calls(), 1);
}

#[tokio::test]
async fn request_change_triggers_new_fetch() {
    let h = harness(
        team_config(),
        Some("tok"),
        FakeTransport::default(),
        ScriptedPrompter::default(),
    );
    h.orchestrator.refresh().await;

    let next = UsageConfig {
        team_id: Some("43".to_string()),
        ..team_config()
    };
    h.settings.save(&next).unwrap();
    let change = h.orchestrator.reload_settings().await.unwrap();

    assert!(change.request);
    assert_eq!(h.transport.calls(), 2);
    let requests = h.transport.requests.lock().unwrap();
    assert_eq!(requests[1].body, Some(json!({"teamId": 43})));
}

#[tokio::test]
async fn failure_clears_cached_response() {
    let h = harness(
        summary_config(),
        Some("tok"),
        FakeTransport::replying(vec![
            Ok(json!({"spend": 5})),
            Err(FetchError::Request(ResponseInfo::new(502, ""))),
        ]),
        ScriptedPrompter::default(),
    );
    h.orchestrator.refresh().await;
    assert!(h.orchestrator.rerender());

    h.orchestrator.refresh().await;
    assert!(!h.orchestrator.rerender());
    assert_eq!(h.indicator.last().status, IndicatorStatus::Error);
}

#[tokio::test]
async fn zero_interval_disables_timer() {
    let h = harness(
        UsageConfig {
            refresh_interval_minutes: 0,
            ..summary_config()
        },
        Some("tok"),
        FakeTransport::default(),
        ScriptedPrompter::default(),
    );

    h.orchestrator.start().await;
    assert!(!h.orchestrator.timer_active());

    h.orchestrator.schedule(5);
    assert!(h.orchestrator.timer_active());

    h.orchestrator.schedule(-1);
    assert!(!h.orchestrator.timer_active());
}

#[tokio::test(start_paused = true)]
async fn timer_fires_refresh_each_interval() {
    let h = harness(
        UsageConfig {
            refresh_interval_minutes: 1,
            ..summary_config()
        },
        Some("tok"),
        FakeTransport::default(),
        ScriptedPrompter::default(),
    );

    h.orchestrator.start().await;
    assert_eq!(h.transport.calls(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.transport.calls(), 2);

    h.orchestrator.shutdown();
    assert!(!h.orchestrator.timer_active());
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.transport.calls(), 2);
}

#[tokio::test]
async fn interval_change_reschedules_timer() {
    let h = harness(
        UsageConfig {
            refresh_interval_minutes: 0,
            ..summary_config()
        },
        Some("tok"),
        FakeTransport::default(),
        ScriptedPrompter::default(),
    );
    h.orchestrator.start().await;
    assert!(!h.orchestrator.timer_active());

    let change = h
        .orchestrator
        .apply_settings(UsageConfig {
            refresh_interval_minutes: 10,
            ..summary_config()
        })
        .await;

    assert!(change.interval && !change.request && !change.presentation);
    assert!(h.orchestrator.timer_active());
    assert_eq!(h.transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn oversized_interval_is_clamped() {
    let h = harness(
        summary_config(),
        Some("tok"),
        FakeTransport::default(),
        ScriptedPrompter::default(),
    );

    for minutes in [i64::MAX, i64::MAX / 60, 9_999_999_999_999] {
        h.orchestrator.schedule(minutes);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.orchestrator.timer_active(), "timer died for {} min", minutes);
    }
    assert_eq!(h.transport.calls(), 0);

    tokio::time::sleep(Duration::from_secs(366 * 24 * 60 * 60)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.transport.calls(), 1);
}
