use crate::TestContext;
use hourglass_portal::{
    api::PortalError,
    client::{
        PortalEvent,
        SESSION_ENDED,
    },
    countdown::ZERO_DISPLAY,
    poller::PollEvent,
    session::PortalState,
    session_store::{
        PortalStateKind,
        StoredSession,
    },
    test_helpers::{
        FakePortalApi,
        snapshot_due_in,
    },
};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn poll__fetches_once_per_interval() {
    // given
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot_due_in(3600)));
    ctx.enter().await;

    // when
    ctx.run_for(Duration::from_secs(9)).await;

    // then
    assert_eq!(5, ctx.api.fetch_count());
    assert!(ctx.portal.is_polling());
}

#[tokio::test(start_paused = true)]
async fn poll__replaces_snapshot_wholesale() {
    // given
    let mut first = snapshot_due_in(3600);
    first.hints = vec!["look under the stairs".to_string()];
    let api = FakePortalApi::with_snapshot(first);
    let mut ctx = TestContext::new(api);
    ctx.enter().await;

    // when
    let second = snapshot_due_in(1800);
    ctx.api.set_snapshot(second.clone());
    ctx.run_for(Duration::from_secs(3)).await;

    // then
    assert_eq!(Some(&second), ctx.portal.snapshot());
}

#[tokio::test(start_paused = true)]
async fn poll__403_forces_welcome_and_stops_everything() {
    // given
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot_due_in(3600)));
    ctx.enter().await;
    ctx.api.revoke("token-1");

    // when
    ctx.run_for(Duration::from_secs(3)).await;

    // then
    assert_eq!(&PortalState::Welcome, ctx.portal.state());
    assert_eq!(None, ctx.token());
    assert!(!ctx.portal.is_polling());
    assert!(!ctx.portal.countdown_running());
    assert_eq!(None, ctx.portal.snapshot());
    assert_eq!(ZERO_DISPLAY, ctx.portal.countdown_display());
    assert_eq!(
        Some(StoredSession::new(PortalStateKind::Welcome, "")),
        ctx.store.current()
    );
    assert_eq!(Some(SESSION_ENDED.to_string()), ctx.latest_notice());

    // and no further polling happens
    let fetches = ctx.api.fetch_count();
    ctx.run_for(Duration::from_secs(10)).await;
    assert_eq!(fetches, ctx.api.fetch_count());
}

#[tokio::test(start_paused = true)]
async fn poll__transport_error_keeps_session_and_retries() {
    // given
    let api = FakePortalApi::with_snapshot(snapshot_due_in(3600));
    api.push_fetch_result(Err(PortalError::Transport("timed out".to_string())));
    let mut ctx = TestContext::new(api);

    // when
    ctx.enter().await;
    let after_failure = ctx.portal.snapshot().cloned();
    ctx.run_for(Duration::from_secs(3)).await;

    // then
    assert_eq!(None, after_failure);
    assert!(ctx.is_main());
    assert!(ctx.portal.snapshot().is_some());
    assert_eq!(2, ctx.api.fetch_count());
}

#[tokio::test(start_paused = true)]
async fn reentry__uses_only_the_new_token_and_one_poller() {
    // given
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot_due_in(3600)));
    ctx.enter().await;
    ctx.api.revoke("token-1");
    ctx.run_for(Duration::from_secs(3)).await;
    assert_eq!(&PortalState::Welcome, ctx.portal.state());

    // when
    let calls_before = ctx.api.calls().len();
    ctx.enter().await;
    ctx.run_for(Duration::from_secs(9)).await;

    // then
    let tokens = ctx.api.tokens_after(calls_before);
    assert_eq!(5, tokens.len());
    assert!(tokens.iter().all(|t| t == "token-2"));
}

#[tokio::test(start_paused = true)]
async fn reentry__snapshot_from_previous_activation_is_dropped() {
    // given
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot_due_in(3600)));
    ctx.enter().await;
    let old_generation = ctx.portal.poll_generation();
    ctx.api.revoke("token-1");
    ctx.run_for(Duration::from_secs(3)).await;
    ctx.enter().await;
    let current = ctx.portal.snapshot().cloned();

    // when
    let mut stale = snapshot_due_in(60);
    stale.hints = vec!["from the old session".to_string()];
    ctx.portal.apply(PortalEvent::Poll(PollEvent::Snapshot {
        generation: old_generation,
        snapshot: stale,
    }));

    // then
    assert!(ctx.is_main());
    assert_eq!(current.as_ref(), ctx.portal.snapshot());
}

#[tokio::test(start_paused = true)]
async fn poll__last_applied_snapshot_wins() {
    // given
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot_due_in(3600)));
    ctx.enter().await;
    let generation = ctx.portal.poll_generation();
    let mut newer = snapshot_due_in(1800);
    newer.hints = vec!["newer".to_string()];
    let mut older = snapshot_due_in(2400);
    older.hints = vec!["older".to_string()];

    // when
    ctx.portal.apply(PortalEvent::Poll(PollEvent::Snapshot {
        generation,
        snapshot: newer,
    }));
    ctx.portal.apply(PortalEvent::Poll(PollEvent::Snapshot {
        generation,
        snapshot: older.clone(),
    }));

    // then
    assert_eq!(Some(&older), ctx.portal.snapshot());
}

#[tokio::test(start_paused = true)]
async fn poll__auth_failure_after_stale_snapshot_still_forces_welcome() {
    // given
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot_due_in(3600)));
    ctx.enter().await;
    let old_generation = ctx.portal.poll_generation();
    ctx.api.revoke("token-1");
    ctx.run_for(Duration::from_secs(3)).await;
    ctx.enter().await;
    let generation = ctx.portal.poll_generation();

    // when
    ctx.portal.apply(PortalEvent::Poll(PollEvent::Snapshot {
        generation: old_generation,
        snapshot: snapshot_due_in(60),
    }));
    ctx.portal.apply(PortalEvent::Poll(PollEvent::AuthFailed {
        generation,
        error: PortalError::Unauthorized { status: 401 },
    }));

    // then
    assert_eq!(&PortalState::Welcome, ctx.portal.state());
    assert_eq!(None, ctx.portal.snapshot());
    assert!(!ctx.portal.is_polling());
    assert_eq!(
        Some(StoredSession::new(PortalStateKind::Welcome, "")),
        ctx.store.current()
    );
}

#[tokio::test(start_paused = true)]
async fn hints__new_hints_raise_a_notice() {
    // given
    let mut first = snapshot_due_in(3600);
    first.hints = vec!["one".to_string()];
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(first.clone()));
    ctx.enter().await;
    let on_entry = ctx.latest_notice();

    // when
    let mut second = first;
    second.hints.push("two".to_string());
    second.hints.push("three".to_string());
    ctx.api.set_snapshot(second);
    ctx.run_for(Duration::from_secs(3)).await;

    // then
    assert_eq!(Some("New hint available!".to_string()), on_entry);
    assert_eq!(Some("New hints available!".to_string()), ctx.latest_notice());
}
