use crate::TestContext;
use crossterm::event::{
    Event,
    KeyCode,
    KeyEvent,
    KeyModifiers,
};
use hourglass_portal::{
    api::PortalError,
    client::{
        ActionOutcome,
        IMAGE_REJECTED,
        INCORRECT_PASSPHRASE,
        PortalEvent,
        SESSION_ENDED,
    },
    gateway::Precondition,
    session::PortalState,
    session_store::{
        PortalStateKind,
        StoredSession,
    },
    sketchpad::Direction,
    test_helpers::{
        ApiCall,
        FakePortalApi,
        snapshot_due_in,
        snapshot_with_pins,
    },
    ui::{
        self,
        UiState,
        UserEvent,
    },
};
use std::time::Duration;
use tokio::time::Instant;

fn is_submit(call: &ApiCall) -> bool {
    matches!(call, ApiCall::SubmitDrawing { .. })
}

fn is_unlock(call: &ApiCall) -> bool {
    matches!(call, ApiCall::Unlock { .. })
}

fn draw_a_line(ctx: &mut TestContext) {
    ctx.portal.sketch_toggle_pen();
    ctx.portal.sketch_move(Direction::Right);
    ctx.portal.sketch_move(Direction::Right);
    ctx.portal.sketch_toggle_pen();
}

fn type_passphrase(ctx: &mut TestContext, text: &str) {
    for c in text.chars() {
        ctx.portal.passphrase_push(c);
    }
}

#[tokio::test(start_paused = true)]
async fn submit__without_drawing_sends_nothing() {
    // given
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot_due_in(3600)));
    ctx.enter().await;

    // when
    let actual = ctx.portal.request_drawing_submit();
    ctx.run_for(Duration::from_millis(100)).await;

    // then
    assert_eq!(Err(Precondition::NoDrawing), actual);
    assert_eq!(0, ctx.api.count(is_submit));
    assert_eq!(
        Some("Please provide an image first".to_string()),
        ctx.latest_notice()
    );
}

#[tokio::test(start_paused = true)]
async fn submit__sends_drawing_and_shows_reply() {
    // given
    let api = FakePortalApi::with_snapshot(snapshot_due_in(3600));
    api.push_submit_result(Ok("A fine likeness of the key.".to_string()));
    let mut ctx = TestContext::new(api);
    ctx.enter().await;
    draw_a_line(&mut ctx);

    // when
    let actual = ctx.portal.request_drawing_submit();
    ctx.run_for(Duration::from_millis(100)).await;

    // then
    assert_eq!(Ok(()), actual);
    assert_eq!(1, ctx.api.count(is_submit));
    assert_eq!(
        Some("A fine likeness of the key."),
        ctx.portal.guardian().reply()
    );
    assert!(ctx.portal.guardian().can_reset());
    assert!(ctx.portal.sketchpad().is_blank());
}

#[tokio::test(start_paused = true)]
async fn submit__needs_new_drawing_after_reply() {
    // given
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot_due_in(3600)));
    ctx.enter().await;
    draw_a_line(&mut ctx);
    let _ = ctx.portal.request_drawing_submit();
    ctx.run_for(Duration::from_millis(100)).await;

    // when
    let before_reset = ctx.portal.request_drawing_submit();
    ctx.portal.new_drawing();
    draw_a_line(&mut ctx);
    let after_reset = ctx.portal.request_drawing_submit();
    ctx.run_for(Duration::from_millis(100)).await;

    // then
    assert_eq!(Err(Precondition::AwaitingReset), before_reset);
    assert_eq!(Ok(()), after_reset);
    assert_eq!(2, ctx.api.count(is_submit));
}

#[tokio::test(start_paused = true)]
async fn submit__only_one_in_flight() {
    // given
    let api = FakePortalApi::with_snapshot(snapshot_due_in(3600));
    let mut ctx = TestContext::new(api);
    ctx.enter().await;
    ctx.api.set_latency(Duration::from_secs(1));
    draw_a_line(&mut ctx);

    // when
    let first = ctx.portal.request_drawing_submit();
    let second = ctx.portal.request_drawing_submit();
    ctx.run_for(Duration::from_millis(1500)).await;

    // then
    assert_eq!(Ok(()), first);
    assert_eq!(Err(Precondition::SubmitInFlight), second);
    assert_eq!(1, ctx.api.count(is_submit));
}

#[tokio::test(start_paused = true)]
async fn submit__refused_once_both_pins_are_revealed() {
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot_with_pins(&[
        "4821", "9034",
    ])));
    ctx.enter().await;

    draw_a_line(&mut ctx);
    let actual = ctx.portal.request_drawing_submit();

    assert_eq!(Err(Precondition::StageExhausted), actual);
    assert!(ctx.portal.sketchpad().is_blank());
    assert_eq!(0, ctx.api.count(is_submit));
}

#[tokio::test(start_paused = true)]
async fn submit__rejected_image_keeps_session() {
    // given
    let api = FakePortalApi::with_snapshot(snapshot_due_in(3600));
    api.push_submit_result(Err(PortalError::Rejected {
        status: 422,
        detail: "unreadable image".to_string(),
    }));
    let mut ctx = TestContext::new(api);
    ctx.enter().await;
    draw_a_line(&mut ctx);

    // when
    let _ = ctx.portal.request_drawing_submit();
    ctx.run_for(Duration::from_millis(100)).await;

    // then
    assert!(ctx.is_main());
    assert_eq!(Some(IMAGE_REJECTED.to_string()), ctx.latest_notice());
    assert!(!ctx.portal.guardian().in_flight());
    assert!(!ctx.portal.guardian().has_staged_image());
}

#[tokio::test(start_paused = true)]
async fn submit__auth_failure_forces_welcome() {
    let api = FakePortalApi::with_snapshot(snapshot_due_in(3600));
    api.push_submit_result(Err(PortalError::Unauthorized { status: 401 }));
    let mut ctx = TestContext::new(api);
    ctx.enter().await;
    draw_a_line(&mut ctx);

    let _ = ctx.portal.request_drawing_submit();
    ctx.run_for(Duration::from_millis(100)).await;

    assert_eq!(&PortalState::Welcome, ctx.portal.state());
    assert!(!ctx.portal.is_polling());
    assert_eq!(Some(SESSION_ENDED.to_string()), ctx.latest_notice());
}

#[tokio::test(start_paused = true)]
async fn unlock__already_complete_skips_the_request() {
    // given
    let mut snapshot = snapshot_with_pins(&["4821", "9034"]);
    snapshot.complete = true;
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot));
    ctx.enter().await;

    // when
    ctx.portal.request_unlock();
    ctx.run_for(Duration::from_millis(100)).await;

    // then
    assert_eq!(&PortalState::Completed, ctx.portal.state());
    assert_eq!(0, ctx.api.count(is_unlock));
    assert!(!ctx.portal.is_polling());
    assert_eq!(
        Some(StoredSession::new(PortalStateKind::Completed, "")),
        ctx.store.current()
    );
}

#[tokio::test(start_paused = true)]
async fn unlock__enter_key_on_finished_game_reaches_completed() {
    // given
    let mut snapshot = snapshot_with_pins(&["4821", "9034"]);
    snapshot.complete = true;
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot));
    ctx.enter().await;
    let mut ui_state = UiState::default();

    // when
    let event = ui::interpret_event(
        &mut ui_state,
        &ctx.portal.view(Instant::now()),
        Event::Key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)),
    );
    if event == Some(UserEvent::Unlock) {
        ctx.portal.request_unlock();
    }
    ctx.run_for(Duration::from_millis(100)).await;

    // then
    assert_eq!(Some(UserEvent::Unlock), event);
    assert_eq!(&PortalState::Completed, ctx.portal.state());
    assert_eq!(0, ctx.api.count(is_unlock));
}

#[tokio::test(start_paused = true)]
async fn unlock__result_from_an_ended_session_is_dropped() {
    // given
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot_with_pins(&[
        "4821", "9034",
    ])));
    ctx.enter().await;
    let first_epoch = ctx.portal.session_epoch();
    ctx.api.revoke("token-1");
    ctx.run_for(Duration::from_secs(3)).await;
    assert_eq!(&PortalState::Welcome, ctx.portal.state());
    ctx.enter().await;

    // when
    ctx.portal.apply(PortalEvent::Action {
        epoch: first_epoch,
        outcome: ActionOutcome::Unlocked(Ok(())),
    });
    ctx.run_for(Duration::from_millis(100)).await;

    // then
    assert_eq!(Some("token-2".to_string()), ctx.token());
    assert_eq!(
        Some(StoredSession::new(PortalStateKind::Main, "token-2")),
        ctx.store.current()
    );
    assert!(ctx.portal.is_polling());
}

#[tokio::test(start_paused = true)]
async fn unlock__correct_passphrase_completes() {
    // given
    let mut ctx = TestContext::new(FakePortalApi::with_snapshot(snapshot_with_pins(&[
        "4821", "9034",
    ])));
    ctx.enter().await;
    type_passphrase(&mut ctx, "sands");

    // when
    ctx.portal.request_unlock();
    ctx.run_for(Duration::from_millis(100)).await;

    // then
    assert_eq!(&PortalState::Completed, ctx.portal.state());
    assert_eq!(
        1,
        ctx.api.count(|call| *call
            == ApiCall::Unlock {
                token: "token-1".to_string(),
                passphrase: "SANDS".to_string(),
            })
    );
    assert_eq!(None, ctx.token());
    assert_eq!("", ctx.portal.gate().input());
}

#[tokio::test(start_paused = true)]
async fn unlock__wrong_passphrase_clears_input() {
    // given
    let api = FakePortalApi::with_snapshot(snapshot_with_pins(&["4821", "9034"]));
    api.push_unlock_result(Err(PortalError::Rejected {
        status: 400,
        detail: "wrong passphrase".to_string(),
    }));
    let mut ctx = TestContext::new(api);
    ctx.enter().await;
    type_passphrase(&mut ctx, "dust");

    // when
    ctx.portal.request_unlock();
    ctx.run_for(Duration::from_millis(100)).await;

    // then
    assert!(ctx.is_main());
    assert_eq!(Some(INCORRECT_PASSPHRASE.to_string()), ctx.latest_notice());
    assert_eq!("", ctx.portal.gate().input());
    assert!(!ctx.portal.gate().in_flight());
}

#[tokio::test(start_paused = true)]
async fn unlock__auth_failure_forces_welcome() {
    let api = FakePortalApi::with_snapshot(snapshot_with_pins(&["4821", "9034"]));
    api.push_unlock_result(Err(PortalError::Unauthorized { status: 403 }));
    let mut ctx = TestContext::new(api);
    ctx.enter().await;
    type_passphrase(&mut ctx, "sands");

    ctx.portal.request_unlock();
    ctx.run_for(Duration::from_millis(100)).await;

    assert_eq!(&PortalState::Welcome, ctx.portal.state());
    assert_eq!(None, ctx.token());
}

#[tokio::test(start_paused = true)]
async fn unlock__without_session_does_nothing() {
    let mut ctx = TestContext::new(FakePortalApi::new());

    ctx.portal.request_unlock();
    ctx.run_for(Duration::from_millis(100)).await;

    assert_eq!(&PortalState::Welcome, ctx.portal.state());
    assert!(ctx.api.calls().is_empty());
}
