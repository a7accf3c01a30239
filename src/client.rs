use crate::{
    api::{
        ApiResult,
        GameSnapshot,
        PortalApi,
        PortalError,
        SessionToken,
        StageProgress,
    },
    config::AppConfig,
    countdown::{
        Countdown,
        CountdownTicker,
        ZERO_DISPLAY,
    },
    gateway::{
        Guardian,
        PassphraseGate,
        Precondition,
    },
    hints::{
        HintTracker,
        new_hint_notice,
    },
    notices::{
        Notice,
        Notices,
    },
    poller::{
        PollEvent,
        PollingSynchronizer,
    },
    portal_client::PortalClient,
    session::{
        PortalState,
        SessionController,
    },
    session_store::{
        FileSessionStore,
        SessionStore,
    },
    sketchpad::{
        Direction,
        Sketchpad,
    },
    ui,
};
use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use rand::{
    SeedableRng,
    rngs::StdRng,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinSet,
    time::Instant,
};
use tracing::{
    debug,
    info,
    warn,
};

pub const SESSION_ENDED: &str = "Your session has ended";
pub const ENTER_FAILED: &str = "Failed to enter the realm";
pub const CONNECTION_ERROR: &str = "Connection error";
pub const INCORRECT_PASSPHRASE: &str = "Incorrect passphrase";
pub const IMAGE_REJECTED: &str = "Failed to process image";
pub const IMAGE_SUBMIT_ERROR: &str = "Error submitting image";
pub const BACKEND_UNREACHABLE: &str = "Portal backend is not reachable";

/// Startup health check gives up after this long and counts as unreachable.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug)]
pub struct PortalSettings {
    pub poll_interval: Duration,
    pub jitter_secs: u32,
}

impl From<&AppConfig> for PortalSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            jitter_secs: config.jitter_secs,
        }
    }
}

#[derive(Debug)]
pub enum ActionOutcome {
    Entered(ApiResult<SessionToken>),
    Unlocked(ApiResult<()>),
    DrawingJudged(ApiResult<String>),
}

#[derive(Debug)]
pub enum PortalEvent {
    Poll(PollEvent),
    /// Result of a user action, tagged with the session epoch it was issued in
    Action {
        epoch: u64,
        outcome: ActionOutcome,
    },
    CountdownTick,
}

/// Everything the screens need for one frame.
pub struct PortalView<'a> {
    pub state: &'a PortalState,
    pub snapshot: Option<&'a GameSnapshot>,
    pub countdown: &'a str,
    pub entering: bool,
    pub guardian: &'a Guardian,
    pub sketchpad: &'a Sketchpad,
    pub gate: &'a PassphraseGate,
    pub notices: Vec<&'a Notice>,
}

impl PortalView<'_> {
    pub fn progress(&self) -> StageProgress {
        self.snapshot.map(|s| s.progress.clone()).unwrap_or_default()
    }

    pub fn gate_visible(&self) -> bool {
        PassphraseGate::is_visible(self.snapshot)
    }

    pub fn gate_unlocked(&self) -> bool {
        PassphraseGate::is_unlocked(self.snapshot)
    }
}

/// One visitor's portal. Owns the session and every timer hanging off it.
///
/// Network calls never run inline: polls come from the synchronizer's worker
/// and user actions are spawned into `actions`. Both report back through
/// `next_event`, and `apply` folds them in one at a time.
pub struct Portal<A, S> {
    api: Arc<A>,
    session: SessionController<S>,
    poller: PollingSynchronizer<A>,
    poll_rx: mpsc::UnboundedReceiver<PollEvent>,
    actions: JoinSet<(u64, ActionOutcome)>,
    countdown: Countdown,
    ticker: CountdownTicker,
    countdown_display: String,
    snapshot: Option<GameSnapshot>,
    hints: HintTracker,
    guardian: Guardian,
    sketchpad: Sketchpad,
    gate: PassphraseGate,
    notices: Notices,
    entering: bool,
    rng: StdRng,
}

impl<A: PortalApi, S: SessionStore> Portal<A, S> {
    /// Restores the saved session. A restored `main` resumes polling at once.
    pub fn new(api: Arc<A>, store: S, settings: PortalSettings) -> Self {
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        let poller = PollingSynchronizer::new(api.clone(), settings.poll_interval, poll_tx);
        let mut portal = Self {
            api,
            session: SessionController::restore(store),
            poller,
            poll_rx,
            actions: JoinSet::new(),
            countdown: Countdown::new(settings.jitter_secs),
            ticker: CountdownTicker::new(),
            countdown_display: ZERO_DISPLAY.to_string(),
            snapshot: None,
            hints: HintTracker::default(),
            guardian: Guardian::default(),
            sketchpad: Sketchpad::default(),
            gate: PassphraseGate::default(),
            notices: Notices::default(),
            entering: false,
            rng: StdRng::from_os_rng(),
        };
        portal.sync_activity();
        portal
    }

    // -------------------------------------------------------------------------
    // accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> &PortalState {
        self.session.state()
    }

    pub fn current_token(&self) -> Option<SessionToken> {
        self.session.current_token()
    }

    pub fn snapshot(&self) -> Option<&GameSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn countdown_display(&self) -> &str {
        &self.countdown_display
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    pub fn poll_generation(&self) -> u64 {
        self.poller.generation()
    }

    pub fn session_epoch(&self) -> u64 {
        self.session.epoch()
    }

    pub fn countdown_running(&self) -> bool {
        self.ticker.is_running()
    }

    pub fn guardian(&self) -> &Guardian {
        &self.guardian
    }

    pub fn sketchpad(&self) -> &Sketchpad {
        &self.sketchpad
    }

    pub fn gate(&self) -> &PassphraseGate {
        &self.gate
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn view(&self, now: Instant) -> PortalView<'_> {
        PortalView {
            state: self.session.state(),
            snapshot: self.snapshot.as_ref(),
            countdown: &self.countdown_display,
            entering: self.entering,
            guardian: &self.guardian,
            sketchpad: &self.sketchpad,
            gate: &self.gate,
            notices: self.notices.visible(now).collect(),
        }
    }

    // -------------------------------------------------------------------------
    // user actions
    // -------------------------------------------------------------------------

    pub async fn check_health(&mut self) {
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, self.api.health()).await {
            Ok(Ok(())) => info!("portal backend is healthy"),
            Ok(Err(err)) => {
                warn!(%err, "portal backend health check failed");
                self.notices.warning(BACKEND_UNREACHABLE);
            }
            Err(_) => {
                warn!(timeout = ?HEALTH_CHECK_TIMEOUT, "portal backend health check timed out");
                self.notices.warning(BACKEND_UNREACHABLE);
            }
        }
    }

    pub fn request_enter(&mut self) {
        if !matches!(self.session.state(), PortalState::Welcome) || self.entering {
            debug!(state = %self.session.kind(), entering = self.entering, "enter ignored");
            return;
        }
        self.entering = true;
        let api = self.api.clone();
        self.spawn_action(async move { ActionOutcome::Entered(api.enter().await) });
    }

    pub fn request_unlock(&mut self) {
        let Some(token) = self.session.current_token() else {
            return;
        };
        if self.snapshot.as_ref().is_some_and(|s| s.complete) {
            info!("game already complete; unlocking without a request");
            self.gate.finish_attempt();
            self.complete_session();
            return;
        }
        let passphrase = match self.gate.begin_attempt() {
            Ok(passphrase) => passphrase,
            Err(precondition) => {
                debug!(%precondition, "unlock ignored");
                return;
            }
        };
        let api = self.api.clone();
        self.spawn_action(async move {
            ActionOutcome::Unlocked(api.unlock(&token, &passphrase).await)
        });
    }

    pub fn request_drawing_submit(&mut self) -> std::result::Result<(), Precondition> {
        let outcome = self.try_submit_drawing();
        if let Err(precondition) = outcome {
            self.notices.error(precondition.to_string());
        }
        outcome
    }

    fn try_submit_drawing(&mut self) -> std::result::Result<(), Precondition> {
        let token = self
            .session
            .current_token()
            .ok_or(Precondition::NoSession)?;
        let progress = self
            .snapshot
            .as_ref()
            .map(|s| s.progress.clone())
            .unwrap_or_default();
        let image = self.guardian.take_for_submit(&progress)?;
        let api = self.api.clone();
        self.spawn_action(async move {
            ActionOutcome::DrawingJudged(api.submit_drawing(&token, &image).await)
        });
        Ok(())
    }

    /// Forgets the session wherever it stands, persisted record included.
    pub fn reset_session(&mut self) {
        self.session.reset();
        self.sync_activity();
    }

    pub fn exit_to_welcome(&mut self) {
        match self.session.exit_to_welcome() {
            Ok(_) => self.sync_activity(),
            Err(err) => debug!(%err, "exit ignored"),
        }
    }

    pub fn passphrase_push(&mut self, c: char) {
        if !self.gate.in_flight() {
            self.gate.push_char(c);
        }
    }

    pub fn passphrase_pop(&mut self) {
        if !self.gate.in_flight() {
            self.gate.pop_char();
        }
    }

    pub fn sketch_move(&mut self, direction: Direction) {
        if self.sketch_enabled() {
            self.sketchpad.move_cursor(direction);
        }
    }

    pub fn sketch_toggle_pen(&mut self) {
        if !self.sketch_enabled() {
            return;
        }
        match self.sketchpad.toggle_pen() {
            Ok(Some(image)) => self.guardian.stage(image),
            Ok(None) => {}
            Err(err) => {
                warn!(?err, "failed to render drawing");
                self.notices.error(IMAGE_SUBMIT_ERROR);
            }
        }
    }

    pub fn sketch_clear(&mut self) {
        if self.sketch_enabled() {
            self.sketchpad.clear();
            self.guardian.discard_image();
        }
    }

    /// "New Drawing" after the guardian answered.
    pub fn new_drawing(&mut self) {
        if self.guardian.can_reset() {
            self.guardian.reset();
            self.sketchpad.clear();
        }
    }

    fn sketch_enabled(&self) -> bool {
        let progress = self
            .snapshot
            .as_ref()
            .map(|s| s.progress.clone())
            .unwrap_or_default();
        self.session.state().is_main() && self.guardian.accepts_input(&progress)
    }

    // -------------------------------------------------------------------------
    // event loop plumbing
    // -------------------------------------------------------------------------

    /// Waits for the next poll result, action result or countdown tick.
    pub async fn next_event(&mut self) -> PortalEvent {
        loop {
            tokio::select! {
                Some(event) = self.poll_rx.recv() => return PortalEvent::Poll(event),
                Some(joined) = self.actions.join_next(), if !self.actions.is_empty() => {
                    match joined {
                        Ok((epoch, outcome)) => return PortalEvent::Action { epoch, outcome },
                        Err(err) if err.is_cancelled() => continue,
                        Err(err) => warn!(?err, "portal action task failed"),
                    }
                }
                _ = self.ticker.tick() => return PortalEvent::CountdownTick,
            }
        }
    }

    pub fn apply(&mut self, event: PortalEvent) {
        match event {
            PortalEvent::CountdownTick => self.refresh_countdown(),
            PortalEvent::Poll(PollEvent::Snapshot {
                generation,
                snapshot,
            }) => {
                if !self.poller.is_current(generation) || !self.session.state().is_main() {
                    debug!(generation, "dropping snapshot from a stopped poller");
                    return;
                }
                self.accept_snapshot(snapshot);
            }
            PortalEvent::Poll(PollEvent::AuthFailed { generation, error }) => {
                if !self.poller.is_current(generation) {
                    debug!(generation, %error, "dropping auth failure from a stopped poller");
                    return;
                }
                self.force_welcome();
            }
            PortalEvent::Action { epoch, outcome } => {
                if let ActionOutcome::Entered(_) = outcome {
                    self.entering = false;
                }
                if epoch != self.session.epoch() {
                    debug!(epoch, current = self.session.epoch(), "dropping stale action result");
                    return;
                }
                self.apply_outcome(outcome);
            }
        }
    }

    fn apply_outcome(&mut self, outcome: ActionOutcome) {
        match outcome {
            ActionOutcome::Entered(Ok(token)) => match self.session.enter(token) {
                Ok(_) => self.sync_activity(),
                Err(err) => warn!(%err, "enter result arrived in the wrong state"),
            },
            ActionOutcome::Entered(Err(err)) => {
                warn!(%err, "enter failed");
                let text = match err {
                    PortalError::Transport(_) => CONNECTION_ERROR,
                    _ => ENTER_FAILED,
                };
                self.notices.error(text);
            }
            ActionOutcome::Unlocked(Ok(())) => {
                self.gate.finish_attempt();
                self.complete_session();
            }
            ActionOutcome::Unlocked(Err(err)) => {
                self.gate.finish_attempt();
                if err.is_auth_failure() {
                    self.force_welcome();
                    return;
                }
                let text = match err {
                    PortalError::Rejected { .. } => INCORRECT_PASSPHRASE,
                    _ => CONNECTION_ERROR,
                };
                self.notices.error(text);
            }
            ActionOutcome::DrawingJudged(Ok(reply)) => {
                self.guardian.on_reply(reply);
                self.sketchpad.clear();
            }
            ActionOutcome::DrawingJudged(Err(err)) => {
                self.guardian.on_failure();
                self.sketchpad.clear();
                if err.is_auth_failure() {
                    self.force_welcome();
                    return;
                }
                let text = match err {
                    PortalError::Rejected { .. } => IMAGE_REJECTED,
                    _ => IMAGE_SUBMIT_ERROR,
                };
                self.notices.error(text);
            }
        }
    }

    fn accept_snapshot(&mut self, snapshot: GameSnapshot) {
        let fresh = self.hints.observe(&snapshot.hints);
        if let Some(text) = new_hint_notice(fresh) {
            self.notices.info(text);
        }
        self.snapshot = Some(snapshot);
        self.ticker.start();
        self.refresh_countdown();
    }

    fn refresh_countdown(&mut self) {
        self.countdown_display = match self.snapshot.as_ref() {
            Some(snapshot) => self.countdown.render(snapshot, Utc::now(), &mut self.rng),
            None => ZERO_DISPLAY.to_string(),
        };
    }

    fn complete_session(&mut self) {
        match self.session.complete() {
            Ok(_) => self.sync_activity(),
            Err(err) => warn!(%err, "unlock arrived in the wrong state"),
        }
    }

    /// Any authenticated call refused the token: back to welcome, now.
    fn force_welcome(&mut self) {
        if self.session.revoke().is_err() {
            return;
        }
        self.sync_activity();
        self.notices.warning(SESSION_ENDED);
    }

    /// Starts or stops everything that only lives while in `main`.
    fn sync_activity(&mut self) {
        if self.session.state().is_main() {
            if !self.poller.is_active() {
                self.poller.start(self.session.token_watch());
            }
            return;
        }
        self.poller.stop();
        self.ticker.stop();
        self.actions.abort_all();
        self.snapshot = None;
        self.countdown_display = ZERO_DISPLAY.to_string();
        self.guardian.clear();
        self.sketchpad.clear();
        self.gate.clear();
    }

    fn spawn_action<F>(&mut self, action: F)
    where
        F: Future<Output = ActionOutcome> + Send + 'static,
    {
        let epoch = self.session.epoch();
        self.actions.spawn(async move { (epoch, action.await) });
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let api = Arc::new(PortalClient::new(config.backend_url.clone())?);
    let store = FileSessionStore::new(config.session_file.clone(), config.session_ttl);
    info!(path = %store.path().display(), "using session file");
    let mut portal = Portal::new(api, store, PortalSettings::from(&config));
    if config.reset_session {
        portal.reset_session();
    }
    portal.check_health().await;

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut portal, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<A: PortalApi, S: SessionStore>(
    portal: &mut Portal<A, S>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    tracing::info!("Running app loop");
    ui::draw(ui_state, &portal.view(Instant::now())).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            event = portal.next_event() => {
                portal.apply(event);
            }
            _ = tokio::signal::ctrl_c() => break,
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, &portal.view(Instant::now()), event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Enter => portal.request_enter(),
                    ui::UserEvent::Unlock => portal.request_unlock(),
                    ui::UserEvent::PassphraseChar(c) => portal.passphrase_push(c),
                    ui::UserEvent::PassphraseBackspace => portal.passphrase_pop(),
                    ui::UserEvent::SketchMove(direction) => portal.sketch_move(direction),
                    ui::UserEvent::SketchTogglePen => portal.sketch_toggle_pen(),
                    ui::UserEvent::SketchClear => portal.sketch_clear(),
                    ui::UserEvent::SubmitDrawing => {
                        // the refusal is already on screen as a notice
                        if let Err(refused) = portal.request_drawing_submit() {
                            debug!(%refused, "drawing submit refused locally");
                        }
                    }
                    ui::UserEvent::NewDrawing => portal.new_drawing(),
                    ui::UserEvent::BackToReality => portal.exit_to_welcome(),
                }
            }
        }
        ui::draw(ui_state, &portal.view(Instant::now())).wrap_err("draw failed")?;
    }
    Ok(())
}
