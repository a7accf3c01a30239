use crate::api::{
    ApiResult,
    DrawingImage,
    GameSnapshot,
    PortalApi,
    PortalError,
    SessionToken,
    StageProgress,
};
use chrono::{
    Duration as ChronoDuration,
    Utc,
};
use std::{
    collections::{
        HashSet,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
    time::Duration,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCall {
    Enter,
    FetchState { token: String },
    SubmitDrawing { token: String, png_len: usize },
    Unlock { token: String, passphrase: String },
    Health,
}

impl ApiCall {
    pub fn token(&self) -> Option<&str> {
        match self {
            ApiCall::FetchState { token }
            | ApiCall::SubmitDrawing { token, .. }
            | ApiCall::Unlock { token, .. } => Some(token),
            ApiCall::Enter | ApiCall::Health => None,
        }
    }
}

/// Scriptable in-memory backend. Clones share the same script and call log.
///
/// Tokens are minted as `token-1`, `token-2`, ... A revoked token is answered
/// with 403 on every authenticated call, like the real backend does once the
/// session expires.
#[derive(Clone, Default)]
pub struct FakePortalApi {
    inner: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<ApiCall>,
    minted: usize,
    revoked: HashSet<String>,
    latency: Duration,
    enter_script: VecDeque<ApiResult<SessionToken>>,
    fetch_script: VecDeque<ApiResult<GameSnapshot>>,
    snapshot: Option<GameSnapshot>,
    submit_script: VecDeque<ApiResult<String>>,
    unlock_script: VecDeque<ApiResult<()>>,
    health: Option<PortalError>,
}

impl FakePortalApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: GameSnapshot) -> Self {
        let api = Self::default();
        api.set_snapshot(snapshot);
        api
    }

    /// Snapshot served by every fetch once the script runs dry.
    pub fn set_snapshot(&self, snapshot: GameSnapshot) {
        self.lock().snapshot = Some(snapshot);
    }

    pub fn push_fetch_result(&self, result: ApiResult<GameSnapshot>) {
        self.lock().fetch_script.push_back(result);
    }

    pub fn push_enter_result(&self, result: ApiResult<SessionToken>) {
        self.lock().enter_script.push_back(result);
    }

    pub fn push_submit_result(&self, result: ApiResult<String>) {
        self.lock().submit_script.push_back(result);
    }

    pub fn push_unlock_result(&self, result: ApiResult<()>) {
        self.lock().unlock_script.push_back(result);
    }

    pub fn fail_health(&self, error: PortalError) {
        self.lock().health = Some(error);
    }

    pub fn revoke(&self, token: &str) {
        self.lock().revoked.insert(token.to_string());
    }

    /// Every call sleeps this long before answering.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.count(|call| matches!(call, ApiCall::FetchState { .. }))
    }

    pub fn count(&self, pred: impl Fn(&ApiCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| pred(call)).count()
    }

    /// Tokens carried by authenticated calls made after the first `skip` calls.
    pub fn tokens_after(&self, skip: usize) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .skip(skip)
            .filter_map(|call| call.token().map(str::to_string))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn pause(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_token(&self, token: &SessionToken) -> ApiResult<()> {
        if self.lock().revoked.contains(token.as_str()) {
            Err(PortalError::Unauthorized { status: 403 })
        } else {
            Ok(())
        }
    }
}

impl PortalApi for FakePortalApi {
    async fn enter(&self) -> ApiResult<SessionToken> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(ApiCall::Enter);
            state.enter_script.pop_front()
        };
        self.pause().await;
        match scripted {
            Some(Err(err)) => Err(err),
            Some(Ok(token)) => Ok(token),
            None => {
                let mut state = self.lock();
                state.minted += 1;
                let raw = format!("token-{}", state.minted);
                SessionToken::new(raw)
                    .ok_or_else(|| PortalError::Decode("minted empty token".to_string()))
            }
        }
    }

    async fn fetch_state(&self, token: &SessionToken) -> ApiResult<GameSnapshot> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(ApiCall::FetchState {
                token: token.as_str().to_string(),
            });
            state.fetch_script.pop_front()
        };
        self.pause().await;
        self.check_token(token)?;
        if let Some(result) = scripted {
            return result;
        }
        self.lock()
            .snapshot
            .clone()
            .ok_or_else(|| PortalError::Transport("no snapshot scripted".to_string()))
    }

    async fn submit_drawing(
        &self,
        token: &SessionToken,
        image: &DrawingImage,
    ) -> ApiResult<String> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(ApiCall::SubmitDrawing {
                token: token.as_str().to_string(),
                png_len: image.png_bytes().len(),
            });
            state.submit_script.pop_front()
        };
        self.pause().await;
        self.check_token(token)?;
        scripted.unwrap_or_else(|| Ok("The guardian studies your drawing.".to_string()))
    }

    async fn unlock(&self, token: &SessionToken, passphrase: &str) -> ApiResult<()> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(ApiCall::Unlock {
                token: token.as_str().to_string(),
                passphrase: passphrase.to_string(),
            });
            state.unlock_script.pop_front()
        };
        self.pause().await;
        self.check_token(token)?;
        scripted.unwrap_or(Ok(()))
    }

    async fn health(&self) -> ApiResult<()> {
        let failure = {
            let mut state = self.lock();
            state.calls.push(ApiCall::Health);
            state.health.clone()
        };
        self.pause().await;
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Snapshot whose deadline is `secs` from now, nothing solved yet.
pub fn snapshot_due_in(secs: i64) -> GameSnapshot {
    GameSnapshot {
        deadline: Utc::now() + ChronoDuration::seconds(secs),
        hints: Vec::new(),
        progress: StageProgress::default(),
        complete: false,
    }
}

pub fn snapshot_with_pins(pins: &[&str]) -> GameSnapshot {
    let mut snapshot = snapshot_due_in(3600);
    snapshot.progress = StageProgress {
        count: StageProgress::DRAWINGS_PER_STAGE,
        pins: pins.iter().map(|p| p.to_string()).collect(),
    };
    snapshot
}

pub fn token(raw: &str) -> SessionToken {
    SessionToken::new(raw).unwrap_or_else(|| panic!("test token '{raw}' must not be blank"))
}
