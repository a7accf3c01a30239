//! Session state machine and the controller that owns the token.

use crate::{
    api::SessionToken,
    session_store::{
        PortalStateKind,
        SessionStore,
        StoredSession,
    },
};
use tokio::sync::watch;
use tracing::{
    info,
    warn,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PortalState {
    #[default]
    Welcome,
    Main {
        token: SessionToken,
    },
    Completed,
}

impl PortalState {
    pub fn kind(&self) -> PortalStateKind {
        match self {
            PortalState::Welcome => PortalStateKind::Welcome,
            PortalState::Main { .. } => PortalStateKind::Main,
            PortalState::Completed => PortalStateKind::Completed,
        }
    }

    pub fn token(&self) -> Option<&SessionToken> {
        match self {
            PortalState::Main { token } => Some(token),
            PortalState::Welcome | PortalState::Completed => None,
        }
    }

    pub fn is_main(&self) -> bool {
        matches!(self, PortalState::Main { .. })
    }

    /// A stored `main` without a usable token has nothing to resume.
    pub fn from_stored(stored: &StoredSession) -> Self {
        match stored.state {
            PortalStateKind::Welcome => PortalState::Welcome,
            PortalStateKind::Main => match SessionToken::new(stored.token.clone()) {
                Some(token) => PortalState::Main { token },
                None => PortalState::Welcome,
            },
            PortalStateKind::Completed => PortalState::Completed,
        }
    }

    pub fn to_stored(&self) -> StoredSession {
        let token = self
            .token()
            .map(|t| t.as_str().to_string())
            .unwrap_or_default();
        StoredSession::new(self.kind(), token)
    }

    /// The full transition table. Anything not listed is illegal.
    pub fn apply(&self, transition: Transition) -> Result<PortalState, IllegalTransition> {
        match (self, transition) {
            (PortalState::Welcome, Transition::Entered(token)) => {
                Ok(PortalState::Main { token })
            }
            (PortalState::Main { .. }, Transition::Unlocked) => Ok(PortalState::Completed),
            (PortalState::Main { .. }, Transition::Revoked) => Ok(PortalState::Welcome),
            (PortalState::Completed, Transition::Exit) => Ok(PortalState::Welcome),
            (_, Transition::Reset) => Ok(PortalState::Welcome),
            (from, transition) => Err(IllegalTransition {
                from: from.kind(),
                transition: transition.name(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Backend minted a token for us
    Entered(SessionToken),
    /// Passphrase accepted, or the snapshot already says complete
    Unlocked,
    /// Backend refused the token
    Revoked,
    /// "Back to reality" from the completed screen
    Exit,
    Reset,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Entered(_) => "entered",
            Transition::Unlocked => "unlocked",
            Transition::Revoked => "revoked",
            Transition::Exit => "exit",
            Transition::Reset => "reset",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply '{transition}' while {from}")]
pub struct IllegalTransition {
    pub from: PortalStateKind,
    pub transition: &'static str,
}

/// Sole writer of the session. Every transition is persisted, published on
/// the token watch and bumps the epoch so results issued under an older
/// session can be recognised and dropped.
pub struct SessionController<S> {
    state: PortalState,
    store: S,
    token_tx: watch::Sender<Option<SessionToken>>,
    epoch: u64,
}

impl<S: SessionStore> SessionController<S> {
    pub fn restore(store: S) -> Self {
        let stored = store.load();
        let state = PortalState::from_stored(&stored);
        info!(state = %state.kind(), "restored portal session");
        let (token_tx, _) = watch::channel(state.token().cloned());
        Self {
            state,
            store,
            token_tx,
            epoch: 0,
        }
    }

    pub fn state(&self) -> &PortalState {
        &self.state
    }

    pub fn kind(&self) -> PortalStateKind {
        self.state.kind()
    }

    /// Read at call time. Never hold on to the result across an await.
    pub fn current_token(&self) -> Option<SessionToken> {
        self.token_tx.borrow().clone()
    }

    pub fn token_watch(&self) -> watch::Receiver<Option<SessionToken>> {
        self.token_tx.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn transition(
        &mut self,
        transition: Transition,
    ) -> Result<&PortalState, IllegalTransition> {
        let name = transition.name();
        let next = self.state.apply(transition)?;
        info!(from = %self.state.kind(), to = %next.kind(), transition = name, "portal transition");
        self.state = next;
        self.epoch = self.epoch.wrapping_add(1);
        self.token_tx.send_replace(self.state.token().cloned());
        self.persist(name);
        Ok(&self.state)
    }

    pub fn enter(&mut self, token: SessionToken) -> Result<&PortalState, IllegalTransition> {
        self.transition(Transition::Entered(token))
    }

    pub fn complete(&mut self) -> Result<&PortalState, IllegalTransition> {
        self.transition(Transition::Unlocked)
    }

    pub fn revoke(&mut self) -> Result<&PortalState, IllegalTransition> {
        self.transition(Transition::Revoked)
    }

    pub fn exit_to_welcome(&mut self) -> Result<&PortalState, IllegalTransition> {
        self.transition(Transition::Exit)
    }

    pub fn reset(&mut self) -> &PortalState {
        let previous = self.state.kind();
        self.state = PortalState::Welcome;
        self.epoch = self.epoch.wrapping_add(1);
        self.token_tx.send_replace(None);
        if let Err(err) = self.store.clear() {
            warn!(?err, "failed to clear persisted session");
        }
        info!(from = %previous, "portal session reset");
        &self.state
    }

    fn persist(&self, cause: &'static str) {
        if let Err(err) = self.store.save(&self.state.to_stored()) {
            warn!(?err, cause, "failed to persist portal session");
        }
    }
}
