use crate::api::{
    GameSnapshot,
    PortalApi,
    PortalError,
    SessionToken,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    task::{
        JoinHandle,
        JoinSet,
    },
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug)]
pub enum PollEvent {
    Snapshot {
        generation: u64,
        snapshot: GameSnapshot,
    },
    AuthFailed {
        generation: u64,
        error: PortalError,
    },
}

impl PollEvent {
    pub fn generation(&self) -> u64 {
        match self {
            PollEvent::Snapshot { generation, .. } => *generation,
            PollEvent::AuthFailed { generation, .. } => *generation,
        }
    }
}

/// Owns the one poll worker of the current `main` session.
///
/// `start` always tears down the previous worker first, and every activation
/// gets a fresh generation so events from a torn-down worker can be told
/// apart from live ones.
pub struct PollingSynchronizer<A> {
    api: Arc<A>,
    period: Duration,
    events_tx: mpsc::UnboundedSender<PollEvent>,
    worker: Option<JoinHandle<()>>,
    generation: u64,
}

impl<A: PortalApi> PollingSynchronizer<A> {
    pub fn new(
        api: Arc<A>,
        period: Duration,
        events_tx: mpsc::UnboundedSender<PollEvent>,
    ) -> Self {
        Self {
            api,
            period,
            events_tx,
            worker: None,
            generation: 0,
        }
    }

    pub fn start(&mut self, token_rx: watch::Receiver<Option<SessionToken>>) -> u64 {
        self.stop();
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        info!(generation, period_ms = self.period.as_millis() as u64, "polling started");
        self.worker = Some(tokio::spawn(poll_worker(
            self.api.clone(),
            self.period,
            generation,
            token_rx,
            self.events_tx.clone(),
        )));
        generation
    }

    /// Aborts the worker and every fetch it still has in flight.
    pub fn stop(&mut self) {
        if let Some(handle) = self.worker.take() {
            handle.abort();
            self.generation = self.generation.wrapping_add(1);
            info!(generation = self.generation, "polling stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.worker.is_some() && generation == self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<A> Drop for PollingSynchronizer<A> {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            handle.abort();
        }
    }
}

async fn poll_worker<A: PortalApi>(
    api: Arc<A>,
    period: Duration,
    generation: u64,
    token_rx: watch::Receiver<Option<SessionToken>>,
    events_tx: mpsc::UnboundedSender<PollEvent>,
) {
    // first tick completes immediately
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = token_rx.borrow().clone();
                let Some(token) = current else {
                    debug!(generation, "token cleared; poll worker exiting");
                    break;
                };
                in_flight.spawn(fetch_once(
                    api.clone(),
                    token,
                    generation,
                    events_tx.clone(),
                ));
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }
}

async fn fetch_once<A: PortalApi>(
    api: Arc<A>,
    token: SessionToken,
    generation: u64,
    events_tx: mpsc::UnboundedSender<PollEvent>,
) {
    let event = match api.fetch_state(&token).await {
        Ok(snapshot) => PollEvent::Snapshot {
            generation,
            snapshot,
        },
        Err(error) if error.is_auth_failure() => {
            info!(generation, %error, "poll rejected the session");
            PollEvent::AuthFailed { generation, error }
        }
        Err(error) => {
            warn!(generation, %error, "poll failed; retrying on next tick");
            return;
        }
    };
    let _ = events_tx.send(event);
}
