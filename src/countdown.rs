//! Jittered countdown to the round deadline.
//!
//! The display is fuzzed by a fresh jitter sample on every tick so it can't be
//! used as a precise oracle for the server deadline. It never reads zero
//! before the deadline has actually passed, and reads zero for good once the
//! snapshot reports completion.

use crate::api::GameSnapshot;
use chrono::{
    DateTime,
    Utc,
};
use rand::Rng;
use std::{
    future,
    time::Duration,
};
use tokio::time::{
    self,
    Interval,
    MissedTickBehavior,
};

pub const DEFAULT_JITTER_SECS: u32 = 30;
pub const ZERO_DISPLAY: &str = "00:00:00";
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Countdown {
    jitter_window: i64,
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new(DEFAULT_JITTER_SECS)
    }
}

impl Countdown {
    pub fn new(jitter_window_secs: u32) -> Self {
        Self {
            jitter_window: i64::from(jitter_window_secs),
        }
    }

    pub fn jitter_window(&self) -> i64 {
        self.jitter_window
    }

    /// Whole seconds left before the deadline, without jitter.
    pub fn base_remaining(snapshot: &GameSnapshot, now: DateTime<Utc>) -> i64 {
        (snapshot.deadline - now).num_seconds()
    }

    pub fn sample_jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        if self.jitter_window == 0 {
            0
        } else {
            rng.random_range(-self.jitter_window..=self.jitter_window)
        }
    }

    pub fn render<R: Rng + ?Sized>(
        &self,
        snapshot: &GameSnapshot,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> String {
        if snapshot.complete {
            return ZERO_DISPLAY.to_string();
        }
        let jitter = self.sample_jitter(rng);
        self.render_with_jitter(snapshot, now, jitter)
    }

    pub fn render_with_jitter(
        &self,
        snapshot: &GameSnapshot,
        now: DateTime<Utc>,
        jitter: i64,
    ) -> String {
        if snapshot.complete {
            return ZERO_DISPLAY.to_string();
        }
        // Zero belongs to the real deadline only: after it, positive jitter is
        // not added, and before it the jittered value never drops below one
        // second. The switch to 00:00:00 therefore marks the exact deadline.
        let base = Self::base_remaining(snapshot, now);
        if base <= 0 {
            return ZERO_DISPLAY.to_string();
        }
        format_hms(base.saturating_add(jitter).max(1))
    }
}

/// Zero-padded `HH:MM:SS`. Hours keep counting past 24.
pub fn format_hms(total_secs: i64) -> String {
    if total_secs <= 0 {
        return ZERO_DISPLAY.to_string();
    }
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Once-per-second tick source, present only while a deadline is on screen.
#[derive(Debug, Default)]
pub struct CountdownTicker {
    interval: Option<Interval>,
}

impl CountdownTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: a running ticker keeps its schedule.
    pub fn start(&mut self) {
        if self.interval.is_none() {
            let mut interval = time::interval(TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            self.interval = Some(interval);
        }
    }

    pub fn stop(&mut self) {
        self.interval = None;
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Pending forever while stopped.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => future::pending::<()>().await,
        }
    }
}
