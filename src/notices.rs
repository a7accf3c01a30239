use std::{
    collections::VecDeque,
    time::Duration,
};
use tokio::time::Instant;
use tracing::{
    error,
    info,
    warn,
};

pub const MAX_NOTICES: usize = 50;
pub const NOTICE_TTL: Duration = Duration::from_secs(4);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    pub at: Instant,
}

/// Transient, non-blocking messages. Keeps the last `MAX_NOTICES`.
#[derive(Debug, Default)]
pub struct Notices {
    items: VecDeque<Notice>,
}

impl Notices {
    pub fn push(&mut self, level: NoticeLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            NoticeLevel::Info => info!(notice = %text),
            NoticeLevel::Warning => warn!(notice = %text),
            NoticeLevel::Error => error!(notice = %text),
        }
        self.items.push_back(Notice {
            level,
            text,
            at: Instant::now(),
        });
        while self.items.len() > MAX_NOTICES {
            self.items.pop_front();
        }
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.push(NoticeLevel::Info, text);
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.push(NoticeLevel::Warning, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(NoticeLevel::Error, text);
    }

    /// Notices still on screen at `now`, oldest first.
    pub fn visible(&self, now: Instant) -> impl Iterator<Item = &Notice> {
        self.items
            .iter()
            .filter(move |n| now.saturating_duration_since(n.at) < NOTICE_TTL)
    }

    pub fn latest(&self) -> Option<&Notice> {
        self.items.back()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.items.iter().map(|n| n.text.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
