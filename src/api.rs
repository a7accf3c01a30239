//! Backend seam for the portal
//!
//! `PortalApi` is the contract the rest of the client consumes. The reqwest
//! implementation lives in `portal_client`; tests substitute a fake.

use base64::{
    Engine as _,
    engine::general_purpose::STANDARD,
};
use chrono::{
    DateTime,
    NaiveDateTime,
    Utc,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};
use std::{
    fmt,
    future::Future,
};

// =============================================================================
// SESSION TOKEN
// =============================================================================

/// Opaque bearer credential minted by `POST /enter`. Never empty.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Returns `None` for an empty or whitespace-only token.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        write!(f, "SessionToken(…{tail})")
    }
}

// =============================================================================
// GAME SNAPSHOT
// =============================================================================

/// Authoritative game state returned by `GET /data`.
///
/// Replaced wholesale on every successful poll, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Absolute deadline of the round
    #[serde(rename = "remaining_time", deserialize_with = "deserialize_deadline")]
    pub deadline: DateTime<Utc>,
    /// Hints released by the game master, oldest first
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(rename = "puzzle_1b", default)]
    pub progress: StageProgress,
    #[serde(default)]
    pub complete: bool,
}

impl GameSnapshot {
    pub fn passphrase_gate_open(&self) -> bool {
        self.progress.passphrase_gate_open()
    }
}

/// Progress on the drawing stage: accepted drawings and the PINs they revealed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub pins: Vec<String>,
}

impl StageProgress {
    pub const DRAWINGS_PER_STAGE: u32 = 5;
    pub const MAX_PINS: usize = 2;

    pub fn passphrase_gate_open(&self) -> bool {
        self.pins.len() == Self::MAX_PINS
    }

    /// No further drawings are accepted once every PIN is revealed.
    pub fn is_exhausted(&self) -> bool {
        self.pins.len() >= Self::MAX_PINS
    }
}

fn deserialize_deadline<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_deadline(&raw).map_err(serde::de::Error::custom)
}

/// Parses the backend's ISO-8601 deadline. Naive timestamps are taken as UTC.
pub fn parse_deadline(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid deadline '{raw}': {e}"))
}

// =============================================================================
// DRAWING IMAGE
// =============================================================================

/// Encoded PNG produced by the sketchpad. Opaque to everything but the upload.
#[derive(Clone, PartialEq, Eq)]
pub struct DrawingImage {
    png: Vec<u8>,
}

impl DrawingImage {
    pub fn from_png(png: Vec<u8>) -> Self {
        Self { png }
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }
}

impl fmt::Debug for DrawingImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DrawingImage({} bytes)", self.png.len())
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortalError {
    /// 401, or a 403 about the session itself. Always ends the session.
    #[error("session rejected by backend ({status})")]
    Unauthorized { status: u16 },
    /// Any other non-2xx: wrong passphrase, unreadable drawing, failed enter.
    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("connection error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl PortalError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, PortalError::Unauthorized { .. })
    }
}

pub type ApiResult<T> = std::result::Result<T, PortalError>;

// =============================================================================
// PORTAL API
// =============================================================================

/// The four backend operations the portal consumes, plus a liveness probe.
///
/// Authenticated calls take the token by reference so callers hand over the
/// value they read at call time, never one captured earlier.
pub trait PortalApi: Send + Sync + 'static {
    /// `POST /enter`
    fn enter(&self) -> impl Future<Output = ApiResult<SessionToken>> + Send;

    /// `GET /data`
    fn fetch_state(
        &self,
        token: &SessionToken,
    ) -> impl Future<Output = ApiResult<GameSnapshot>> + Send;

    /// `POST /chatbot`, returns the guardian's reply
    fn submit_drawing(
        &self,
        token: &SessionToken,
        image: &DrawingImage,
    ) -> impl Future<Output = ApiResult<String>> + Send;

    /// `POST /unlock`
    fn unlock(
        &self,
        token: &SessionToken,
        passphrase: &str,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    /// `GET /health`
    fn health(&self) -> impl Future<Output = ApiResult<()>> + Send;
}
