use chrono::{
    DateTime,
    Duration,
    Utc,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    io::{
        ErrorKind,
        Write,
    },
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};
use tracing::{
    debug,
    warn,
};

pub const DEFAULT_SESSION_TTL_MINS: i64 = 60;

/// Persisted name of the portal state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalStateKind {
    #[default]
    Welcome,
    Main,
    Completed,
}

impl fmt::Display for PortalStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PortalStateKind::Welcome => "welcome",
            PortalStateKind::Main => "main",
            PortalStateKind::Completed => "completed",
        };
        write!(f, "{name}")
    }
}

/// The two fields the portal keeps across restarts.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StoredSession {
    pub state: PortalStateKind,
    /// Empty when no session is held.
    pub token: String,
}

impl StoredSession {
    pub fn new(state: PortalStateKind, token: impl Into<String>) -> Self {
        Self {
            state,
            token: token.into(),
        }
    }
}

pub trait SessionStore {
    /// Last saved session, or defaults when absent or expired. Never fails.
    fn load(&self) -> StoredSession;

    /// Overwrites the record and pushes its expiry out by one TTL.
    fn save(&self, session: &StoredSession) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SessionRecord {
    portal_state: PortalStateKind,
    #[serde(default)]
    portal_token: String,
    expires_at: DateTime<Utc>,
}

/// JSON file backed store with a fixed TTL.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
    ttl: Duration,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_at(&self, now: DateTime<Utc>) -> StoredSession {
        match read_record(&self.path) {
            Ok(Some(record)) if record.expires_at > now => {
                StoredSession::new(record.portal_state, record.portal_token)
            }
            Ok(Some(record)) => {
                debug!(expired_at = %record.expires_at, "persisted session expired");
                StoredSession::default()
            }
            Ok(None) => StoredSession::default(),
            Err(err) => {
                warn!(?err, path = %self.path.display(), "ignoring unreadable session file");
                StoredSession::default()
            }
        }
    }

    pub fn save_at(&self, session: &StoredSession, now: DateTime<Utc>) -> Result<()> {
        let record = SessionRecord {
            portal_state: session.state,
            portal_token: session.token.clone(),
            expires_at: now + self.ttl,
        };
        write_record(&self.path, &record)?;
        debug!(state = ?session.state, expires_at = %record.expires_at, "session saved");
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> StoredSession {
        self.load_at(Utc::now())
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        self.save_at(session, Utc::now())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).wrap_err_with(|| {
                format!("Failed to remove session file {}", self.path.display())
            }),
        }
    }
}

fn read_record(path: &Path) -> Result<Option<SessionRecord>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).wrap_err_with(|| {
                format!("Failed to read session file {}", path.display())
            });
        }
    };
    if contents.trim().is_empty() {
        return Ok(None);
    }
    let record = serde_json::from_str(&contents)
        .wrap_err_with(|| format!("Failed to parse session file {}", path.display()))?;
    Ok(Some(record))
}

fn write_record(path: &Path, record: &SessionRecord) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).wrap_err_with(|| {
            format!("Failed to create session directory {}", parent.display())
        })?;
    }
    let json = serde_json::to_string_pretty(record)
        .wrap_err("Failed to serialize session record")?;
    let mut file = fs::File::create(path)
        .wrap_err_with(|| format!("Failed to open {} for writing", path.display()))?;
    file.write_all(json.as_bytes())
        .wrap_err_with(|| format!("Failed to write session file {}", path.display()))?;
    Ok(())
}

/// Shared in-process store. Clones see the same record.
#[derive(Clone, Debug, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    session: Option<StoredSession>,
    saves: usize,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: StoredSession) -> Self {
        let store = Self::default();
        store.lock().session = Some(session);
        store
    }

    pub fn current(&self) -> Option<StoredSession> {
        self.lock().session.clone()
    }

    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> StoredSession {
        self.lock().session.clone().unwrap_or_default()
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        let mut inner = self.lock();
        inner.session = Some(session.clone());
        inner.saves += 1;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock().session = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use chrono::TimeZone;
    use tempdir::TempDir;

    fn store_in(dir: &TempDir) -> FileSessionStore {
        FileSessionStore::new(
            dir.path().join("nested").join("portal_session.json"),
            Duration::minutes(DEFAULT_SESSION_TTL_MINS),
        )
    }

    #[test]
    fn load__missing_file_returns_defaults() {
        let dir = TempDir::new("portal-store").unwrap();
        let store = store_in(&dir);

        let actual = store.load();

        assert_eq!(StoredSession::default(), actual);
    }

    #[test]
    fn save__then_load_within_ttl_restores_both_fields() {
        // given
        let dir = TempDir::new("portal-store").unwrap();
        let store = store_in(&dir);
        let now = Utc.with_ymd_and_hms(2025, 10, 31, 19, 0, 0).unwrap();
        let expected = StoredSession::new(PortalStateKind::Main, "tok-123");

        // when
        store.save_at(&expected, now).unwrap();
        let actual = store.load_at(now + Duration::minutes(59));

        // then
        assert_eq!(expected, actual);
    }

    #[test]
    fn load__expired_record_reverts_to_welcome() {
        let dir = TempDir::new("portal-store").unwrap();
        let store = store_in(&dir);
        let now = Utc.with_ymd_and_hms(2025, 10, 31, 19, 0, 0).unwrap();
        store
            .save_at(&StoredSession::new(PortalStateKind::Main, "tok"), now)
            .unwrap();

        let actual = store.load_at(now + Duration::minutes(61));

        assert_eq!(StoredSession::default(), actual);
    }

    #[test]
    fn save__refreshes_expiry_on_every_write() {
        // given
        let dir = TempDir::new("portal-store").unwrap();
        let store = store_in(&dir);
        let start = Utc.with_ymd_and_hms(2025, 10, 31, 19, 0, 0).unwrap();
        let session = StoredSession::new(PortalStateKind::Main, "tok");
        store.save_at(&session, start).unwrap();

        // when
        store
            .save_at(&session, start + Duration::minutes(45))
            .unwrap();

        // then
        let actual = store.load_at(start + Duration::minutes(90));
        assert_eq!(session, actual);
    }

    #[test]
    fn load__corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new("portal-store").unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();

        let actual = store.load();

        assert_eq!(StoredSession::default(), actual);
    }

    #[test]
    fn clear__removes_record_and_tolerates_missing_file() {
        let dir = TempDir::new("portal-store").unwrap();
        let store = store_in(&dir);
        store
            .save(&StoredSession::new(PortalStateKind::Completed, ""))
            .unwrap();

        store.clear().unwrap();
        store.clear().unwrap();

        assert!(!store.path().exists());
        assert_eq!(StoredSession::default(), store.load());
    }

    #[test]
    fn record__uses_lowercase_state_names() {
        let record = SessionRecord {
            portal_state: PortalStateKind::Completed,
            portal_token: String::new(),
            expires_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };

        let json = serde_json::to_value(&record).unwrap();

        assert_eq!("completed", json["portal_state"]);
        assert_eq!("", json["portal_token"]);
    }

    #[test]
    fn memory_store__clones_share_state_and_count_saves() {
        let store = MemorySessionStore::new();
        let observer = store.clone();

        store
            .save(&StoredSession::new(PortalStateKind::Main, "a"))
            .unwrap();
        store
            .save(&StoredSession::new(PortalStateKind::Welcome, ""))
            .unwrap();

        assert_eq!(2, observer.save_count());
        assert_eq!(
            Some(StoredSession::new(PortalStateKind::Welcome, "")),
            observer.current()
        );
    }
}
