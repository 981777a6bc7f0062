//! Persistent store for users, channels, admins and counters
//!
//! Every collection lives in memory behind one mutex and is written to its
//! own JSON document on flush. Files are replaced wholesale through a
//! temporary file and a rename, so a crash mid-write leaves the previous
//! snapshot intact.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

const USERS_FILE: &str = "users.json";
const CHANNELS_FILE: &str = "channels.json";
const STATS_FILE: &str = "stats.json";
const ALLOWED_USERS_FILE: &str = "allowed_users.json";
const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error during JSON serialization or deserialization
    #[error("JSON error in {file}: {source}")]
    Json {
        /// File being read or written
        file: String,
        /// Underlying serde error
        source: serde_json::Error,
    },
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A user whose join request was approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Telegram user id.
    pub user_id: i64,
    /// Public username, if any.
    pub username: Option<String>,
    /// First name at approval time.
    pub first_name: String,
    /// Channel the user was approved into.
    pub channel_id: i64,
    /// Approval time.
    #[serde(deserialize_with = "deserialize_joined_at")]
    pub joined_at: DateTime<Utc>,
}

/// Accepts RFC 3339 as well as offset-less ISO 8601 timestamps, which are
/// read as UTC.
fn deserialize_joined_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(at) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(at.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|e| D::Error::custom(format!("invalid joined_at {raw:?}: {e}")))
}

/// Lifetime totals. They only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    /// Join requests approved.
    pub approved_requests: u64,
    /// Broadcast runs finished (completed or cancelled).
    pub broadcasts: u64,
    /// Users pruned because they blocked the bot.
    pub blocked_users: u64,
}

/// Point-in-time view used by `/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Users currently reachable by broadcasts.
    pub active_users: usize,
    /// Allow-listed channels.
    pub channels: usize,
    /// Lifetime counters.
    pub counters: Counters,
}

#[derive(Debug, Default)]
struct Collections {
    users: BTreeMap<i64, UserRecord>,
    channels: Vec<i64>,
    counters: Counters,
    admins: BTreeSet<i64>,
}

struct Snapshot {
    users: Vec<u8>,
    channels: Vec<u8>,
    counters: Vec<u8>,
    admins: Vec<u8>,
}

/// JSON-backed store shared by the approval workers, the broadcast task and
/// the command handlers.
pub struct Store {
    dir: PathBuf,
    data: Mutex<Collections>,
    /// Held for the whole write; also remembers when the last flush finished.
    writer: Mutex<Option<Instant>>,
}

impl Store {
    /// Open the store in `dir`, creating the directory when missing.
    ///
    /// Missing files start out empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a present file
    /// cannot be read or parsed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let users: BTreeMap<i64, UserRecord> = load_json(&dir, USERS_FILE).await?;
        let channels: Vec<i64> = load_json(&dir, CHANNELS_FILE).await?;
        let counters: Counters = load_json(&dir, STATS_FILE).await?;
        let admins: BTreeSet<i64> = load_json(&dir, ALLOWED_USERS_FILE).await?;

        info!(
            dir = %dir.display(),
            users = users.len(),
            channels = channels.len(),
            admins = admins.len(),
            "Store loaded"
        );

        Ok(Self {
            dir,
            data: Mutex::new(Collections {
                users,
                channels,
                counters,
                admins,
            }),
            writer: Mutex::new(None),
        })
    }

    /// Directory the store writes to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether join requests for `chat_id` are auto-approved.
    pub async fn is_channel_allowed(&self, chat_id: i64) -> bool {
        self.data.lock().await.channels.contains(&chat_id)
    }

    /// Add a channel to the allow-list. Returns `false` if already present.
    pub async fn add_channel(&self, chat_id: i64) -> bool {
        let mut data = self.data.lock().await;
        if data.channels.contains(&chat_id) {
            return false;
        }
        data.channels.push(chat_id);
        true
    }

    /// Allow-listed channels in insertion order.
    pub async fn channels(&self) -> Vec<i64> {
        self.data.lock().await.channels.clone()
    }

    /// Store an approved user and bump the approval counter in one step.
    pub async fn record_approval(&self, record: UserRecord) {
        let mut data = self.data.lock().await;
        data.counters.approved_requests += 1;
        data.users.insert(record.user_id, record);
    }

    /// Look up a user record.
    pub async fn user(&self, user_id: i64) -> Option<UserRecord> {
        self.data.lock().await.users.get(&user_id).cloned()
    }

    /// Ids of every known user, ascending.
    pub async fn user_ids(&self) -> Vec<i64> {
        self.data.lock().await.users.keys().copied().collect()
    }

    /// Drop a user. Returns `false` if the user was not known.
    pub async fn remove_user(&self, user_id: i64) -> bool {
        self.data.lock().await.users.remove(&user_id).is_some()
    }

    /// Account for a finished broadcast run.
    pub async fn record_broadcast(&self, blocked: u64) {
        let mut data = self.data.lock().await;
        data.counters.broadcasts += 1;
        data.counters.blocked_users += blocked;
    }

    /// Whether `user_id` was granted admin access.
    pub async fn is_admin_granted(&self, user_id: i64) -> bool {
        self.data.lock().await.admins.contains(&user_id)
    }

    /// Grant admin access. Returns `false` if already granted.
    pub async fn grant_admin(&self, user_id: i64) -> bool {
        self.data.lock().await.admins.insert(user_id)
    }

    /// Lifetime counters.
    pub async fn counters(&self) -> Counters {
        self.data.lock().await.counters
    }

    /// Figures for `/stats`.
    pub async fn stats(&self) -> StoreStats {
        let data = self.data.lock().await;
        StoreStats {
            active_users: data.users.len(),
            channels: data.channels.len(),
            counters: data.counters,
        }
    }

    /// Write every collection to disk now.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or a file write fails.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let mut last_flush = self.writer.lock().await;
        self.write_snapshot().await?;
        *last_flush = Some(Instant::now());
        Ok(())
    }

    /// Flush only if more than `interval` has passed since the last flush.
    ///
    /// Returns whether a write happened. The first call always writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn flush_if_due(&self, interval: Duration) -> Result<bool, StorageError> {
        let mut last_flush = self.writer.lock().await;
        if last_flush.is_some_and(|at| at.elapsed() <= interval) {
            return Ok(false);
        }
        self.write_snapshot().await?;
        *last_flush = Some(Instant::now());
        Ok(true)
    }

    async fn write_snapshot(&self) -> Result<(), StorageError> {
        let snapshot = {
            let data = self.data.lock().await;
            Snapshot {
                users: to_json(USERS_FILE, &data.users)?,
                channels: to_json(CHANNELS_FILE, &data.channels)?,
                counters: to_json(STATS_FILE, &data.counters)?,
                admins: to_json(ALLOWED_USERS_FILE, &data.admins)?,
            }
        };

        write_atomic(&self.dir, USERS_FILE, &snapshot.users).await?;
        write_atomic(&self.dir, CHANNELS_FILE, &snapshot.channels).await?;
        write_atomic(&self.dir, STATS_FILE, &snapshot.counters).await?;
        write_atomic(&self.dir, ALLOWED_USERS_FILE, &snapshot.admins).await?;

        debug!(dir = %self.dir.display(), "Store flushed");
        Ok(())
    }
}

async fn load_json<T: DeserializeOwned + Default>(dir: &Path, file: &str) -> Result<T, StorageError> {
    match tokio::fs::read(dir.join(file)).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StorageError::Json {
            file: file.to_string(),
            source,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

fn to_json<T: Serialize>(file: &str, value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec_pretty(value).map_err(|source| StorageError::Json {
        file: file.to_string(),
        source,
    })
}

async fn write_atomic(dir: &Path, file: &str, bytes: &[u8]) -> Result<(), StorageError> {
    let path = dir.join(file);
    let tmp = dir.join(format!("{file}{TEMP_FILE_SUFFIX}"));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("autoaccept-store-{}", Uuid::new_v4()))
    }

    fn record(user_id: i64, channel_id: i64) -> UserRecord {
        UserRecord {
            user_id,
            username: Some(format!("user{user_id}")),
            first_name: "Test".to_string(),
            channel_id,
            joined_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_open_empty_dir_starts_blank() -> Result<(), StorageError> {
        let dir = temp_dir();
        let store = Store::open(&dir).await?;

        assert!(store.user_ids().await.is_empty());
        assert!(store.channels().await.is_empty());
        assert_eq!(store.counters().await, Counters::default());

        tokio::fs::remove_dir_all(dir).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_flush_and_reopen_round_trip() -> Result<(), StorageError> {
        let dir = temp_dir();
        let store = Store::open(&dir).await?;

        assert!(store.add_channel(-100).await);
        store.record_approval(record(7, -100)).await;
        store.record_broadcast(2).await;
        store.grant_admin(55).await;
        store.flush().await?;

        let reopened = Store::open(&dir).await?;
        assert_eq!(reopened.channels().await, vec![-100]);
        assert_eq!(reopened.user(7).await.map(|u| u.channel_id), Some(-100));
        assert!(reopened.is_admin_granted(55).await);
        assert_eq!(
            reopened.counters().await,
            Counters {
                approved_requests: 1,
                broadcasts: 1,
                blocked_users: 2,
            }
        );

        tokio::fs::remove_dir_all(dir).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_channel_allow_list_is_append_only_set() -> Result<(), StorageError> {
        let dir = temp_dir();
        let store = Store::open(&dir).await?;

        assert!(store.add_channel(1).await);
        assert!(!store.add_channel(1).await);
        assert!(store.is_channel_allowed(1).await);
        assert!(!store.is_channel_allowed(2).await);

        tokio::fs::remove_dir_all(dir).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_reapproval_overwrites_record_and_counts_again() -> Result<(), StorageError> {
        let dir = temp_dir();
        let store = Store::open(&dir).await?;

        store.record_approval(record(7, 1)).await;
        store.record_approval(record(7, 2)).await;

        assert_eq!(store.user_ids().await, vec![7]);
        assert_eq!(store.user(7).await.map(|u| u.channel_id), Some(2));
        assert_eq!(store.counters().await.approved_requests, 2);

        tokio::fs::remove_dir_all(dir).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_flush_if_due_debounces() -> Result<(), StorageError> {
        let dir = temp_dir();
        let store = Store::open(&dir).await?;
        let interval = Duration::from_secs(3600);

        assert!(store.flush_if_due(interval).await?);
        assert!(!store.flush_if_due(interval).await?);

        // An explicit flush always writes and restarts the window
        store.flush().await?;
        assert!(!store.flush_if_due(interval).await?);

        tokio::fs::remove_dir_all(dir).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_loads_timestamps_without_offset() -> Result<(), StorageError> {
        let dir = temp_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let users = r#"{
            "7": {"user_id": 7, "username": null, "first_name": "A", "channel_id": -100, "joined_at": "2025-01-02T03:04:05.123456"},
            "8": {"user_id": 8, "username": "b", "first_name": "B", "channel_id": -100, "joined_at": "2025-01-02T03:04:05+00:00"}
        }"#;
        tokio::fs::write(dir.join(USERS_FILE), users).await?;

        let store = Store::open(&dir).await?;
        assert_eq!(store.user_ids().await, vec![7, 8]);
        assert_eq!(
            store.user(7).await.map(|u| u.joined_at.to_rfc3339()),
            Some("2025-01-02T03:04:05.123456+00:00".to_string())
        );
        assert_eq!(
            store.user(8).await.map(|u| u.joined_at.to_rfc3339()),
            Some("2025-01-02T03:04:05+00:00".to_string())
        );

        // Rewritten with an explicit offset and still readable
        store.flush().await?;
        let reopened = Store::open(&dir).await?;
        assert_eq!(reopened.user_ids().await, vec![7, 8]);

        tokio::fs::remove_dir_all(dir).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_timestamp_is_reported() -> Result<(), StorageError> {
        let dir = temp_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let users = r#"{"7": {"user_id": 7, "username": null, "first_name": "A", "channel_id": -100, "joined_at": "yesterday"}}"#;
        tokio::fs::write(dir.join(USERS_FILE), users).await?;

        let result = Store::open(&dir).await;
        assert!(matches!(result, Err(StorageError::Json { ref file, .. }) if file == USERS_FILE));

        tokio::fs::remove_dir_all(dir).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_file_is_reported() -> Result<(), StorageError> {
        let dir = temp_dir();
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(STATS_FILE), b"{not json").await?;

        let result = Store::open(&dir).await;
        assert!(matches!(result, Err(StorageError::Json { ref file, .. }) if file == STATS_FILE));

        tokio::fs::remove_dir_all(dir).await?;
        Ok(())
    }
}
