//! Rolling weekly voice quota.
//!
//! Free users get a fixed number of narrated step entries per window. The
//! window starts at the first use and resets lazily: an expired record reads
//! as fresh, and the reset is written only on the next increment.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::storage::{get_json, set_json, KeyValueStore, VoiceConfig};

/// Storage key for [`QuotaRecord`].
pub const QUOTA_KEY: &str = "voice-usage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaRecord {
    #[serde(alias = "lastReset")]
    pub window_start_epoch_ms: i64,
    #[serde(alias = "count")]
    pub used_count: u32,
}

impl QuotaRecord {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            window_start_epoch_ms: now.timestamp_millis(),
            used_count: 0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.timestamp_millis() - self.window_start_epoch_ms > window.num_milliseconds()
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.window_start_epoch_ms)
            .single()
            .unwrap_or_default()
    }
}

/// Display-friendly quota view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub premium: bool,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub window_start: DateTime<Utc>,
    pub window_resets_at: DateTime<Utc>,
}

pub struct QuotaGate {
    store: Arc<dyn KeyValueStore>,
    limit: u32,
    window: Duration,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(store, &VoiceConfig::default())
    }

    pub fn with_config(store: Arc<dyn KeyValueStore>, config: &VoiceConfig) -> Self {
        Self {
            store,
            limit: config.weekly_limit,
            window: config.window(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Whether narration may be spoken right now.
    pub async fn check_access(&self, is_premium: bool) -> bool {
        self.check_access_at(is_premium, Utc::now()).await
    }

    /// [`check_access`](Self::check_access) against an explicit clock.
    ///
    /// Premium never touches the store. Read failures grant access.
    pub async fn check_access_at(&self, is_premium: bool, now: DateTime<Utc>) -> bool {
        if is_premium {
            return true;
        }
        match self.current_record(now).await {
            Ok(record) => record.used_count < self.limit,
            Err(e) => {
                warn!(error = %e, key = QUOTA_KEY, "quota unreadable, granting narration");
                true
            }
        }
    }

    /// Count one narrated step. Call only right after a granted check.
    ///
    /// # Errors
    /// Returns the storage error if the new count cannot be written.
    pub async fn record_usage(&self) -> Result<QuotaRecord, StorageError> {
        self.record_usage_at(Utc::now()).await
    }

    /// [`record_usage`](Self::record_usage) against an explicit clock.
    ///
    /// # Errors
    /// Returns the storage error if the new count cannot be written.
    pub async fn record_usage_at(&self, now: DateTime<Utc>) -> Result<QuotaRecord, StorageError> {
        let mut record = match self.current_record(now).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, key = QUOTA_KEY, "quota unreadable, starting a new window");
                QuotaRecord::fresh(now)
            }
        };
        record.used_count = record.used_count.saturating_add(1);
        set_json(self.store.as_ref(), QUOTA_KEY, &record).await?;
        debug!(used = record.used_count, limit = self.limit, "voice usage recorded");
        Ok(record)
    }

    /// Current usage for display.
    pub async fn status(&self, is_premium: bool) -> QuotaStatus {
        self.status_at(is_premium, Utc::now()).await
    }

    pub async fn status_at(&self, is_premium: bool, now: DateTime<Utc>) -> QuotaStatus {
        let record = if is_premium {
            QuotaRecord::fresh(now)
        } else {
            self.current_record(now)
                .await
                .unwrap_or_else(|_| QuotaRecord::fresh(now))
        };
        let window_start = record.window_start();
        QuotaStatus {
            premium: is_premium,
            used: record.used_count,
            limit: self.limit,
            remaining: if is_premium {
                self.limit
            } else {
                self.limit.saturating_sub(record.used_count)
            },
            window_start,
            window_resets_at: window_start + self.window,
        }
    }

    /// Stored record, or a fresh one if absent or expired. Never writes.
    async fn current_record(&self, now: DateTime<Utc>) -> Result<QuotaRecord, StorageError> {
        let record = get_json::<QuotaRecord>(self.store.as_ref(), QUOTA_KEY)
            .await?
            .filter(|r| !r.is_expired(now, self.window));
        Ok(record.unwrap_or_else(|| QuotaRecord::fresh(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Backend("disk on fire".into()))
        }
        async fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Backend("disk on fire".into()))
        }
        async fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Backend("disk on fire".into()))
        }
    }

    fn gate(store: &Arc<MemoryStore>) -> QuotaGate {
        QuotaGate::new(store.clone())
    }

    #[tokio::test]
    async fn premium_never_touches_store() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate(&store);
        for _ in 0..10 {
            assert!(gate.check_access(true).await);
        }
        assert_eq!(store.reads(), 0);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn three_grants_then_denied() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate(&store);
        let now = Utc::now();

        for i in 1..=3 {
            assert!(gate.check_access_at(false, now).await, "grant {i}");
            let record = gate.record_usage_at(now).await.unwrap();
            assert_eq!(record.used_count, i);
        }
        assert!(!gate.check_access_at(false, now).await);
    }

    #[tokio::test]
    async fn check_alone_never_writes() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate(&store);
        assert!(gate.check_access(false).await);
        assert!(gate.check_access(false).await);
        assert_eq!(store.writes(), 0);
        assert_eq!(store.raw(QUOTA_KEY).await, None);
    }

    #[tokio::test]
    async fn expired_window_grants_and_resets_lazily() {
        let now = Utc::now();
        let stale = QuotaRecord {
            window_start_epoch_ms: (now - Duration::days(8)).timestamp_millis(),
            used_count: 3,
        };
        let store = Arc::new(MemoryStore::with_items([(
            QUOTA_KEY,
            serde_json::to_string(&stale).unwrap(),
        )]));
        let gate = gate(&store);

        assert!(gate.check_access_at(false, now).await);
        // Still the stale record on disk until the next increment.
        let raw: QuotaRecord = serde_json::from_str(&store.raw(QUOTA_KEY).await.unwrap()).unwrap();
        assert_eq!(raw, stale);

        let record = gate.record_usage_at(now).await.unwrap();
        assert_eq!(record.used_count, 1);
        assert_eq!(record.window_start_epoch_ms, now.timestamp_millis());
    }

    #[tokio::test]
    async fn window_boundary_is_strict() {
        let now = Utc::now();
        let record = QuotaRecord {
            window_start_epoch_ms: (now - Duration::days(7)).timestamp_millis(),
            used_count: 3,
        };
        assert!(!record.is_expired(now, Duration::days(7)));
        assert!(record.is_expired(now + Duration::milliseconds(1), Duration::days(7)));
    }

    #[tokio::test]
    async fn reads_legacy_field_names() {
        let now = Utc::now();
        let legacy = format!(
            r#"{{"lastReset": {}, "count": 3}}"#,
            (now - Duration::days(1)).timestamp_millis()
        );
        let store = Arc::new(MemoryStore::with_items([(QUOTA_KEY, legacy)]));
        assert!(!gate(&store).check_access_at(false, now).await);
    }

    #[tokio::test]
    async fn read_failure_grants_access() {
        let gate = QuotaGate::new(Arc::new(BrokenStore));
        assert!(gate.check_access(false).await);
        assert!(gate.record_usage().await.is_err());
    }

    #[tokio::test]
    async fn corrupt_record_reads_as_fresh() {
        let store = Arc::new(MemoryStore::with_items([(QUOTA_KEY, "garbage")]));
        let gate = gate(&store);
        assert!(gate.check_access(false).await);
        assert_eq!(gate.record_usage().await.unwrap().used_count, 1);
    }

    #[tokio::test]
    async fn status_reports_remaining() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate(&store);
        let now = Utc::now();
        gate.record_usage_at(now).await.unwrap();

        let status = gate.status_at(false, now).await;
        assert_eq!(status.used, 1);
        assert_eq!(status.remaining, 2);
        assert_eq!(status.window_resets_at - status.window_start, Duration::days(7));

        let premium = gate.status_at(true, now).await;
        assert_eq!(premium.remaining, 3);
    }
}
