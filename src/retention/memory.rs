//! Consent-gated user memory
//!
//! Every write checks consent first and then issues one backend `set` with
//! a native TTL equal to the category's retention window. Reads re-check
//! consent so a revocation takes effect immediately. Unlike the response
//! cache, every failure here reaches the caller.

use crate::backend::KvBackend;
use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::metrics::MetricsRecorder;
use crate::retention::consent::{ConsentLedger, ConsentPurpose, ConsentRecord};
use crate::retention::keys;
use crate::retention::policy::{DataCategory, MemoryCategory, RetentionPolicy};
use crate::tasks::BackgroundQueue;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identifier of a memory record, unique per user
pub type RecordId = String;

/// One stored memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: RecordId,
    pub user_id: String,
    pub category: MemoryCategory,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Consent record in force when this was written
    pub consent_ref: String,
}

impl MemoryRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Stored form of a memory record
///
/// Only `category` and `created_at` are required, so records written before
/// the other fields existed still decode. Missing fields are filled from the
/// key and the retention policy.
#[derive(Debug, Deserialize)]
pub(crate) struct StoredRecord {
    #[serde(default)]
    id: Option<RecordId>,
    #[serde(default)]
    user_id: Option<String>,
    pub(crate) category: MemoryCategory,
    #[serde(default)]
    payload: Value,
    pub(crate) created_at: DateTime<Utc>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    consent_ref: Option<String>,
}

impl StoredRecord {
    pub(crate) fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// End of the retention window counted from creation
    pub(crate) fn retention_deadline(&self, policy: &RetentionPolicy) -> DateTime<Utc> {
        self.created_at + policy.max_age(self.category.data_category())
    }

    fn into_record(self, user_id: &str, key: &str, policy: &RetentionPolicy) -> MemoryRecord {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| self.retention_deadline(policy));
        MemoryRecord {
            id: self
                .id
                .unwrap_or_else(|| key.rsplit(':').next().unwrap_or_default().to_string()),
            user_id: self.user_id.unwrap_or_else(|| user_id.to_string()),
            category: self.category,
            payload: self.payload,
            created_at: self.created_at,
            expires_at,
            consent_ref: self.consent_ref.unwrap_or_default(),
        }
    }
}

/// Learned preferences for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub user_id: String,
    pub values: BTreeMap<String, Value>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Preferences {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Everything held about a user, for portability requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBundle {
    pub user_id: String,
    pub exported_at: DateTime<Utc>,
    pub records: Vec<MemoryRecord>,
    pub consents: Vec<ConsentRecord>,
    pub preferences: Option<Preferences>,
}

impl UserBundle {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.consents.is_empty() && self.preferences.is_none()
    }
}

/// What an erasure removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureReport {
    pub user_id: String,
    pub records_deleted: usize,
    pub consents_deleted: usize,
    pub preferences_deleted: bool,
}

impl ErasureReport {
    pub fn total(&self) -> usize {
        self.records_deleted + self.consents_deleted + usize::from(self.preferences_deleted)
    }
}

/// Derive a record id from the fields that identify a write
pub fn record_id(user_id: &str, category: MemoryCategory, created_at: DateTime<Utc>) -> RecordId {
    let mut hasher = Sha256::new();
    for part in [
        user_id,
        category.as_str(),
        &created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
    ] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(32);
    id
}

/// Consent-gated store for memories and preferences
pub struct MemoryStore {
    backend: Arc<dyn KvBackend>,
    consent: Arc<ConsentLedger>,
    policy: RetentionPolicy,
    clock: Arc<dyn Clock>,
    queue: Arc<BackgroundQueue>,
    metrics: MetricsRecorder,
}

impl MemoryStore {
    pub fn new(
        backend: Arc<dyn KvBackend>,
        consent: Arc<ConsentLedger>,
        policy: RetentionPolicy,
        clock: Arc<dyn Clock>,
        queue: Arc<BackgroundQueue>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            backend,
            consent,
            policy,
            clock,
            queue,
            metrics,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Store a memory, returning its id
    pub async fn write(
        &self,
        user_id: &str,
        category: MemoryCategory,
        payload: Value,
    ) -> Result<RecordId> {
        keys::validate_user_id(user_id)?;
        let consent = self
            .require_consent(user_id, category.data_category())
            .await?;

        let created_at = self.clock.now();
        let max_age = self.policy.max_age(category.data_category());
        let id = record_id(user_id, category, created_at);
        let record = MemoryRecord {
            id: id.clone(),
            user_id: user_id.to_string(),
            category,
            payload,
            created_at,
            expires_at: created_at + max_age,
            consent_ref: consent.reference(),
        };

        let raw = serde_json::to_string(&record)?;
        let ttl = max_age
            .to_std()
            .map_err(|e| CoreError::ValidationError(format!("invalid retention window: {}", e)))?;
        self.backend
            .set(&keys::memory_key(user_id, &id), &raw, Some(ttl))
            .await?;

        self.metrics.record_memory_write();
        debug!(user_id, record_id = %id, category = %category, "Memory written");
        Ok(id)
    }

    /// Fetch a live record; absent and expired records are both `NotFound`
    pub async fn read(&self, user_id: &str, id: &str) -> Result<MemoryRecord> {
        keys::validate_user_id(user_id)?;
        let key = keys::memory_key(user_id, id);
        let raw = self
            .backend
            .get(&key)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("memory record {}", id)))?;
        let record = StoredRecord::decode(&raw)?.into_record(user_id, &key, &self.policy);

        if record.is_expired_at(self.clock.now()) {
            self.schedule_purge(key);
            return Err(CoreError::NotFound(format!("memory record {}", id)));
        }

        self.require_consent(user_id, record.category.data_category())
            .await?;
        Ok(record)
    }

    /// Every live record, consent and preference held for `user_id`
    pub async fn export_all(&self, user_id: &str) -> Result<UserBundle> {
        keys::validate_user_id(user_id)?;
        let now = self.clock.now();

        let mut records = Vec::new();
        for key in self.backend.scan_prefix(&keys::memory_prefix(user_id)).await? {
            let Some(raw) = self.backend.get(&key).await? else {
                continue;
            };
            let record = match StoredRecord::decode(&raw) {
                Ok(stored) => stored.into_record(user_id, &key, &self.policy),
                Err(e) => {
                    warn!("Leaving unreadable memory record {} out of export: {}", key, e);
                    continue;
                }
            };
            if !record.is_expired_at(now) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let preferences = self
            .load_preferences(user_id)
            .await?
            .filter(|p| !p.is_expired_at(now));

        Ok(UserBundle {
            user_id: user_id.to_string(),
            exported_at: now,
            records,
            consents: self.consent.list_consents(user_id).await?,
            preferences,
        })
    }

    /// Hard-delete every key belonging to `user_id`
    pub async fn delete_all(&self, user_id: &str) -> Result<ErasureReport> {
        keys::validate_user_id(user_id)?;

        let mut records_deleted = 0;
        for key in self.backend.scan_prefix(&keys::memory_prefix(user_id)).await? {
            if self.backend.delete(&key).await? {
                records_deleted += 1;
            }
        }
        let preferences_deleted = self.backend.delete(&keys::preferences_key(user_id)).await?;
        let consents_deleted = self.consent.revoke_all(user_id).await?;

        let report = ErasureReport {
            user_id: user_id.to_string(),
            records_deleted,
            consents_deleted,
            preferences_deleted,
        };
        info!(
            user_id,
            records = report.records_deleted,
            consents = report.consents_deleted,
            preferences = report.preferences_deleted,
            "User data erased"
        );
        Ok(report)
    }

    /// Delete the data a purpose authorized, after that purpose is revoked
    pub async fn purge_purpose(&self, user_id: &str, purpose: ConsentPurpose) -> Result<usize> {
        keys::validate_user_id(user_id)?;

        let mut purged = 0;
        for key in self.backend.scan_prefix(&keys::memory_prefix(user_id)).await? {
            let Some(raw) = self.backend.get(&key).await? else {
                continue;
            };
            match StoredRecord::decode(&raw) {
                Ok(record) if record.category.purpose() != purpose => {}
                Ok(_) => {
                    if self.backend.delete(&key).await? {
                        purged += 1;
                    }
                }
                Err(e) => warn!("Skipping unreadable memory record {}: {}", key, e),
            }
        }

        if purpose == ConsentPurpose::PreferenceLearning
            && self.backend.delete(&keys::preferences_key(user_id)).await?
        {
            purged += 1;
        }

        info!(user_id, purpose = %purpose, purged, "Purged data for revoked purpose");
        Ok(purged)
    }

    /// Replace the user's preferences
    pub async fn set_preferences(
        &self,
        user_id: &str,
        values: BTreeMap<String, Value>,
    ) -> Result<Preferences> {
        keys::validate_user_id(user_id)?;
        self.require_consent(user_id, DataCategory::Preference)
            .await?;

        let now = self.clock.now();
        let max_age = self.policy.max_age(DataCategory::Preference);
        let preferences = Preferences {
            user_id: user_id.to_string(),
            values,
            updated_at: now,
            expires_at: now + max_age,
        };
        let ttl = max_age
            .to_std()
            .map_err(|e| CoreError::ValidationError(format!("invalid retention window: {}", e)))?;
        self.backend
            .set(
                &keys::preferences_key(user_id),
                &serde_json::to_string(&preferences)?,
                Some(ttl),
            )
            .await?;

        self.metrics.record_memory_write();
        Ok(preferences)
    }

    /// Current preferences, `NotFound` when absent or expired
    pub async fn get_preferences(&self, user_id: &str) -> Result<Preferences> {
        keys::validate_user_id(user_id)?;
        self.require_consent(user_id, DataCategory::Preference)
            .await?;

        match self.load_preferences(user_id).await? {
            Some(p) if !p.is_expired_at(self.clock.now()) => Ok(p),
            Some(_) => {
                self.schedule_purge(keys::preferences_key(user_id));
                Err(CoreError::NotFound(format!("preferences for {}", user_id)))
            }
            None => Err(CoreError::NotFound(format!("preferences for {}", user_id))),
        }
    }

    async fn load_preferences(&self, user_id: &str) -> Result<Option<Preferences>> {
        match self.backend.get(&keys::preferences_key(user_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// The consent covering `category`, if granted and not narrowed to other categories
    ///
    /// An empty `data_categories` set covers every category of the purpose.
    async fn require_consent(&self, user_id: &str, category: DataCategory) -> Result<ConsentRecord> {
        let purpose = category.purpose();
        let consent = self.consent.get_consent(user_id, purpose).await?;
        let covered = consent.data_categories.is_empty()
            || consent.data_categories.contains(category.as_str());
        if !consent.granted || !covered {
            self.metrics.record_consent_denied();
            warn!(
                user_id,
                purpose = %purpose,
                category = %category,
                "Memory access denied: consent does not cover this data"
            );
            return Err(CoreError::ConsentDenied {
                user_id: user_id.to_string(),
                purpose: purpose.to_string(),
            });
        }
        Ok(consent)
    }

    fn schedule_purge(&self, key: String) {
        let backend = self.backend.clone();
        self.queue.submit(format!("purge {}", key), async move {
            backend.delete(&key).await.map(|_| ())
        });
    }
}
