//! Per-user, per-purpose consent ledger
//!
//! Default-deny: a missing record means "not granted" in production. Each
//! `(user, purpose)` pair lives under one key and every write replaces the
//! whole record in a single backend `set`, so concurrent grant/revoke calls
//! resolve to one complete record rather than a merge of both.

use crate::backend::KvBackend;
use crate::clock::Clock;
use crate::config::Environment;
use crate::error::{CoreError, Result};
use crate::retention::keys;
use crate::retention::policy::{DataCategory, RetentionPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Named category of data use requiring separate authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentPurpose {
    MemoryRetention,
    PreferenceLearning,
    Analytics,
}

impl ConsentPurpose {
    pub const ALL: [ConsentPurpose; 3] = [
        ConsentPurpose::MemoryRetention,
        ConsentPurpose::PreferenceLearning,
        ConsentPurpose::Analytics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentPurpose::MemoryRetention => "memory_retention",
            ConsentPurpose::PreferenceLearning => "preference_learning",
            ConsentPurpose::Analytics => "analytics",
        }
    }

    /// Data categories this purpose authorizes
    pub fn categories(&self) -> impl Iterator<Item = DataCategory> + '_ {
        DataCategory::ALL
            .into_iter()
            .filter(move |c| c.purpose() == *self)
    }
}

impl fmt::Display for ConsentPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsentPurpose {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        ConsentPurpose::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CoreError::ValidationError(format!("unknown consent purpose '{}'", s)))
    }
}

/// A user's decision for one purpose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub user_id: String,
    pub purpose: ConsentPurpose,
    pub granted: bool,
    pub granted_at: DateTime<Utc>,
    pub retention_days: u32,
    pub data_categories: BTreeSet<String>,
}

impl ConsentRecord {
    /// A grant covering every category of the purpose for the given window
    pub fn granted(
        user_id: impl Into<String>,
        purpose: ConsentPurpose,
        at: DateTime<Utc>,
        policy: &RetentionPolicy,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            purpose,
            granted: true,
            granted_at: at,
            retention_days: policy.max_days_for_purpose(purpose),
            data_categories: purpose.categories().map(|c| c.as_str().to_string()).collect(),
        }
    }

    /// A revocation
    pub fn revoked(user_id: impl Into<String>, purpose: ConsentPurpose, at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            purpose,
            granted: false,
            granted_at: at,
            retention_days: 0,
            data_categories: BTreeSet::new(),
        }
    }

    /// Reference stamped onto records written under this consent
    pub fn reference(&self) -> String {
        format!(
            "{}@{}",
            keys::consent_key(&self.user_id, self.purpose),
            self.granted_at.to_rfc3339()
        )
    }
}

/// Consent storage with default-deny reads
pub struct ConsentLedger {
    backend: Arc<dyn KvBackend>,
    policy: RetentionPolicy,
    environment: Environment,
    clock: Arc<dyn Clock>,
}

impl ConsentLedger {
    pub fn new(
        backend: Arc<dyn KvBackend>,
        policy: RetentionPolicy,
        environment: Environment,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if environment == Environment::Test {
            warn!("Consent ledger running in TEST environment: missing consent is treated as granted");
        }
        Self {
            backend,
            policy,
            environment,
            clock,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Current consent, synthesizing the environment default when absent
    pub async fn get_consent(&self, user_id: &str, purpose: ConsentPurpose) -> Result<ConsentRecord> {
        keys::validate_user_id(user_id)?;
        let key = keys::consent_key(user_id, purpose);
        match self.backend.get(&key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(self.default_record(user_id, purpose)),
        }
    }

    pub async fn is_granted(&self, user_id: &str, purpose: ConsentPurpose) -> Result<bool> {
        Ok(self.get_consent(user_id, purpose).await?.granted)
    }

    /// Persist `record`, fully replacing the previous one for its key
    pub async fn set_consent(&self, record: &ConsentRecord) -> Result<()> {
        self.validate(record)?;
        let key = keys::consent_key(&record.user_id, record.purpose);
        let raw = serde_json::to_string(record)?;
        self.backend.set(&key, &raw, None).await?;
        info!(
            user_id = %record.user_id,
            purpose = %record.purpose,
            granted = record.granted,
            "Consent updated"
        );
        Ok(())
    }

    /// Every stored consent record for `user_id`
    pub async fn list_consents(&self, user_id: &str) -> Result<Vec<ConsentRecord>> {
        keys::validate_user_id(user_id)?;
        let mut records = Vec::new();
        for key in self.backend.scan_prefix(&keys::consent_prefix(user_id)).await? {
            match self.backend.get(&key).await? {
                Some(raw) => records.push(serde_json::from_str(&raw)?),
                None => debug!("Consent key vanished during scan: {}", key),
            }
        }
        records.sort_by_key(|r: &ConsentRecord| r.purpose);
        Ok(records)
    }

    /// Delete every consent record for `user_id`, returning how many existed
    pub async fn revoke_all(&self, user_id: &str) -> Result<usize> {
        keys::validate_user_id(user_id)?;
        let mut removed = 0;
        for key in self.backend.scan_prefix(&keys::consent_prefix(user_id)).await? {
            if self.backend.delete(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn default_record(&self, user_id: &str, purpose: ConsentPurpose) -> ConsentRecord {
        let now = self.clock.now();
        match self.environment {
            Environment::Production => ConsentRecord::revoked(user_id, purpose, now),
            Environment::Test => ConsentRecord::granted(user_id, purpose, now, &self.policy),
        }
    }

    fn validate(&self, record: &ConsentRecord) -> Result<()> {
        keys::validate_user_id(&record.user_id)?;
        let max_days = self.policy.max_days_for_purpose(record.purpose);
        if record.retention_days > max_days {
            return Err(CoreError::ValidationError(format!(
                "retention of {} days exceeds the {} day maximum for {}",
                record.retention_days, max_days, record.purpose
            )));
        }
        for name in &record.data_categories {
            let category: DataCategory = name.parse()?;
            if category.purpose() != record.purpose {
                return Err(CoreError::ValidationError(format!(
                    "category {} is not covered by purpose {}",
                    category, record.purpose
                )));
            }
        }
        Ok(())
    }
}
