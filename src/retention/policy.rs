//! Per-category retention windows
//!
//! The statutory table below is an upper bound. Deployments may shorten a
//! window but any attempt to lengthen one is rejected.

use crate::error::{CoreError, Result};
use crate::retention::consent::ConsentPurpose;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Retention class of stored data
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataCategory {
    Conversation,
    Preference,
    CulturalContext,
    GroupPattern,
    Analytics,
}

impl DataCategory {
    pub const ALL: [DataCategory; 5] = [
        DataCategory::Conversation,
        DataCategory::Preference,
        DataCategory::CulturalContext,
        DataCategory::GroupPattern,
        DataCategory::Analytics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::Conversation => "conversation",
            DataCategory::Preference => "preference",
            DataCategory::CulturalContext => "culturalContext",
            DataCategory::GroupPattern => "groupPattern",
            DataCategory::Analytics => "analytics",
        }
    }

    /// Statutory maximum retention in days
    pub fn legal_max_days(&self) -> u32 {
        match self {
            DataCategory::Conversation => 90,
            DataCategory::Preference => 365,
            DataCategory::CulturalContext => 365,
            DataCategory::GroupPattern => 180,
            DataCategory::Analytics => 90,
        }
    }

    /// Consent purpose that must be granted before storing this data
    pub fn purpose(&self) -> ConsentPurpose {
        match self {
            DataCategory::Conversation | DataCategory::CulturalContext => {
                ConsentPurpose::MemoryRetention
            }
            DataCategory::Preference => ConsentPurpose::PreferenceLearning,
            DataCategory::GroupPattern | DataCategory::Analytics => ConsentPurpose::Analytics,
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        DataCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::ValidationError(format!("unknown data category '{}'", s)))
    }
}

/// Category a memory record may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoryCategory {
    Conversation,
    Preference,
    CulturalContext,
    GroupPattern,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 4] = [
        MemoryCategory::Conversation,
        MemoryCategory::Preference,
        MemoryCategory::CulturalContext,
        MemoryCategory::GroupPattern,
    ];

    pub fn data_category(&self) -> DataCategory {
        match self {
            MemoryCategory::Conversation => DataCategory::Conversation,
            MemoryCategory::Preference => DataCategory::Preference,
            MemoryCategory::CulturalContext => DataCategory::CulturalContext,
            MemoryCategory::GroupPattern => DataCategory::GroupPattern,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.data_category().as_str()
    }

    pub fn purpose(&self) -> ConsentPurpose {
        self.data_category().purpose()
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        MemoryCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::ValidationError(format!("unknown memory category '{}'", s)))
    }
}

/// Category to maximum age mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    days: BTreeMap<DataCategory, u32>,
}

impl RetentionPolicy {
    /// The statutory table
    pub fn standard() -> Self {
        Self {
            days: DataCategory::ALL
                .into_iter()
                .map(|c| (c, c.legal_max_days()))
                .collect(),
        }
    }

    /// Shorten a category's window; lengthening past the legal maximum fails
    pub fn with_override(mut self, category: DataCategory, days: u32) -> Result<Self> {
        if days == 0 {
            return Err(CoreError::ValidationError(format!(
                "retention for {} must be at least one day",
                category
            )));
        }
        if days > category.legal_max_days() {
            return Err(CoreError::ValidationError(format!(
                "retention for {} cannot exceed {} days (requested {})",
                category,
                category.legal_max_days(),
                days
            )));
        }
        self.days.insert(category, days);
        Ok(self)
    }

    pub fn days(&self, category: DataCategory) -> u32 {
        self.days
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.legal_max_days())
    }

    pub fn max_age(&self, category: DataCategory) -> Duration {
        Duration::days(i64::from(self.days(category)))
    }

    /// Longest window among the categories a purpose covers
    pub fn max_days_for_purpose(&self, purpose: ConsentPurpose) -> u32 {
        DataCategory::ALL
            .into_iter()
            .filter(|c| c.purpose() == purpose)
            .map(|c| self.days(c))
            .max()
            .unwrap_or(0)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
