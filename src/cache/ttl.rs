//! Adaptive TTL selection
//!
//! Rules are evaluated in strict priority order and the first match wins:
//!
//! 1. top-tier model: `base * premium_multiplier`
//! 2. large response (`tokens > large_response_tokens`): `base * large_response_multiplier`
//! 3. peak window in the region's local time: `floor(base * peak_factor)`
//! 4. otherwise: `base`
//!
//! Cost rules therefore always beat the peak-hour reduction.

use crate::cache::config::CacheConfig;
use crate::timing::TimeWindowClassifier;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cost class of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Economy,
    #[default]
    Standard,
    Premium,
}

/// Model id to cost tier lookup
#[derive(Debug, Clone, Default)]
pub struct ModelCostTable {
    tiers: BTreeMap<String, ModelTier>,
}

impl ModelCostTable {
    pub fn new(tiers: BTreeMap<String, ModelTier>) -> Self {
        Self { tiers }
    }

    /// Tier for `model`; unknown models are `Standard`
    pub fn tier_of(&self, model: &str) -> ModelTier {
        self.tiers.get(model).copied().unwrap_or_default()
    }

    pub fn is_top_tier(&self, model: &str) -> bool {
        self.tier_of(model) == ModelTier::Premium
    }
}

/// Built-in tier table
pub fn default_model_tiers() -> BTreeMap<String, ModelTier> {
    BTreeMap::from([
        ("gpt-4".to_string(), ModelTier::Premium),
        ("gpt-4o".to_string(), ModelTier::Premium),
        ("gpt-4-turbo".to_string(), ModelTier::Premium),
        ("gpt-4o-mini".to_string(), ModelTier::Economy),
        ("gpt-3.5-turbo".to_string(), ModelTier::Economy),
    ])
}

/// Which rule produced a TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlRule {
    PremiumModel,
    LargeResponse,
    Peak,
    Base,
}

impl fmt::Display for TtlRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtlRule::PremiumModel => write!(f, "premium_model"),
            TtlRule::LargeResponse => write!(f, "large_response"),
            TtlRule::Peak => write!(f, "peak"),
            TtlRule::Base => write!(f, "base"),
        }
    }
}

/// A TTL and the rule that chose it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlDecision {
    pub ttl_seconds: u64,
    pub rule: TtlRule,
}

/// Computes cache lifetimes from model cost, response size and load window
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    base_ttl_secs: u64,
    premium_multiplier: u64,
    large_response_tokens: u32,
    large_response_multiplier: u64,
    peak_factor: f64,
    models: ModelCostTable,
    classifier: TimeWindowClassifier,
}

impl TtlPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            base_ttl_secs: config.base_ttl.as_secs().max(1),
            premium_multiplier: config.premium_multiplier,
            large_response_tokens: config.large_response_tokens,
            large_response_multiplier: config.large_response_multiplier,
            peak_factor: config.peak_factor,
            models: ModelCostTable::new(config.model_tiers.clone()),
            classifier: TimeWindowClassifier::new(config.peak_windows.clone()),
        }
    }

    pub fn base_ttl_secs(&self) -> u64 {
        self.base_ttl_secs
    }

    pub fn models(&self) -> &ModelCostTable {
        &self.models
    }

    pub fn classifier(&self) -> &TimeWindowClassifier {
        &self.classifier
    }

    /// Pick the TTL for a response, `now_local` being the region's wall clock
    pub fn decide(&self, model: &str, tokens: u32, now_local: &DateTime<Tz>) -> TtlDecision {
        let base = self.base_ttl_secs;
        let (ttl_seconds, rule) = if self.models.is_top_tier(model) {
            (base.saturating_mul(self.premium_multiplier), TtlRule::PremiumModel)
        } else if tokens > self.large_response_tokens {
            (base.saturating_mul(self.large_response_multiplier), TtlRule::LargeResponse)
        } else if self.classifier.is_peak(now_local) {
            ((base as f64 * self.peak_factor).floor() as u64, TtlRule::Peak)
        } else {
            (base, TtlRule::Base)
        };
        TtlDecision {
            ttl_seconds: ttl_seconds.max(1),
            rule,
        }
    }

    pub fn compute_ttl(&self, model: &str, tokens: u32, now_local: &DateTime<Tz>) -> u64 {
        self.decide(model, tokens, now_local).ttl_seconds
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
