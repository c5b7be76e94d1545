//! Configuration for the response cache

use crate::cache::ttl::{default_model_tiers, ModelTier};
use crate::timing::{default_peak_windows, default_region_zones, PeakWindow, RegionZones};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for the response cache
///
/// Defaults:
/// - Base TTL: 1 hour
/// - Top-tier models: 4x base, responses over 2000 tokens: 2x base
/// - Peak hours: half the base TTL
/// - Default region `BR` (America/Sao_Paulo)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Base time-to-live for cache entries
    pub base_ttl: Duration,

    /// TTL multiplier for top-tier models
    pub premium_multiplier: u64,

    /// Token count above which a response counts as large
    pub large_response_tokens: u32,

    /// TTL multiplier for large responses
    pub large_response_multiplier: u64,

    /// TTL factor during peak windows (0.0 - 1.0]
    pub peak_factor: f64,

    /// Model id to cost tier
    pub model_tiers: BTreeMap<String, ModelTier>,

    /// Local-time peak windows
    pub peak_windows: Vec<PeakWindow>,

    /// Region code to IANA zone name
    pub region_zones: BTreeMap<String, String>,

    /// Region used when a request carries none
    pub default_region: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_ttl: Duration::from_secs(3600),
            premium_multiplier: 4,
            large_response_tokens: 2000,
            large_response_multiplier: 2,
            peak_factor: 0.5,
            model_tiers: default_model_tiers(),
            peak_windows: default_peak_windows(),
            region_zones: default_region_zones(),
            default_region: "BR".to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.base_ttl.as_secs() == 0 {
            return Err("base_ttl must be at least one second".to_string());
        }

        if self.premium_multiplier == 0 || self.large_response_multiplier == 0 {
            return Err("TTL multipliers must be greater than 0".to_string());
        }

        if !(self.peak_factor > 0.0 && self.peak_factor <= 1.0) {
            return Err("peak_factor must be in (0.0, 1.0]".to_string());
        }

        for window in &self.peak_windows {
            window.validate()?;
        }

        RegionZones::from_names(&self.region_zones)?;

        if !self
            .region_zones
            .keys()
            .any(|r| r.eq_ignore_ascii_case(&self.default_region))
        {
            return Err(format!(
                "default_region '{}' has no configured time zone",
                self.default_region
            ));
        }

        Ok(())
    }

    /// Resolved region zone table
    pub fn zones(&self) -> Result<RegionZones, String> {
        RegionZones::from_names(&self.region_zones)
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    base_ttl: Option<Duration>,
    premium_multiplier: Option<u64>,
    large_response_tokens: Option<u32>,
    large_response_multiplier: Option<u64>,
    peak_factor: Option<f64>,
    model_tiers: Option<BTreeMap<String, ModelTier>>,
    peak_windows: Option<Vec<PeakWindow>>,
    region_zones: Option<BTreeMap<String, String>>,
    default_region: Option<String>,
}

impl CacheConfigBuilder {
    /// Set base TTL for cache entries
    pub fn base_ttl(mut self, ttl: Duration) -> Self {
        self.base_ttl = Some(ttl);
        self
    }

    pub fn premium_multiplier(mut self, multiplier: u64) -> Self {
        self.premium_multiplier = Some(multiplier);
        self
    }

    pub fn large_response_tokens(mut self, tokens: u32) -> Self {
        self.large_response_tokens = Some(tokens);
        self
    }

    pub fn large_response_multiplier(mut self, multiplier: u64) -> Self {
        self.large_response_multiplier = Some(multiplier);
        self
    }

    pub fn peak_factor(mut self, factor: f64) -> Self {
        self.peak_factor = Some(factor);
        self
    }

    /// Register or override a single model's tier
    pub fn model_tier(mut self, model: impl Into<String>, tier: ModelTier) -> Self {
        self.model_tiers
            .get_or_insert_with(default_model_tiers)
            .insert(model.into(), tier);
        self
    }

    pub fn peak_windows(mut self, windows: Vec<PeakWindow>) -> Self {
        self.peak_windows = Some(windows);
        self
    }

    /// Register or override a region's time zone
    pub fn region_zone(mut self, region: impl Into<String>, zone: impl Into<String>) -> Self {
        self.region_zones
            .get_or_insert_with(default_region_zones)
            .insert(region.into(), zone.into());
        self
    }

    pub fn default_region(mut self, region: impl Into<String>) -> Self {
        self.default_region = Some(region.into());
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            base_ttl: self.base_ttl.unwrap_or(defaults.base_ttl),
            premium_multiplier: self.premium_multiplier.unwrap_or(defaults.premium_multiplier),
            large_response_tokens: self
                .large_response_tokens
                .unwrap_or(defaults.large_response_tokens),
            large_response_multiplier: self
                .large_response_multiplier
                .unwrap_or(defaults.large_response_multiplier),
            peak_factor: self.peak_factor.unwrap_or(defaults.peak_factor),
            model_tiers: self.model_tiers.unwrap_or(defaults.model_tiers),
            peak_windows: self.peak_windows.unwrap_or(defaults.peak_windows),
            region_zones: self.region_zones.unwrap_or(defaults.region_zones),
            default_region: self.default_region.unwrap_or(defaults.default_region),
        }
    }
}
