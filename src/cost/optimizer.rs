//! Advisory cost optimizer
//!
//! Turns a request's complexity and the user's daily spend into hints for the
//! upstream client. It never blocks; every decision is kept in a bounded
//! audit trail, pruned to the analytics retention window.

use crate::clock::Clock;
use crate::cost::complexity::ComplexityScorer;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Subscription tier as reported by the billing collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    Free,
    Premium,
}

/// Optimizer thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Scores at or below this suggest the cheaper model
    pub cheap_model_threshold: u8,
    /// Scores at or above this suggest compressing context
    pub compress_threshold: u8,
    /// Text longer than this (in chars) suggests compressing context
    pub compress_length_chars: usize,
    /// Fraction of the daily budget above which tokens should be reduced
    pub reduce_tokens_ratio: f64,
    /// Fraction of the daily budget above which the fallback path should be used
    pub fallback_ratio: f64,
    /// Maximum audit entries kept in memory
    pub audit_capacity: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            cheap_model_threshold: 3,
            compress_threshold: 3,
            compress_length_chars: 500,
            reduce_tokens_ratio: 0.8,
            fallback_ratio: 0.9,
            audit_capacity: 1_000,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.reduce_tokens_ratio) {
            return Err("reduce_tokens_ratio must be between 0.0 and 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.fallback_ratio) {
            return Err("fallback_ratio must be between 0.0 and 1.0".to_string());
        }
        if self.audit_capacity == 0 {
            return Err("audit_capacity must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Inputs to one optimization decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub user_id: String,
    pub text: String,
    pub daily_usage: f64,
    pub daily_budget: f64,
    /// No default; callers state the tier explicitly
    pub tier: UserTier,
}

/// Advisory flags for the upstream call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OptimizationDecision {
    pub use_cheaper_model: bool,
    pub reduce_tokens: bool,
    pub enable_caching: bool,
    pub compress_context: bool,
    pub use_fallback: bool,
}

/// One recorded decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationAudit {
    pub id: Uuid,
    pub user_id: String,
    pub recorded_at: DateTime<Utc>,
    pub score: u8,
    pub text_chars: usize,
    pub daily_usage: f64,
    pub daily_budget: f64,
    pub tier: UserTier,
    pub decision: OptimizationDecision,
}

/// Cost optimizer with audit trail
pub struct CostOptimizer {
    scorer: ComplexityScorer,
    config: OptimizerConfig,
    clock: Arc<dyn Clock>,
    audit_retention: Duration,
    audit: Mutex<VecDeque<OptimizationAudit>>,
}

impl CostOptimizer {
    /// `audit_retention` bounds how long audit entries are kept
    pub fn new(
        scorer: ComplexityScorer,
        config: OptimizerConfig,
        clock: Arc<dyn Clock>,
        audit_retention: Duration,
    ) -> Self {
        Self {
            scorer,
            config,
            clock,
            audit_retention,
            audit: Mutex::new(VecDeque::new()),
        }
    }

    pub fn scorer(&self) -> &ComplexityScorer {
        &self.scorer
    }

    /// Compute advisory flags and record the inputs
    pub fn optimize(&self, request: &OptimizationRequest) -> OptimizationDecision {
        let score = self.scorer.score(&request.text);
        let text_chars = request.text.chars().count();
        let cfg = &self.config;

        let decision = OptimizationDecision {
            use_cheaper_model: score <= cfg.cheap_model_threshold
                || request.tier == UserTier::Free,
            reduce_tokens: request.daily_usage > cfg.reduce_tokens_ratio * request.daily_budget,
            enable_caching: true,
            compress_context: score >= cfg.compress_threshold
                || text_chars > cfg.compress_length_chars,
            use_fallback: request.daily_usage > cfg.fallback_ratio * request.daily_budget,
        };

        debug!(
            user_id = %request.user_id,
            score,
            ?decision,
            "cost optimization decision"
        );

        self.record(OptimizationAudit {
            id: Uuid::new_v4(),
            user_id: request.user_id.clone(),
            recorded_at: self.clock.now(),
            score,
            text_chars,
            daily_usage: request.daily_usage,
            daily_budget: request.daily_budget,
            tier: request.tier,
            decision,
        });

        decision
    }

    /// Audit entries, optionally filtered to one user, oldest first
    pub fn audit_trail(&self, user_id: Option<&str>) -> Vec<OptimizationAudit> {
        let cutoff = self.clock.now() - self.audit_retention;
        let mut audit = self.audit.lock().unwrap_or_else(|p| p.into_inner());
        audit.retain(|a| a.recorded_at >= cutoff);
        audit
            .iter()
            .filter(|a| user_id.map_or(true, |u| a.user_id == u))
            .cloned()
            .collect()
    }

    /// Drop every audit entry for `user_id`, returning how many were removed
    pub fn forget_user(&self, user_id: &str) -> usize {
        let mut audit = self.audit.lock().unwrap_or_else(|p| p.into_inner());
        let before = audit.len();
        audit.retain(|a| a.user_id != user_id);
        before - audit.len()
    }

    fn record(&self, entry: OptimizationAudit) {
        let cutoff = entry.recorded_at - self.audit_retention;
        let mut audit = self.audit.lock().unwrap_or_else(|p| p.into_inner());
        audit.retain(|a| a.recorded_at >= cutoff);
        while audit.len() >= self.config.audit_capacity.max(1) {
            audit.pop_front();
        }
        audit.push_back(entry);
    }
}
