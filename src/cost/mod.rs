//! Request complexity scoring and advisory cost optimization

pub mod complexity;
pub mod optimizer;

pub use complexity::{ComplexityScorer, ComplexitySignals, ComplexityWeights};
pub use optimizer::{
    CostOptimizer, OptimizationAudit, OptimizationDecision, OptimizationRequest, OptimizerConfig,
    UserTier,
};
