//! Consent-gated memory with per-category retention
//!
//! - [`policy`]: retention windows per data category
//! - [`consent`]: per-purpose consent ledger, default-deny
//! - [`memory`]: memory records and preferences, erasure and export
//! - [`reconciler`]: re-attaches missing expirations

pub mod consent;
pub mod keys;
pub mod memory;
pub mod policy;
pub mod reconciler;

pub use consent::{ConsentLedger, ConsentPurpose, ConsentRecord};
pub use memory::{ErasureReport, MemoryRecord, MemoryStore, Preferences, RecordId, UserBundle};
pub use policy::{DataCategory, MemoryCategory, RetentionPolicy};
pub use reconciler::{ExpiryReconciler, ReconcileReport};
