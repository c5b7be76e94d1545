//! Backend key layout for user data
//!
//! ```text
//! memory:{user_id}:{record_id}
//! consent:{user_id}:{purpose}
//! preferences:{user_id}
//! ```

use crate::error::{CoreError, Result};
use crate::retention::consent::ConsentPurpose;

pub const MEMORY_NAMESPACE: &str = "memory:";
pub const CONSENT_NAMESPACE: &str = "consent:";
pub const PREFERENCES_NAMESPACE: &str = "preferences:";

/// Reject user ids that would break the key layout
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(CoreError::ValidationError("user id must not be empty".to_string()));
    }
    if user_id.contains(':') || user_id.chars().any(char::is_whitespace) {
        return Err(CoreError::ValidationError(format!(
            "user id '{}' must not contain ':' or whitespace",
            user_id
        )));
    }
    Ok(())
}

pub fn memory_prefix(user_id: &str) -> String {
    format!("{}{}:", MEMORY_NAMESPACE, user_id)
}

pub fn memory_key(user_id: &str, record_id: &str) -> String {
    format!("{}{}", memory_prefix(user_id), record_id)
}

pub fn consent_prefix(user_id: &str) -> String {
    format!("{}{}:", CONSENT_NAMESPACE, user_id)
}

pub fn consent_key(user_id: &str, purpose: ConsentPurpose) -> String {
    format!("{}{}", consent_prefix(user_id), purpose.as_str())
}

pub fn preferences_key(user_id: &str) -> String {
    format!("{}{}", PREFERENCES_NAMESPACE, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(memory_key("u1", "abc"), "memory:u1:abc");
        assert_eq!(
            consent_key("u1", ConsentPurpose::PreferenceLearning),
            "consent:u1:preference_learning"
        );
        assert_eq!(preferences_key("u1"), "preferences:u1");
        // Prefix scans for u1 must not pick up u10
        assert!(!memory_key("u10", "abc").starts_with(&memory_prefix("u1")));
    }

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("user-42").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("a:b").is_err());
        assert!(validate_user_id("a b").is_err());
    }
}
