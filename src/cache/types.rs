//! Core type definitions for the response cache

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type, always of the form `cache:{region}:{model}:{hash}`
pub type CacheKey = String;

/// Cache value type - stores a serialized [`CachedResponse`]
pub type CacheValue = String;

/// A model answer worth reusing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Response text as returned by the model
    pub text: String,

    /// Tokens the response consumed
    pub tokens: u32,

    /// Model that produced it
    pub model: String,
}

impl CachedResponse {
    pub fn new(text: impl Into<String>, tokens: u32, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens,
            model: model.into(),
        }
    }
}

/// Client surface a request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Web,
    Mobile,
}

impl Channel {
    pub fn is_mobile(&self) -> bool {
        matches!(self, Channel::Mobile)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Web => write!(f, "web"),
            Channel::Mobile => write!(f, "mobile"),
        }
    }
}
