/// Handling for upstream provider credentials
use std::fmt;

/// A provider API key. The wrapper exists so that the key never shows up in `Debug` output
/// (configs get logged at startup) and so that provider messages can be scrubbed of it.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a key, treating empty or whitespace-only values as absent.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl std::str::FromStr for ApiKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or_else(|| "API key must not be empty".to_string())
    }
}

/// Replaces every occurrence of the given key in a provider message.
pub fn redact(message: &str, key: Option<&ApiKey>) -> String {
    match key {
        Some(key) => message.replace(key.expose(), "[REDACTED]"),
        None => message.to_string(),
    }
}
