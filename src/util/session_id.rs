//! Session IDs for update channel connections.
//!
//! Every connection attempt gets its own ID so log lines from one session
//! can be told apart from the next after a reconnect.

use uuid::Uuid;

/// Identifier of one update channel session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the session ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_differ() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);

        // UUID format: 36 chars with hyphens
        assert_eq!(a.as_str().len(), 36);
        assert_eq!(a.to_string(), a.as_str());
    }
}
