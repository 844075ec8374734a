//! Error types for anchor resolution
//!
//! None of these escape a resolution pass: each one is recovered locally by
//! moving on to the next rule or stage, and shows up only in the decision
//! trace. [`LocatorError::Exhausted`] is what [`crate::Resolution::into_result`]
//! reports when every stage failed.

use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// Selector found no node (malformed selectors land here too)
    #[error("no match for selector '{0}'")]
    NoMatch(String),

    /// Node matched structurally but is detached or not rendered
    #[error("candidate for '{selector}' is not a valid anchor: {reason}")]
    InvalidCandidate { selector: String, reason: String },

    /// Node matched and is visible, but the rule's validator refused it
    #[error("candidate for '{selector}' rejected by validator '{validator}'")]
    Rejected {
        selector: String,
        validator: &'static str,
    },

    /// Dynamic wait elapsed without a valid match
    #[error("timed out after {timeout_ms}ms waiting for '{selector}'")]
    Timeout { selector: String, timeout_ms: u64 },

    /// Every stage was exhausted
    #[error("no anchor point found for site '{0}'")]
    Exhausted(String),
}

impl LocatorError {
    /// Whether re-running resolution later might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LocatorError::Timeout { .. } | LocatorError::Exhausted(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let timeout = LocatorError::Timeout {
            selector: "main".into(),
            timeout_ms: 3000,
        };
        assert!(timeout.is_retryable());
        assert!(!LocatorError::NoMatch("x".into()).is_retryable());
        assert_eq!(
            LocatorError::Exhausted("debank".into()).to_string(),
            "no anchor point found for site 'debank'"
        );
    }
}
