//! Application error type
//!
//! Engine crates report through their own error enums; this type covers the
//! failures of the surrounding runtime: configuration, page files and
//! widget mounting.

use std::path::PathBuf;

use ethoscan_page_dom::DomError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EthoscanError>;

#[derive(Debug, Error)]
pub enum EthoscanError {
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("invalid setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid page url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to mount widget: {0}")]
    Render(#[from] DomError),
}

impl EthoscanError {
    pub fn invalid_setting(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure is caused by user input rather than the runtime
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            EthoscanError::Config(_) | EthoscanError::InvalidSetting { .. } | EthoscanError::InvalidUrl(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EthoscanError::invalid_setting("wait.timeout_ms", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "invalid setting 'wait.timeout_ms': must be greater than zero"
        );
        assert!(err.is_user_error());

        let err = EthoscanError::io(
            "page.html",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().starts_with("failed to read page.html"));
        assert!(!err.is_user_error());
    }
}
