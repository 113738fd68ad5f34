//! Error types for the document router.
//!
//! Errors fall into two groups:
//!
//! **Fatal, construction-time errors** surface from `DocumentRouter::new`,
//! `RouterBuilder::build`, `OverrideSet::compile` and `RouterHandle::reload`:
//! - `Configuration` - inconsistent or invalid router configuration
//! - `Pattern` - an override expression that does not compile
//! - `Io` / `Serialization` - configuration files that cannot be read or decoded
//!
//! **Recoverable errors** are produced by layout analysers and model clients
//! and never escape `route()`:
//! - `MissingLayoutData`, `MissingContent`, `UnsupportedContent`, `Parsing`
//! - `Transport`, `Timeout`, `EmptyInference`
//!
//! # Example
//!
//! ```rust
//! use idp_router::{Result, RouterError};
//!
//! fn require_name(name: &str) -> Result<&str> {
//!     if name.trim().is_empty() {
//!         return Err(RouterError::configuration("strategy name cannot be empty"));
//!     }
//!     Ok(name)
//! }
//!
//! assert!(require_name("textract").is_ok());
//! assert!(require_name(" ").is_err());
//! ```
use thiserror::Error;

/// Result type alias using `RouterError`.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Main error type for all router operations.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid override pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Parsing error: {message}")]
    Parsing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Layout model transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Missing layout data for '{0}'")]
    MissingLayoutData(String),

    #[error("No document content available for '{0}'")]
    MissingContent(String),

    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),

    #[error("Layout model timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Layout model returned no pages for '{0}'")]
    EmptyInference(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        RouterError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(feature = "pdf")]
impl From<lopdf::Error> for RouterError {
    fn from(err: lopdf::Error) -> Self {
        RouterError::Parsing {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(feature = "http-model")]
impl From<reqwest::Error> for RouterError {
    fn from(err: reqwest::Error) -> Self {
        RouterError::Transport {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

macro_rules! error_constructor {
    ($name:ident, $variant:ident) => {
        pastey::paste! {
            #[doc = "Create a " $variant " error"]
            pub fn $name<S: Into<String>>(message: S) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: None,
                }
            }

            #[doc = "Create a " $variant " error with source"]
            pub fn [<$name _with_source>]<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
                message: S,
                source: E,
            ) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: Some(Box::new(source)),
                }
            }
        }
    };
}

impl RouterError {
    error_constructor!(configuration, Configuration);
    error_constructor!(serialization, Serialization);
    error_constructor!(parsing, Parsing);
    error_constructor!(transport, Transport);

    /// Whether the failure is confined to a single analysis attempt.
    ///
    /// Recoverable errors are absorbed by fallback analysers and by the router;
    /// everything else is a construction-time failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RouterError::MissingLayoutData(_)
                | RouterError::MissingContent(_)
                | RouterError::UnsupportedContent(_)
                | RouterError::Parsing { .. }
                | RouterError::Transport { .. }
                | RouterError::Timeout { .. }
                | RouterError::EmptyInference(_)
                | RouterError::Other(_)
        )
    }

    /// Whether a model call that failed this way is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, RouterError::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error() {
        let err = RouterError::configuration("static mode requires a static strategy");
        assert_eq!(
            err.to_string(),
            "Configuration error: static mode requires a static strategy"
        );
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_configuration_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad value");
        let err = RouterError::configuration_with_source("invalid thresholds", source);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_pattern_error_names_pattern() {
        let source = regex::Regex::new("(unclosed").unwrap_err();
        let err = RouterError::Pattern {
            pattern: "(unclosed".to_string(),
            source,
        };
        assert!(err.to_string().contains("'(unclosed'"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_analyser_errors_are_recoverable() {
        assert!(RouterError::MissingLayoutData("a.pdf".to_string()).is_recoverable());
        assert!(RouterError::MissingContent("a.pdf".to_string()).is_recoverable());
        assert!(RouterError::UnsupportedContent("video/mp4".to_string()).is_recoverable());
        assert!(RouterError::parsing("corrupt xref").is_recoverable());
    }

    #[test]
    fn test_transport_errors() {
        let err = RouterError::transport("connection refused");
        assert!(err.is_recoverable());
        assert!(err.is_transient());

        let timeout = RouterError::Timeout { timeout_ms: 250 };
        assert_eq!(timeout.to_string(), "Layout model timed out after 250ms");
        assert!(timeout.is_recoverable());
        assert!(!timeout.is_transient());
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: RouterError = json_err.into();
        assert!(matches!(err, RouterError::Serialization { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_io_error_bubbles_unchanged() {
        fn read_config() -> Result<String> {
            Ok(std::fs::read_to_string("/nonexistent/idp-router.toml")?)
        }

        assert!(matches!(read_config().unwrap_err(), RouterError::Io(_)));
    }
}
