//! Error types for the XSLT runtime.
//!
//! This module defines error codes, the serializable error report handed to
//! the host, and the main error type used throughout the crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input larger than the parser accepts
    InvalidArgument,
    /// Transform parameter array has the wrong shape
    ParamValidation,
    /// Namespace array has the wrong shape or a namespace failed to register
    NamespaceError,
    /// Memory could not be allocated
    AllocationError,
    /// Input could not be parsed as XML/HTML
    ParseFailure,
    /// Parsed document is not a valid stylesheet
    CompileFailure,
    /// The engine rejected the transformation
    ApplyFailure,
    /// XPath expression could not be evaluated
    BadExpression,
    /// Result could not be serialized
    SerializationError,
    /// Invalid runtime configuration
    ConfigError,
}

impl ErrorCode {
    /// Wire name of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::ParamValidation => "PARAM_VALIDATION",
            ErrorCode::NamespaceError => "NAMESPACE_ERROR",
            ErrorCode::AllocationError => "ALLOCATION_ERROR",
            ErrorCode::ParseFailure => "PARSE_FAILURE",
            ErrorCode::CompileFailure => "COMPILE_FAILURE",
            ErrorCode::ApplyFailure => "APPLY_FAILURE",
            ErrorCode::BadExpression => "BAD_EXPRESSION",
            ErrorCode::SerializationError => "SERIALIZATION_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
        }
    }

}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of markup handed to a parse operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Strict XML
    Xml,
    /// HTML parsed in recovery mode
    Html,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Xml => f.write_str("XML"),
            SourceKind::Html => f.write_str("HTML"),
        }
    }
}

/// Which transform parameter array an argument came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamSequence {
    /// Values passed to the engine as XPath expressions
    Expression,
    /// Values passed to the engine as quoted string literals
    Literal,
}

impl fmt::Display for ParamSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSequence::Expression => f.write_str("Param"),
            ParamSequence::Literal => f.write_str("StringParam"),
        }
    }
}

/// Error report handed back to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XsltError {
    /// Error code
    pub code: ErrorCode,

    /// Human-readable message
    pub message: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl XsltError {
    /// Create a new error report
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Add context
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Display for XsltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for XsltError {}

/// Main error type for the runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A flat key/value parameter array has an odd length
    #[error("{sequence} array contains an odd number of parameters ({len})")]
    OddParams {
        /// The offending array
        sequence: ParamSequence,
        /// Its length
        len: usize,
    },

    /// The flat prefix/URI array has an odd length
    #[error("Namespace array contains an odd number of parameters ({len})")]
    OddNamespaces {
        /// Its length
        len: usize,
    },

    /// A transform parameter name or value contains a NUL byte
    #[error("{what} contains a NUL byte at offset {offset}")]
    InvalidParam {
        /// Which parameter, e.g. `StringParam value #2`
        what: String,
        /// Byte offset of the NUL
        offset: usize,
    },

    /// A namespace prefix or URI contains a NUL byte
    #[error("{what} contains a NUL byte at offset {offset}")]
    InvalidNamespace {
        /// Which entry, e.g. `Namespace URI #0`
        what: String,
        /// Byte offset of the NUL
        offset: usize,
    },

    /// An XPath expression contains a NUL byte
    #[error("XPath expression contains a NUL byte at offset {offset}")]
    InvalidExpression {
        /// Byte offset of the NUL
        offset: usize,
    },

    /// Input larger than the configured ceiling
    #[error("Input of {len} bytes exceeds the limit of {limit} bytes")]
    InputTooLarge {
        /// Input length
        len: usize,
        /// Configured limit
        limit: usize,
    },

    /// Memory exhaustion while marshaling arguments
    #[error("Failed to allocate memory for {what}")]
    Allocation {
        /// What was being allocated
        what: &'static str,
    },

    /// The parser rejected the input
    #[error("Failed to parse {0}")]
    Parse(SourceKind),

    /// The XSLT compiler rejected the parsed document
    #[error("Failed to parse stylesheet")]
    Compile,

    /// The engine failed to apply a stylesheet
    #[error("Failed to apply stylesheet")]
    Apply,

    /// A namespace could not be registered on the XPath context
    #[error("Failed to register namespace '{prefix}' => '{uri}'")]
    NamespaceRegistration {
        /// Namespace prefix
        prefix: String,
        /// Namespace URI
        uri: String,
    },

    /// The engine could not create an XPath context
    #[error("Failed to create new xpath context")]
    XPathContext,

    /// The expression could not be evaluated
    #[error("Bad xpath: {0}")]
    BadXPath(String),

    /// A document or result could not be serialized
    #[error("Failed to serialize {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl RuntimeError {
    /// Classify the error
    pub fn code(&self) -> ErrorCode {
        match self {
            RuntimeError::OddParams { .. } | RuntimeError::InvalidParam { .. } => {
                ErrorCode::ParamValidation
            }
            RuntimeError::OddNamespaces { .. }
            | RuntimeError::InvalidNamespace { .. }
            | RuntimeError::NamespaceRegistration { .. } => ErrorCode::NamespaceError,
            RuntimeError::InputTooLarge { .. } => ErrorCode::InvalidArgument,
            RuntimeError::Allocation { .. } | RuntimeError::XPathContext => {
                ErrorCode::AllocationError
            }
            RuntimeError::Parse(_) => ErrorCode::ParseFailure,
            RuntimeError::Compile => ErrorCode::CompileFailure,
            RuntimeError::Apply => ErrorCode::ApplyFailure,
            RuntimeError::BadXPath(_) | RuntimeError::InvalidExpression { .. } => {
                ErrorCode::BadExpression
            }
            RuntimeError::Serialization(_) => ErrorCode::SerializationError,
            RuntimeError::Config(_) => ErrorCode::ConfigError,
        }
    }

    /// Convert to XsltError for returning to JavaScript
    pub fn to_xslt_error(&self) -> XsltError {
        let report = XsltError::new(self.code(), self.to_string());
        match self {
            RuntimeError::OddParams { sequence, len } => report.with_context(serde_json::json!({
                "sequence": sequence.to_string(),
                "length": len,
            })),
            RuntimeError::OddNamespaces { len } => {
                report.with_context(serde_json::json!({ "length": len }))
            }
            RuntimeError::NamespaceRegistration { prefix, uri } => {
                report.with_context(serde_json::json!({ "prefix": prefix, "uri": uri }))
            }
            RuntimeError::BadXPath(expr) => {
                report.with_context(serde_json::json!({ "expression": expr }))
            }
            _ => report,
        }
    }
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
