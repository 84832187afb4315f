//! Runtime configuration types and defaults.
//!
//! This module defines the options handed to the native parser: libxml2
//! parse option bits, EXSLT registration and the input size ceiling. Input
//! is always UTF-8, so the encoding is fixed rather than configurable.

use serde::{Deserialize, Serialize};
use std::ffi::CStr;
use std::path::Path;

/// libxml2 / libxml2-HTML parser option bits.
///
/// Only the flags this crate cares about are listed; any other bit is passed
/// through to the parser untouched.
pub mod parse_options {
    /// `XML_PARSE_RECOVER`: recover on errors
    pub const XML_PARSE_RECOVER: i32 = 1 << 0;
    /// `XML_PARSE_NOENT`: substitute entities
    pub const XML_PARSE_NOENT: i32 = 1 << 1;
    /// `XML_PARSE_NOERROR`: suppress error reports
    pub const XML_PARSE_NOERROR: i32 = 1 << 5;
    /// `XML_PARSE_NOWARNING`: suppress warning reports
    pub const XML_PARSE_NOWARNING: i32 = 1 << 6;
    /// `XML_PARSE_NONET`: forbid network access
    pub const XML_PARSE_NONET: i32 = 1 << 11;
    /// `HTML_PARSE_RECOVER`: relaxed parsing of malformed HTML
    pub const HTML_PARSE_RECOVER: i32 = 1 << 0;
    /// `HTML_PARSE_NOERROR`: suppress error reports
    pub const HTML_PARSE_NOERROR: i32 = 1 << 5;
    /// `HTML_PARSE_NOWARNING`: suppress warning reports
    pub const HTML_PARSE_NOWARNING: i32 = 1 << 6;
}

/// Encoding declared to the parser for every input (host strings are UTF-8)
pub const INPUT_ENCODING: &CStr = c"UTF-8";

/// Default XML parse options (strict parsing)
pub const DEFAULT_XML_PARSE_OPTIONS: i32 = 0;

/// Default HTML parse options (recovery mode)
pub const DEFAULT_HTML_PARSE_OPTIONS: i32 = parse_options::HTML_PARSE_RECOVER;

/// Largest input the native parser can address (its length argument is a C `int`)
pub const MAX_INPUT_BYTES: usize = i32::MAX as usize;

/// Configuration for the XSLT runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Option bits for `parse_xml` and `compile_stylesheet` (default: 0)
    #[serde(default = "default_xml_parse_options")]
    pub xml_parse_options: i32,

    /// Option bits for `parse_html` (default: HTML_PARSE_RECOVER)
    #[serde(default = "default_html_parse_options")]
    pub html_parse_options: i32,

    /// Register the EXSLT extension functions at engine start (default: true).
    ///
    /// Registration is process-wide and permanent: once any runtime has
    /// registered EXSLT, a later runtime configured with `false` still sees
    /// the extension functions.
    #[serde(default = "default_true")]
    pub register_exslt: bool,

    /// Reject inputs longer than this many bytes (default: `i32::MAX`)
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            xml_parse_options: DEFAULT_XML_PARSE_OPTIONS,
            html_parse_options: DEFAULT_HTML_PARSE_OPTIONS,
            register_exslt: true,
            max_input_bytes: MAX_INPUT_BYTES,
        }
    }
}

impl RuntimeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Set the XML parse options
    pub fn with_xml_parse_options(mut self, options: i32) -> Self {
        self.xml_parse_options = options;
        self
    }

    /// Set the HTML parse options
    pub fn with_html_parse_options(mut self, options: i32) -> Self {
        self.html_parse_options = options;
        self
    }

    /// Enable or disable EXSLT registration
    pub fn with_exslt(mut self, enable: bool) -> Self {
        self.register_exslt = enable;
        self
    }

    /// Set the input size ceiling
    pub fn with_max_input_bytes(mut self, bytes: usize) -> Self {
        self.max_input_bytes = bytes;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.html_parse_options & parse_options::HTML_PARSE_RECOVER == 0 {
            return Err(ConfigError::InvalidValue {
                field: "html_parse_options".into(),
                reason: "must include HTML_PARSE_RECOVER".into(),
            });
        }

        if self.max_input_bytes == 0 || self.max_input_bytes > MAX_INPUT_BYTES {
            return Err(ConfigError::InvalidValue {
                field: "max_input_bytes".into(),
                reason: format!("must be between 1 and {}", MAX_INPUT_BYTES),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field name
        field: String,
        /// The reason it's invalid
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Default value functions for serde
fn default_xml_parse_options() -> i32 {
    DEFAULT_XML_PARSE_OPTIONS
}

fn default_html_parse_options() -> i32 {
    DEFAULT_HTML_PARSE_OPTIONS
}

fn default_true() -> bool {
    true
}

fn default_max_input_bytes() -> usize {
    MAX_INPUT_BYTES
}
