//! # XSLT Bridge
//!
//! This library lets a garbage-collected host drive a native XML/XSLT
//! engine (libxml2 and libxslt). It parses XML and HTML, compiles
//! stylesheets, evaluates XPath and applies transforms, and makes sure
//! every native handle it hands out is freed exactly once, after the host
//! drops its last reference.
//!
//! ## Architecture
//!
//! ```text
//! Node.js
//!     │
//!     │ N-API (feature "node")
//!     ▼
//! XsltRuntime (this crate)
//!     │  OwnedHandle · ParamList · NamespaceList
//!     │
//!     │ native::Engine
//!     ▼
//! libxml2 / libxslt / libexslt (feature "libxslt")
//! ```
//!
//! ## Features
//!
//! - **Single ownership**: each native handle has exactly one owner and one
//!   destructor call
//! - **Validated marshaling**: parameter and namespace arrays are checked
//!   before the engine is touched
//! - **Leak-free failure paths**: per-call native resources are released on
//!   every exit
//! - **Observability**: `tracing` spans and per-handle metrics

#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod native;
#[cfg(feature = "node")]
pub mod napi;

// Re-export commonly used types
pub use config::RuntimeConfig;
pub use engine::{Document, Stylesheet, XPathValue, XsltRuntime};
pub use error::{ErrorCode, RuntimeError, XsltError};
pub use metrics::RuntimeStats;
pub use native::Engine;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
