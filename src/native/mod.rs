//! Interface to the native XML/XSLT engine.
//!
//! The engine is an external collaborator: it parses, compiles, applies and
//! evaluates, and hands back opaque pointers that must be released through
//! its own free functions. This module only describes that surface. The
//! ownership rules live in [`crate::engine::handle`].

#[cfg(feature = "libxslt")]
mod ffi;
#[cfg(feature = "libxslt")]
pub mod libxslt;
#[cfg(test)]
pub(crate) mod mock;

use crate::engine::params::ParamList;
use serde::{Deserialize, Serialize};
use std::ffi::{c_void, CStr};
use std::ptr::NonNull;

macro_rules! raw_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(NonNull<c_void>);

        impl $name {
            /// Wrap a pointer returned by the engine; `None` if it is null
            pub fn from_ptr<T>(ptr: *mut T) -> Option<Self> {
                NonNull::new(ptr.cast::<c_void>()).map(Self)
            }

            /// Wrap a pointer already known to be non-null
            pub fn from_nonnull(ptr: NonNull<c_void>) -> Self {
                Self(ptr)
            }

            /// The underlying pointer
            pub fn as_ptr<T>(self) -> *mut T {
                self.0.as_ptr().cast::<T>()
            }

            /// The underlying pointer as `NonNull`
            pub fn as_nonnull(self) -> NonNull<c_void> {
                self.0
            }
        }
    };
}

raw_handle!(
    /// Parsed document (`xmlDocPtr`)
    RawDocument
);

raw_handle!(
    /// Compiled stylesheet (`xsltStylesheetPtr`)
    RawStylesheet
);

raw_handle!(
    /// XPath evaluation context (`xmlXPathContextPtr`)
    RawXPathContext
);

/// Result of an XPath evaluation, copied out of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum XPathValue {
    /// String-value of each selected node, in document order
    NodeSet(Vec<String>),
    /// Boolean result
    Boolean(bool),
    /// Numeric result
    Number(f64),
    /// String result
    String(String),
    /// Engine result kinds with no portable representation
    Undefined,
}

/// The native engine surface the runtime drives.
///
/// Methods that take raw handles are `unsafe`: the caller guarantees the
/// handles came from this engine and have not been freed. Functions returning
/// `Option` map the engine's NULL return to `None`.
pub trait Engine {
    /// Engine name for logging
    fn name(&self) -> &'static str;

    /// Process-wide setup. Must be idempotent; the runtime calls it once per
    /// construction.
    fn initialize(&self);

    /// Parse strict XML
    fn read_xml(&self, input: &[u8], encoding: &CStr, options: i32) -> Option<RawDocument>;

    /// Parse HTML
    fn read_html(&self, input: &[u8], encoding: &CStr, options: i32) -> Option<RawDocument>;

    /// Free a document
    ///
    /// # Safety
    /// `doc` must be live and must not be used afterwards.
    unsafe fn free_document(&self, doc: RawDocument);

    /// Compile a parsed document into a stylesheet. On success the stylesheet
    /// owns `doc`; on failure the caller still owns it.
    ///
    /// # Safety
    /// `doc` must be live.
    unsafe fn compile_stylesheet(&self, doc: RawDocument) -> Option<RawStylesheet>;

    /// Free a stylesheet and the document it owns
    ///
    /// # Safety
    /// `stylesheet` must be live and must not be used afterwards.
    unsafe fn free_stylesheet(&self, stylesheet: RawStylesheet);

    /// Apply a stylesheet, producing a new result document owned by the caller
    ///
    /// # Safety
    /// Both handles must be live.
    unsafe fn apply_stylesheet(
        &self,
        stylesheet: RawStylesheet,
        doc: RawDocument,
        params: &ParamList,
    ) -> Option<RawDocument>;

    /// Serialize a transform result using the stylesheet's output settings
    ///
    /// # Safety
    /// Both handles must be live.
    unsafe fn save_result(&self, result: RawDocument, stylesheet: RawStylesheet)
        -> Option<Vec<u8>>;

    /// Serialize a document as XML
    ///
    /// # Safety
    /// `doc` must be live.
    unsafe fn serialize_document(&self, doc: RawDocument) -> Option<Vec<u8>>;

    /// Create an XPath context over a document
    ///
    /// # Safety
    /// `doc` must be live and outlive the context.
    unsafe fn new_xpath_context(&self, doc: RawDocument) -> Option<RawXPathContext>;

    /// Register a namespace prefix; `false` if the engine refused it
    ///
    /// # Safety
    /// `ctx` must be live.
    unsafe fn register_namespace(&self, ctx: RawXPathContext, prefix: &CStr, uri: &CStr) -> bool;

    /// Evaluate an expression; `None` if it could not be evaluated
    ///
    /// # Safety
    /// `ctx` must be live.
    unsafe fn eval_xpath(&self, ctx: RawXPathContext, expr: &CStr) -> Option<XPathValue>;

    /// Free an XPath context
    ///
    /// # Safety
    /// `ctx` must be live and must not be used afterwards.
    unsafe fn free_xpath_context(&self, ctx: RawXPathContext);
}
