//! XPath evaluation support: namespace registration and the per-call context.

use super::handle::Document;
use crate::error::{Result, RuntimeError};
use crate::metrics::{MetricsCollector, ResourceKind};
use crate::native::{Engine, RawXPathContext};
use std::ffi::{CStr, CString};
use tracing::trace;

pub use crate::native::XPathValue;

/// Prefix/URI pairs to register before evaluating an expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceList {
    pairs: Vec<(CString, CString)>,
}

impl NamespaceList {
    /// Parse a flat `[prefix, uri, prefix, uri, ...]` array.
    ///
    /// Fails on an odd length or a NUL byte, before any context is created.
    pub fn parse<S: AsRef<str>>(flat: &[S]) -> Result<Self> {
        if flat.len() % 2 != 0 {
            return Err(RuntimeError::OddNamespaces { len: flat.len() });
        }

        let mut pairs: Vec<(CString, CString)> = Vec::new();
        pairs
            .try_reserve_exact(flat.len() / 2)
            .map_err(|_| RuntimeError::Allocation { what: "namespace list" })?;
        for (index, pair) in flat.chunks_exact(2).enumerate() {
            let prefix = c_string("Namespace prefix", index, pair[0].as_ref())?;
            let uri = c_string("Namespace URI", index, pair[1].as_ref())?;
            pairs.push((prefix, uri));
        }
        Ok(Self { pairs })
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there is nothing to register
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&CStr, &CStr)> {
        self.pairs.iter().map(|(p, u)| (p.as_c_str(), u.as_c_str()))
    }
}

fn c_string(what: &str, index: usize, value: &str) -> Result<CString> {
    CString::new(value).map_err(|e| RuntimeError::InvalidNamespace {
        what: format!("{} #{}", what, index),
        offset: e.nul_position(),
    })
}

/// XPath context for one evaluation, freed on drop
pub struct XPathContextGuard<'a> {
    ctx: RawXPathContext,
    engine: &'a dyn Engine,
    metrics: &'a MetricsCollector,
    _doc: &'a Document,
}

impl<'a> XPathContextGuard<'a> {
    /// Create a context over `doc`
    pub fn new(
        engine: &'a dyn Engine,
        metrics: &'a MetricsCollector,
        doc: &'a Document,
    ) -> Result<Self> {
        // SAFETY: the document stays alive for 'a, which outlives the context.
        let ctx = doc
            .with_raw(|raw| unsafe { engine.new_xpath_context(raw) })
            .ok_or(RuntimeError::XPathContext)?;
        metrics.record_acquire(ResourceKind::XPathContext);

        Ok(Self {
            ctx,
            engine,
            metrics,
            _doc: doc,
        })
    }

    /// Register every pair in order, stopping at the first refusal
    pub fn register(&self, namespaces: &NamespaceList) -> Result<()> {
        for (prefix, uri) in namespaces.iter() {
            // SAFETY: the context is live until `self` drops.
            let ok = unsafe { self.engine.register_namespace(self.ctx, prefix, uri) };
            if !ok {
                return Err(RuntimeError::NamespaceRegistration {
                    prefix: prefix.to_string_lossy().into_owned(),
                    uri: uri.to_string_lossy().into_owned(),
                });
            }
            trace!(prefix = ?prefix, uri = ?uri, "Registered namespace");
        }
        Ok(())
    }

    /// Evaluate an expression against the context
    pub fn evaluate(&self, expr: &CStr) -> Result<XPathValue> {
        // SAFETY: as in `register`.
        unsafe { self.engine.eval_xpath(self.ctx, expr) }
            .ok_or_else(|| RuntimeError::BadXPath(expr.to_string_lossy().into_owned()))
    }
}

impl Drop for XPathContextGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: created in `new`, freed only here.
        unsafe { self.engine.free_xpath_context(self.ctx) };
        self.metrics.record_release(ResourceKind::XPathContext);
    }
}
