//! XSLT runtime.
//!
//! [`XsltRuntime`] is the operation façade the host calls into. Each
//! operation validates its arguments first, then drives the native engine,
//! and hands back either an owned wrapper, a value copied out of the engine,
//! or a [`RuntimeError`]. Every native resource an operation creates for its
//! own use is released before it returns, on every path.

pub mod handle;
pub mod params;
pub mod xpath;

use crate::config::{RuntimeConfig, INPUT_ENCODING};
use crate::error::{Result, RuntimeError, SourceKind};
use crate::metrics::{MetricsCollector, Operation, OperationTimer, ResourceKind, RuntimeStats};
use crate::native::{Engine, RawDocument};
use handle::{DocumentOrigin, HandleKind, OwnedHandle};
use params::ParamList;
use std::ffi::CString;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, instrument, trace, warn};
use xpath::{NamespaceList, XPathContextGuard};

pub use handle::{Document, Stylesheet};
pub use xpath::XPathValue;

/// Document owned by the runtime for the span of one call.
///
/// Freed on drop unless ownership was handed to the engine with `dismiss`.
struct TransientDocument<'a> {
    raw: Option<RawDocument>,
    engine: &'a dyn Engine,
    metrics: &'a MetricsCollector,
}

impl<'a> TransientDocument<'a> {
    fn new(engine: &'a dyn Engine, metrics: &'a MetricsCollector, raw: RawDocument) -> Self {
        metrics.record_acquire(ResourceKind::TransientDocument);
        Self {
            raw: Some(raw),
            engine,
            metrics,
        }
    }

    fn raw(&self) -> RawDocument {
        match self.raw {
            Some(raw) => raw,
            None => unreachable!("transient document used after dismissal"),
        }
    }

    /// Give up ownership without freeing
    fn dismiss(mut self) -> RawDocument {
        let raw = self.raw();
        self.raw = None;
        self.metrics.record_release(ResourceKind::TransientDocument);
        raw
    }
}

impl Drop for TransientDocument<'_> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: owned by this guard and never handed out.
            unsafe { self.engine.free_document(raw) };
            self.metrics.record_release(ResourceKind::TransientDocument);
        }
    }
}

/// The XSLT runtime
pub struct XsltRuntime {
    /// Runtime configuration
    config: RuntimeConfig,
    /// Native engine
    engine: Rc<dyn Engine>,
    /// Metrics collector
    metrics: Arc<MetricsCollector>,
}

impl XsltRuntime {
    /// Create a runtime over `engine`. Initializes the engine.
    pub fn new(engine: Rc<dyn Engine>, config: RuntimeConfig) -> Result<Self> {
        config.validate()?;

        info!(
            engine = engine.name(),
            exslt = config.register_exslt,
            "Initializing XSLT runtime"
        );
        engine.initialize();

        Ok(Self {
            config,
            engine,
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    /// Create a runtime over the system libxml2/libxslt
    #[cfg(feature = "libxslt")]
    pub fn with_libxslt(config: RuntimeConfig) -> Result<Self> {
        let engine = crate::native::libxslt::LibXslt::new().with_exslt(config.register_exslt);
        Self::new(Rc::new(engine), config)
    }

    /// Runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Name of the native engine
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Parse a well-formed XML document
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub fn parse_xml(&self, text: &str) -> Result<Document> {
        let timer = OperationTimer::start(Operation::ParseXml);
        let result = self
            .read(text, SourceKind::Xml)
            .map(|raw| self.adopt_document(raw, DocumentOrigin::Xml));
        self.finish(timer, result)
    }

    /// Parse an HTML document, recovering from malformed markup
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub fn parse_html(&self, text: &str) -> Result<Document> {
        let timer = OperationTimer::start(Operation::ParseHtml);
        let result = self
            .read(text, SourceKind::Html)
            .map(|raw| self.adopt_document(raw, DocumentOrigin::Html));
        self.finish(timer, result)
    }

    /// Parse and compile a stylesheet
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub fn compile_stylesheet(&self, text: &str) -> Result<Stylesheet> {
        let timer = OperationTimer::start(Operation::CompileStylesheet);
        let result = self.compile(text);
        self.finish(timer, result)
    }

    /// Evaluate an XPath expression against a document.
    ///
    /// `namespaces` is a flat `[prefix, uri, ...]` array registered, in order,
    /// before evaluation.
    #[instrument(skip(self, doc, namespaces), fields(doc = doc.id(), namespaces = namespaces.len()))]
    pub fn evaluate_xpath<S: AsRef<str>>(
        &self,
        doc: &Document,
        expr: &str,
        namespaces: &[S],
    ) -> Result<XPathValue> {
        let timer = OperationTimer::start(Operation::EvaluateXPath);
        let result = self.evaluate(doc, expr, namespaces);
        self.finish(timer, result)
    }

    /// Apply a stylesheet and return the serialized result as text.
    ///
    /// `params` values are XPath expressions; `string_params` values are
    /// plain strings. Both are flat `[name, value, ...]` arrays.
    #[instrument(skip_all, fields(stylesheet = stylesheet.id(), doc = doc.id()))]
    pub fn transform<P, S>(
        &self,
        stylesheet: &Stylesheet,
        doc: &Document,
        params: &[P],
        string_params: &[S],
    ) -> Result<String>
    where
        P: AsRef<str>,
        S: AsRef<str>,
    {
        let timer = OperationTimer::start(Operation::Transform);
        let result = self
            .apply(stylesheet, doc, params, string_params)
            .and_then(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|_| RuntimeError::Serialization("transform result as UTF-8".into()))
            });
        self.finish(timer, result)
    }

    /// Apply a stylesheet and return the serialized result bytes, in the
    /// stylesheet's output encoding
    #[instrument(skip_all, fields(stylesheet = stylesheet.id(), doc = doc.id()))]
    pub fn transform_bytes<P, S>(
        &self,
        stylesheet: &Stylesheet,
        doc: &Document,
        params: &[P],
        string_params: &[S],
    ) -> Result<Vec<u8>>
    where
        P: AsRef<str>,
        S: AsRef<str>,
    {
        let timer = OperationTimer::start(Operation::Transform);
        let result = self.apply(stylesheet, doc, params, string_params);
        self.finish(timer, result)
    }

    /// Serialize a document as XML text
    #[instrument(skip(self, doc), fields(doc = doc.id()))]
    pub fn serialize(&self, doc: &Document) -> Result<String> {
        let timer = OperationTimer::start(Operation::Serialize);
        // SAFETY: `doc` keeps the handle alive for the call.
        let result = doc
            .with_raw(|raw| unsafe { self.engine.serialize_document(raw) })
            .ok_or_else(|| RuntimeError::Serialization("document".into()))
            .and_then(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|_| RuntimeError::Serialization("document as UTF-8".into()))
            });
        self.finish(timer, result)
    }

    /// Get runtime statistics
    pub fn stats(&self) -> RuntimeStats {
        self.metrics.stats()
    }

    /// Get Prometheus metrics
    pub fn prometheus_metrics(&self) -> String {
        self.metrics.to_prometheus()
    }

    /// Metrics collector shared by every handle this runtime created
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    fn finish<T>(&self, timer: OperationTimer, result: Result<T>) -> Result<T> {
        timer.finish(&self.metrics, &result);
        if let Err(e) = &result {
            warn!(code = %e.code(), error = %e, "Operation failed");
        }
        result
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.config.max_input_bytes {
            return Err(RuntimeError::InputTooLarge {
                len,
                limit: self.config.max_input_bytes,
            });
        }
        Ok(())
    }

    fn read(&self, text: &str, kind: SourceKind) -> Result<RawDocument> {
        self.check_size(text.len())?;

        let parsed = match kind {
            SourceKind::Xml => {
                self.engine
                    .read_xml(text.as_bytes(), INPUT_ENCODING, self.config.xml_parse_options)
            }
            SourceKind::Html => {
                self.engine
                    .read_html(text.as_bytes(), INPUT_ENCODING, self.config.html_parse_options)
            }
        };
        parsed.ok_or(RuntimeError::Parse(kind))
    }

    fn adopt_document(&self, raw: RawDocument, origin: DocumentOrigin) -> Document {
        let owned = OwnedHandle::wrap(
            self.engine.clone(),
            self.metrics.clone(),
            raw.as_nonnull(),
            HandleKind::Document,
        );
        debug!(handle_id = owned.id(), origin = ?origin, "Parsed document");
        Document::new(owned, origin)
    }

    fn compile(&self, text: &str) -> Result<Stylesheet> {
        let raw = self.read(text, SourceKind::Xml)?;
        let source = TransientDocument::new(self.engine.as_ref(), &self.metrics, raw);

        // SAFETY: `source` is live; on success the stylesheet takes it over.
        let compiled = unsafe { self.engine.compile_stylesheet(source.raw()) }
            .ok_or(RuntimeError::Compile)?;
        source.dismiss();

        let owned = OwnedHandle::wrap(
            self.engine.clone(),
            self.metrics.clone(),
            compiled.as_nonnull(),
            HandleKind::Stylesheet,
        );
        debug!(handle_id = owned.id(), "Compiled stylesheet");
        Ok(Stylesheet::new(owned))
    }

    fn evaluate<S: AsRef<str>>(
        &self,
        doc: &Document,
        expr: &str,
        namespaces: &[S],
    ) -> Result<XPathValue> {
        let namespaces = NamespaceList::parse(namespaces)?;
        let expr = CString::new(expr).map_err(|e| RuntimeError::InvalidExpression {
            offset: e.nul_position(),
        })?;

        let ctx = XPathContextGuard::new(self.engine.as_ref(), &self.metrics, doc)?;
        ctx.register(&namespaces)?;
        trace!(namespaces = namespaces.len(), "Namespaces registered");
        ctx.evaluate(&expr)
    }

    fn apply<P, S>(
        &self,
        stylesheet: &Stylesheet,
        doc: &Document,
        params: &[P],
        string_params: &[S],
    ) -> Result<Vec<u8>>
    where
        P: AsRef<str>,
        S: AsRef<str>,
    {
        let params = ParamList::build(params, string_params)?;

        // SAFETY: both wrappers are borrowed for the whole call.
        let result = stylesheet
            .with_raw(|style| {
                doc.with_raw(|src| unsafe { self.engine.apply_stylesheet(style, src, &params) })
            })
            .ok_or(RuntimeError::Apply)?;
        let result = TransientDocument::new(self.engine.as_ref(), &self.metrics, result);

        let bytes = stylesheet
            .with_raw(|style| unsafe { self.engine.save_result(result.raw(), style) })
            .ok_or_else(|| RuntimeError::Serialization("transform result".into()))?;

        debug!(params = params.len() / 2, bytes = bytes.len(), "Applied stylesheet");
        Ok(bytes)
    }
}


#[cfg(all(test, feature = "libxslt"))]
mod libxslt_tests {
    use super::*;
    use crate::error::ErrorCode;

    const NONE: &[&str] = &[];

    const GREETING_XSLT: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:output method="text"/>
  <xsl:param name="greeting"/>
  <xsl:param name="n"/>
  <xsl:template match="/"><xsl:value-of select="$greeting"/>|<xsl:value-of select="$n"/>|<xsl:value-of select="/r/i"/></xsl:template>
</xsl:stylesheet>"#;

    fn create_runtime() -> XsltRuntime {
        XsltRuntime::with_libxslt(RuntimeConfig::default()).unwrap()
    }

    #[test]
    fn test_transform_with_params() {
        let runtime = create_runtime();
        let stylesheet = runtime.compile_stylesheet(GREETING_XSLT).unwrap();
        let doc = runtime.parse_xml("<r><i>x</i></r>").unwrap();

        let out = runtime
            .transform(&stylesheet, &doc, &["n", "1 + 1"], &["greeting", "O'Brien"])
            .unwrap();
        assert_eq!(out.trim(), "O'Brien|2|x");

        let again = runtime
            .transform(&stylesheet, &doc, &["n", "3"], &["greeting", "say \"hi\""])
            .unwrap();
        assert_eq!(again.trim(), "say \"hi\"|3|x");
    }

    #[test]
    fn test_html_recovers_where_xml_fails() {
        let runtime = create_runtime();
        assert!(runtime.parse_html("<p>unclosed").is_ok());
        let err = runtime.parse_xml("<p>unclosed").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParseFailure);
    }

    #[test]
    fn test_xpath_with_namespace() {
        let runtime = create_runtime();
        let doc = runtime
            .parse_xml(
                "<html xmlns=\"http://www.w3.org/1999/xhtml\"><body>\
                 <p>one</p><p>two</p></body></html>",
            )
            .unwrap();

        let value = runtime
            .evaluate_xpath(&doc, "//h:p", &["h", "http://www.w3.org/1999/xhtml"])
            .unwrap();
        assert_eq!(value, XPathValue::NodeSet(vec!["one".into(), "two".into()]));

        let count = runtime.evaluate_xpath(&doc, "count(//h:p)", &["h", "http://www.w3.org/1999/xhtml"]).unwrap();
        assert_eq!(count, XPathValue::Number(2.0));

        let err = runtime.evaluate_xpath(&doc, "//h:p[", NONE).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadExpression);
    }

    #[test]
    fn test_non_stylesheet_fails_to_compile() {
        let runtime = create_runtime();
        let err = runtime.compile_stylesheet("<root/>").unwrap_err();
        assert_eq!(err.code(), ErrorCode::CompileFailure);
        assert_eq!(runtime.stats().live_transient_documents, 0);
    }

    #[test]
    fn test_non_ascii_input_round_trips() {
        let runtime = create_runtime();
        let doc = runtime.parse_xml("<r>é</r>").unwrap();
        assert_eq!(
            runtime.evaluate_xpath(&doc, "string(/r)", NONE).unwrap(),
            XPathValue::String("é".into())
        );

        let html = runtime.parse_html("<p>héllo wörld</p>").unwrap();
        assert_eq!(
            runtime.evaluate_xpath(&html, "string(//p)", NONE).unwrap(),
            XPathValue::String("héllo wörld".into())
        );
    }

    #[test]
    fn test_literal_with_both_quotes() {
        let runtime = create_runtime();
        let stylesheet = runtime.compile_stylesheet(GREETING_XSLT).unwrap();
        let doc = runtime.parse_xml("<r><i>x</i></r>").unwrap();

        let out = runtime
            .transform(&stylesheet, &doc, &["n", "0"], &["greeting", "it's \"x\""])
            .unwrap();
        assert_eq!(out.trim(), "it's \"x\"|0|x");
    }

    #[test]
    fn test_exslt_stays_registered_for_later_runtimes() {
        let _first = create_runtime();
        let later = XsltRuntime::with_libxslt(RuntimeConfig::default().with_exslt(false)).unwrap();
        let stylesheet = later
            .compile_stylesheet(
                r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns:str="http://exslt.org/strings" extension-element-prefixes="str">
  <xsl:output method="text"/>
  <xsl:template match="/"><xsl:value-of select="str:padding(3, 'x')"/></xsl:template>
</xsl:stylesheet>"#,
            )
            .unwrap();
        let doc = later.parse_xml("<r/>").unwrap();
        assert_eq!(later.transform(&stylesheet, &doc, NONE, NONE).unwrap().trim(), "xxx");
    }

    #[test]
    fn test_serialize_round_trip() {
        let runtime = create_runtime();
        let doc = runtime.parse_xml("<a><b>text</b></a>").unwrap();
        assert!(runtime.serialize(&doc).unwrap().contains("<a><b>text</b></a>"));
    }
}
