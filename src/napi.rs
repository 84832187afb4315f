//! N-API bindings for Node.js integration.
//!
//! Parsed documents and compiled stylesheets are handed to JavaScript as
//! class instances. When V8 collects one, the Rust value is dropped and the
//! native handle is freed. Each JS thread gets its own runtime.

use crate::config::RuntimeConfig;
use crate::engine::{Document, Stylesheet, XsltRuntime};
use crate::error::RuntimeError;
use napi::bindgen_prelude::*;
use napi::JsUnknown;
use napi_derive::napi;
use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static RUNTIME: RefCell<Option<Rc<XsltRuntime>>> = const { RefCell::new(None) };
}

/// JavaScript-friendly configuration
#[napi(object)]
pub struct JsRuntimeConfig {
    /// libxml2 option bits for XML and stylesheet parsing
    pub xml_parse_options: Option<i32>,
    /// libxml2 option bits for HTML parsing
    pub html_parse_options: Option<i32>,
    /// Register EXSLT extension functions
    pub register_exslt: Option<bool>,
    /// Largest accepted input in bytes
    pub max_input_bytes: Option<u32>,
}

impl From<JsRuntimeConfig> for RuntimeConfig {
    fn from(js: JsRuntimeConfig) -> Self {
        let defaults = RuntimeConfig::default();
        RuntimeConfig {
            xml_parse_options: js.xml_parse_options.unwrap_or(defaults.xml_parse_options),
            html_parse_options: js.html_parse_options.unwrap_or(defaults.html_parse_options),
            register_exslt: js.register_exslt.unwrap_or(defaults.register_exslt),
            max_input_bytes: js
                .max_input_bytes
                .map(|v| v as usize)
                .unwrap_or(defaults.max_input_bytes),
        }
    }
}

/// JavaScript-friendly runtime statistics
#[napi(object)]
pub struct JsRuntimeStats {
    /// Total operations
    pub total_operations: u64,
    /// Failed operations
    pub failed_operations: u64,
    /// Documents held by live `XmlDocument` objects
    pub live_documents: u64,
    /// Stylesheets held by live `XsltStylesheet` objects
    pub live_stylesheets: u64,
    /// Average operation time in microseconds
    pub avg_operation_time_us: f64,
}

/// A parsed XML or HTML document
#[napi]
pub struct XmlDocument {
    inner: Document,
}

#[napi]
impl XmlDocument {
    /// `"xml"` or `"html"`
    #[napi(getter)]
    pub fn origin(&self) -> String {
        match self.inner.origin() {
            crate::engine::handle::DocumentOrigin::Xml => "xml".to_string(),
            crate::engine::handle::DocumentOrigin::Html => "html".to_string(),
        }
    }

    /// Serialize the document as XML text
    #[napi]
    pub fn serialize(&self) -> Result<String> {
        with_runtime(|runtime| runtime.serialize(&self.inner))
    }
}

/// A compiled XSLT stylesheet
#[napi]
pub struct XsltStylesheet {
    inner: Stylesheet,
}

fn to_js_error(e: RuntimeError) -> napi::Error {
    napi::Error::from_reason(e.to_xslt_error().to_string())
}

fn runtime() -> Result<Rc<XsltRuntime>> {
    RUNTIME.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(runtime) = slot.as_ref() {
            return Ok(runtime.clone());
        }
        let runtime = Rc::new(XsltRuntime::with_libxslt(RuntimeConfig::default()).map_err(to_js_error)?);
        *slot = Some(runtime.clone());
        Ok(runtime)
    })
}

fn with_runtime<T>(f: impl FnOnce(&XsltRuntime) -> crate::error::Result<T>) -> Result<T> {
    let runtime = runtime()?;
    f(&runtime).map_err(to_js_error)
}

/// Host arrays may hold any value; each element is coerced with `String()`
fn coerce_strings(values: Option<Vec<JsUnknown>>) -> Result<Vec<String>> {
    values
        .unwrap_or_default()
        .into_iter()
        .map(|value| value.coerce_to_string()?.into_utf8()?.into_owned())
        .collect()
}

/// Replace this thread's runtime. Existing documents and stylesheets stay valid.
#[napi]
pub fn configure(config: JsRuntimeConfig) -> Result<()> {
    let runtime = XsltRuntime::with_libxslt(config.into()).map_err(to_js_error)?;
    RUNTIME.with(|slot| *slot.borrow_mut() = Some(Rc::new(runtime)));
    Ok(())
}

/// Parse a well-formed XML document
#[napi]
pub fn read_xml_string(text: String) -> Result<XmlDocument> {
    with_runtime(|runtime| runtime.parse_xml(&text)).map(|inner| XmlDocument { inner })
}

/// Parse an HTML document, recovering from malformed markup
#[napi]
pub fn read_html_string(text: String) -> Result<XmlDocument> {
    with_runtime(|runtime| runtime.parse_html(&text)).map(|inner| XmlDocument { inner })
}

/// Parse and compile a stylesheet
#[napi]
pub fn read_xslt_string(text: String) -> Result<XsltStylesheet> {
    with_runtime(|runtime| runtime.compile_stylesheet(&text)).map(|inner| XsltStylesheet { inner })
}

/// Evaluate an XPath expression. `namespaces` is a flat `[prefix, uri, ...]` array.
#[napi]
pub fn xpath_eval(
    doc: &XmlDocument,
    expr: String,
    namespaces: Option<Vec<JsUnknown>>,
) -> Result<serde_json::Value> {
    let namespaces = coerce_strings(namespaces)?;
    let value = with_runtime(|runtime| runtime.evaluate_xpath(&doc.inner, &expr, &namespaces))?;
    serde_json::to_value(value).map_err(|e| napi::Error::from_reason(e.to_string()))
}

/// Apply a stylesheet. `params` values are XPath expressions, `string_params`
/// values are plain strings; both are flat `[name, value, ...]` arrays.
#[napi]
pub fn transform(
    stylesheet: &XsltStylesheet,
    doc: &XmlDocument,
    params: Option<Vec<JsUnknown>>,
    string_params: Option<Vec<JsUnknown>>,
) -> Result<String> {
    let params = coerce_strings(params)?;
    let string_params = coerce_strings(string_params)?;
    with_runtime(|runtime| {
        runtime.transform(&stylesheet.inner, &doc.inner, &params, &string_params)
    })
}

/// Get runtime statistics
#[napi]
pub fn get_stats() -> Result<JsRuntimeStats> {
    let stats = runtime()?.stats();
    Ok(JsRuntimeStats {
        total_operations: stats.total_operations,
        failed_operations: stats.failed_operations,
        live_documents: stats.live_documents,
        live_stylesheets: stats.live_stylesheets,
        avg_operation_time_us: stats.avg_operation_time_us,
    })
}

/// Get Prometheus metrics
#[napi]
pub fn get_prometheus_metrics() -> Result<String> {
    Ok(runtime()?.prometheus_metrics())
}

/// Initialize the module
#[napi]
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("xslt_bridge=info"));
    // A subscriber may already be installed by the embedding process.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
