//! libxml2 / libxslt backed engine.

use super::ffi;
use super::{Engine, RawDocument, RawStylesheet, RawXPathContext, XPathValue};
use crate::engine::params::ParamList;
use once_cell::sync::OnceCell;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr;
use tracing::{debug, info};

static PARSER_INIT: OnceCell<()> = OnceCell::new();
static EXSLT_INIT: OnceCell<()> = OnceCell::new();

/// Engine backed by the system libxml2, libxslt and libexslt
#[derive(Debug, Clone)]
pub struct LibXslt {
    register_exslt: bool,
}

impl LibXslt {
    /// Create the engine; EXSLT functions are registered on initialization
    pub fn new() -> Self {
        Self {
            register_exslt: true,
        }
    }

    /// Enable or disable EXSLT registration
    pub fn with_exslt(mut self, enable: bool) -> Self {
        self.register_exslt = enable;
        self
    }
}

impl Default for LibXslt {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy an engine-allocated buffer into Rust memory and release it
unsafe fn take_xml_buffer(buf: *mut ffi::xmlChar, len: c_int) -> Vec<u8> {
    if buf.is_null() {
        return Vec::new();
    }
    // SAFETY: the engine reported `len` initialized bytes at `buf`.
    let bytes = unsafe { std::slice::from_raw_parts(buf, len.max(0) as usize) }.to_vec();
    unsafe { xml_free(buf.cast()) };
    bytes
}

unsafe fn xml_free(mem: *mut c_void) {
    // SAFETY: `xmlFree` is initialized by libxml2 before any allocation it hands out.
    if let Some(free) = unsafe { ffi::xmlFree } {
        unsafe { free(mem) };
    }
}

/// Copy a NUL-terminated engine string and release it
unsafe fn take_xml_string(s: *mut ffi::xmlChar) -> String {
    if s.is_null() {
        return String::new();
    }
    // SAFETY: the engine returns NUL-terminated UTF-8.
    let owned = unsafe { CStr::from_ptr(s.cast::<c_char>()) }
        .to_string_lossy()
        .into_owned();
    unsafe { xml_free(s.cast()) };
    owned
}

impl Engine for LibXslt {
    fn name(&self) -> &'static str {
        "libxslt"
    }

    fn initialize(&self) {
        PARSER_INIT.get_or_init(|| {
            // SAFETY: libxml2 global initialization, idempotent.
            unsafe { ffi::xmlInitParser() };
            debug!("libxml2 parser initialized");
        });
        if self.register_exslt {
            EXSLT_INIT.get_or_init(|| {
                // SAFETY: registers process-wide extension functions once.
                unsafe { ffi::exsltRegisterAll() };
                info!("EXSLT extension functions registered");
            });
        }
    }

    fn read_xml(&self, input: &[u8], encoding: &CStr, options: i32) -> Option<RawDocument> {
        let len = c_int::try_from(input.len()).ok()?;
        // SAFETY: buffer and length describe `input`; URL may be NULL.
        let doc = unsafe {
            ffi::xmlReadMemory(
                input.as_ptr().cast(),
                len,
                ptr::null(),
                encoding.as_ptr(),
                options,
            )
        };
        RawDocument::from_ptr(doc)
    }

    fn read_html(&self, input: &[u8], encoding: &CStr, options: i32) -> Option<RawDocument> {
        let len = c_int::try_from(input.len()).ok()?;
        // SAFETY: as in `read_xml`.
        let doc = unsafe {
            ffi::htmlReadMemory(
                input.as_ptr().cast(),
                len,
                ptr::null(),
                encoding.as_ptr(),
                options,
            )
        };
        RawDocument::from_ptr(doc)
    }

    unsafe fn free_document(&self, doc: RawDocument) {
        unsafe { ffi::xmlFreeDoc(doc.as_ptr()) };
    }

    unsafe fn compile_stylesheet(&self, doc: RawDocument) -> Option<RawStylesheet> {
        let style = unsafe { ffi::xsltParseStylesheetDoc(doc.as_ptr()) };
        RawStylesheet::from_ptr(style)
    }

    unsafe fn free_stylesheet(&self, stylesheet: RawStylesheet) {
        unsafe { ffi::xsltFreeStylesheet(stylesheet.as_ptr()) };
    }

    unsafe fn apply_stylesheet(
        &self,
        stylesheet: RawStylesheet,
        doc: RawDocument,
        params: &ParamList,
    ) -> Option<RawDocument> {
        // libxslt only reads the parameter array.
        let result = unsafe {
            ffi::xsltApplyStylesheet(
                stylesheet.as_ptr(),
                doc.as_ptr(),
                params.as_ptr() as *mut *const c_char,
            )
        };
        RawDocument::from_ptr(result)
    }

    unsafe fn save_result(
        &self,
        result: RawDocument,
        stylesheet: RawStylesheet,
    ) -> Option<Vec<u8>> {
        let mut buf: *mut ffi::xmlChar = ptr::null_mut();
        let mut len: c_int = 0;
        let rc = unsafe {
            ffi::xsltSaveResultToString(&mut buf, &mut len, result.as_ptr(), stylesheet.as_ptr())
        };
        // An empty result leaves `buf` NULL.
        let bytes = unsafe { take_xml_buffer(buf, len) };
        (rc == 0).then_some(bytes)
    }

    unsafe fn serialize_document(&self, doc: RawDocument) -> Option<Vec<u8>> {
        let mut buf: *mut ffi::xmlChar = ptr::null_mut();
        let mut len: c_int = 0;
        unsafe { ffi::xmlDocDumpMemory(doc.as_ptr(), &mut buf, &mut len) };
        if buf.is_null() {
            return None;
        }
        Some(unsafe { take_xml_buffer(buf, len) })
    }

    unsafe fn new_xpath_context(&self, doc: RawDocument) -> Option<RawXPathContext> {
        let ctx = unsafe { ffi::xmlXPathNewContext(doc.as_ptr()) };
        RawXPathContext::from_ptr(ctx)
    }

    unsafe fn register_namespace(&self, ctx: RawXPathContext, prefix: &CStr, uri: &CStr) -> bool {
        let rc = unsafe {
            ffi::xmlXPathRegisterNs(ctx.as_ptr(), prefix.as_ptr().cast(), uri.as_ptr().cast())
        };
        rc == 0
    }

    unsafe fn eval_xpath(&self, ctx: RawXPathContext, expr: &CStr) -> Option<XPathValue> {
        let obj = unsafe { ffi::xmlXPathEvalExpression(expr.as_ptr().cast(), ctx.as_ptr()) };
        if obj.is_null() {
            return None;
        }

        // SAFETY: non-null result object owned by us until freed below.
        let object = unsafe { &*obj };
        let value = match object.type_ {
            ffi::XPATH_NODESET | ffi::XPATH_XSLT_TREE => {
                let mut nodes = Vec::new();
                if !object.nodesetval.is_null() {
                    let set = unsafe { &*object.nodesetval };
                    for i in 0..set.nodeNr.max(0) as usize {
                        let node = unsafe { *set.nodeTab.add(i) };
                        nodes.push(unsafe { take_xml_string(ffi::xmlXPathCastNodeToString(node)) });
                    }
                }
                XPathValue::NodeSet(nodes)
            }
            ffi::XPATH_BOOLEAN => XPathValue::Boolean(object.boolval != 0),
            ffi::XPATH_NUMBER => XPathValue::Number(object.floatval),
            ffi::XPATH_STRING => {
                let s = if object.stringval.is_null() {
                    String::new()
                } else {
                    unsafe { CStr::from_ptr(object.stringval.cast::<c_char>()) }
                        .to_string_lossy()
                        .into_owned()
                };
                XPathValue::String(s)
            }
            _ => XPathValue::Undefined,
        };

        unsafe { ffi::xmlXPathFreeObject(obj) };
        Some(value)
    }

    unsafe fn free_xpath_context(&self, ctx: RawXPathContext) {
        unsafe { ffi::xmlXPathFreeContext(ctx.as_ptr()) };
    }
}
