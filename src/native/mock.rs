//! Instrumented in-memory engine for unit tests.
//!
//! It understands just enough markup to tell well-formed input from broken
//! input, records every call it receives, counts allocations and frees per
//! handle kind, and counts (instead of performing) double frees.

use super::{Engine, RawDocument, RawStylesheet, RawXPathContext, XPathValue};
use crate::engine::params::ParamList;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::CStr;

/// Minimal stylesheet the mock accepts
pub(crate) const IDENTITY_XSLT: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><xsl:template match="/"><xsl:copy-of select="."/></xsl:template></xsl:stylesheet>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Document,
    Stylesheet,
    Context,
}

struct MockDoc {
    text: String,
}

struct MockStylesheet {
    source: *mut MockDoc,
}

struct MockContext {
    text: String,
    namespaces: Vec<(String, String)>,
}

#[derive(Default)]
pub(crate) struct MockEngine {
    live: RefCell<HashMap<usize, Kind>>,
    calls: RefCell<Vec<String>>,
    applied: RefCell<Vec<Vec<String>>>,
    init_calls: Cell<usize>,
    docs_created: Cell<usize>,
    docs_freed: Cell<usize>,
    docs_adopted: Cell<usize>,
    stylesheets_created: Cell<usize>,
    stylesheets_freed: Cell<usize>,
    contexts_created: Cell<usize>,
    contexts_freed: Cell<usize>,
    double_frees: Cell<usize>,
    pub(crate) fail_apply: Cell<bool>,
    pub(crate) fail_save: Cell<bool>,
    pub(crate) fail_context: Cell<bool>,
}

fn bump(cell: &Cell<usize>) {
    cell.set(cell.get() + 1);
}

impl MockEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn init_calls(&self) -> usize {
        self.init_calls.get()
    }

    pub(crate) fn live_documents(&self) -> usize {
        self.docs_created.get() - self.docs_freed.get() - self.docs_adopted.get()
    }

    pub(crate) fn documents_freed(&self) -> usize {
        self.docs_freed.get()
    }

    pub(crate) fn live_stylesheets(&self) -> usize {
        self.stylesheets_created.get() - self.stylesheets_freed.get()
    }

    pub(crate) fn stylesheets_freed(&self) -> usize {
        self.stylesheets_freed.get()
    }

    pub(crate) fn contexts_created(&self) -> usize {
        self.contexts_created.get()
    }

    pub(crate) fn live_contexts(&self) -> usize {
        self.contexts_created.get() - self.contexts_freed.get()
    }

    pub(crate) fn double_frees(&self) -> usize {
        self.double_frees.get()
    }

    /// Parameter arrays seen by `apply_stylesheet`, read back through the raw pointer
    pub(crate) fn applied(&self) -> Vec<Vec<String>> {
        self.applied.borrow().clone()
    }

    /// Every engine call, in order
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }

    fn alloc<T>(&self, value: T, kind: Kind) -> *mut T {
        let ptr = Box::into_raw(Box::new(value));
        self.live.borrow_mut().insert(ptr as usize, kind);
        ptr
    }

    /// Forget a live pointer; `false` on double free or kind mismatch
    fn release(&self, addr: usize, kind: Kind) -> bool {
        let mut live = self.live.borrow_mut();
        match live.get(&addr) {
            Some(&k) if k == kind => {
                live.remove(&addr);
                true
            }
            _ => {
                bump(&self.double_frees);
                false
            }
        }
    }

    fn doc_text(&self, doc: RawDocument) -> String {
        assert_eq!(
            self.live.borrow().get(&(doc.as_ptr::<MockDoc>() as usize)),
            Some(&Kind::Document),
            "document used after free"
        );
        // SAFETY: checked live above.
        unsafe { (*doc.as_ptr::<MockDoc>()).text.clone() }
    }

    fn new_doc(&self, text: String) -> Option<RawDocument> {
        bump(&self.docs_created);
        RawDocument::from_ptr(self.alloc(MockDoc { text }, Kind::Document))
    }
}

/// Tag-balance check standing in for a real XML parser
fn well_formed(text: &str) -> bool {
    let mut stack: Vec<&str> = Vec::new();
    let mut rest = text.trim();
    let mut seen_root = false;

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            return false;
        };
        let tag = &after[..end];
        rest = &after[end + 1..];

        if tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }
        if let Some(name) = tag.strip_prefix('/') {
            if stack.pop() != Some(name.trim()) {
                return false;
            }
        } else {
            let name = tag.split_whitespace().next().unwrap_or("").trim_end_matches('/');
            if name.is_empty() {
                return false;
            }
            if stack.is_empty() && seen_root {
                return false;
            }
            seen_root = true;
            if !tag.ends_with('/') {
                stack.push(name);
            }
        }
    }

    seen_root && stack.is_empty()
}

/// Inner text of every `<qname>...</qname>` element, in document order
fn select(text: &str, qname: &str) -> Vec<String> {
    let open = format!("<{}>", qname);
    let close = format!("</{}>", qname);
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(&open) {
        let body = &rest[start + open.len()..];
        let Some(end) = body.find(&close) else { break };
        found.push(body[..end].to_string());
        rest = &body[end + close.len()..];
    }
    found
}

impl Engine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn initialize(&self) {
        bump(&self.init_calls);
    }

    fn read_xml(&self, input: &[u8], encoding: &CStr, _options: i32) -> Option<RawDocument> {
        self.log(format!("read_xml {}", encoding.to_string_lossy()));
        let text = std::str::from_utf8(input).ok()?;
        if !well_formed(text) {
            return None;
        }
        self.new_doc(text.to_string())
    }

    fn read_html(&self, input: &[u8], encoding: &CStr, _options: i32) -> Option<RawDocument> {
        self.log(format!("read_html {}", encoding.to_string_lossy()));
        let text = String::from_utf8_lossy(input);
        if text.trim().is_empty() {
            return None;
        }
        self.new_doc(text.into_owned())
    }

    unsafe fn free_document(&self, doc: RawDocument) {
        self.log("free_document");
        let ptr = doc.as_ptr::<MockDoc>();
        if self.release(ptr as usize, Kind::Document) {
            bump(&self.docs_freed);
            drop(unsafe { Box::from_raw(ptr) });
        }
    }

    unsafe fn compile_stylesheet(&self, doc: RawDocument) -> Option<RawStylesheet> {
        self.log("compile_stylesheet");
        let text = self.doc_text(doc);
        if !(text.contains("<xsl:stylesheet") || text.contains("<xsl:transform")) {
            return None;
        }

        // The stylesheet adopts its source document.
        let source = doc.as_ptr::<MockDoc>();
        self.live.borrow_mut().remove(&(source as usize));
        bump(&self.docs_adopted);
        bump(&self.stylesheets_created);
        RawStylesheet::from_ptr(self.alloc(MockStylesheet { source }, Kind::Stylesheet))
    }

    unsafe fn free_stylesheet(&self, stylesheet: RawStylesheet) {
        self.log("free_stylesheet");
        let ptr = stylesheet.as_ptr::<MockStylesheet>();
        if self.release(ptr as usize, Kind::Stylesheet) {
            bump(&self.stylesheets_freed);
            let owned = unsafe { Box::from_raw(ptr) };
            drop(unsafe { Box::from_raw(owned.source) });
        }
    }

    unsafe fn apply_stylesheet(
        &self,
        stylesheet: RawStylesheet,
        doc: RawDocument,
        params: &ParamList,
    ) -> Option<RawDocument> {
        self.log("apply_stylesheet");
        assert_eq!(
            self.live.borrow().get(&(stylesheet.as_ptr::<MockStylesheet>() as usize)),
            Some(&Kind::Stylesheet),
            "stylesheet used after free"
        );
        let text = self.doc_text(doc);

        // Read the array the way the native engine would: until the NULL sentinel.
        let mut tokens = Vec::new();
        let mut cursor = params.as_ptr();
        unsafe {
            while !(*cursor).is_null() {
                tokens.push(CStr::from_ptr(*cursor).to_string_lossy().into_owned());
                cursor = cursor.add(1);
            }
        }
        let rendered: Vec<String> = tokens
            .chunks(2)
            .map(|pair| pair.join("="))
            .collect();
        self.applied.borrow_mut().push(tokens);

        if self.fail_apply.get() || text.contains("<fail/>") {
            return None;
        }
        self.new_doc(format!("<result params='{}'>{}</result>", rendered.join(";"), text))
    }

    unsafe fn save_result(
        &self,
        result: RawDocument,
        _stylesheet: RawStylesheet,
    ) -> Option<Vec<u8>> {
        self.log("save_result");
        let text = self.doc_text(result);
        if self.fail_save.get() {
            return None;
        }
        Some(text.into_bytes())
    }

    unsafe fn serialize_document(&self, doc: RawDocument) -> Option<Vec<u8>> {
        self.log("serialize_document");
        let text = self.doc_text(doc);
        Some(format!("<?xml version=\"1.0\"?>\n{}\n", text).into_bytes())
    }

    unsafe fn new_xpath_context(&self, doc: RawDocument) -> Option<RawXPathContext> {
        self.log("new_xpath_context");
        if self.fail_context.get() {
            return None;
        }
        let text = self.doc_text(doc);
        bump(&self.contexts_created);
        RawXPathContext::from_ptr(self.alloc(
            MockContext {
                text,
                namespaces: Vec::new(),
            },
            Kind::Context,
        ))
    }

    unsafe fn register_namespace(&self, ctx: RawXPathContext, prefix: &CStr, uri: &CStr) -> bool {
        let prefix = prefix.to_string_lossy().into_owned();
        let uri = uri.to_string_lossy().into_owned();
        self.log(format!("register_namespace {}={}", prefix, uri));
        if prefix.is_empty() || uri.is_empty() || uri.contains(char::is_whitespace) {
            return false;
        }
        let context = unsafe { &mut *ctx.as_ptr::<MockContext>() };
        context.namespaces.push((prefix, uri));
        true
    }

    unsafe fn eval_xpath(&self, ctx: RawXPathContext, expr: &CStr) -> Option<XPathValue> {
        let expr = expr.to_str().ok()?;
        self.log(format!("eval_xpath {}", expr));
        let context = unsafe { &*ctx.as_ptr::<MockContext>() };

        let nodes = |path: &str| -> Option<Vec<String>> {
            let qname = path.strip_prefix("//")?;
            if qname.is_empty() || qname.contains(|c: char| "[]()/".contains(c)) {
                return None;
            }
            if let Some((prefix, _)) = qname.split_once(':') {
                context.namespaces.iter().find(|(p, _)| p == prefix)?;
            }
            Some(select(&context.text, qname))
        };

        match expr {
            "true()" => Some(XPathValue::Boolean(true)),
            "false()" => Some(XPathValue::Boolean(false)),
            _ => {
                if let Some(inner) = expr.strip_prefix("count(").and_then(|e| e.strip_suffix(')')) {
                    return nodes(inner).map(|n| XPathValue::Number(n.len() as f64));
                }
                if let Some(inner) = expr.strip_prefix("string(").and_then(|e| e.strip_suffix(')')) {
                    return nodes(inner)
                        .map(|n| XPathValue::String(n.into_iter().next().unwrap_or_default()));
                }
                nodes(expr).map(XPathValue::NodeSet)
            }
        }
    }

    unsafe fn free_xpath_context(&self, ctx: RawXPathContext) {
        self.log("free_xpath_context");
        let ptr = ctx.as_ptr::<MockContext>();
        if self.release(ptr as usize, Kind::Context) {
            bump(&self.contexts_freed);
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        // Leak-free tests leave nothing behind; anything left is reclaimed here.
        for (addr, kind) in self.live.borrow_mut().drain() {
            unsafe {
                match kind {
                    Kind::Document => drop(Box::from_raw(addr as *mut MockDoc)),
                    Kind::Stylesheet => {
                        let owned = Box::from_raw(addr as *mut MockStylesheet);
                        drop(Box::from_raw(owned.source));
                    }
                    Kind::Context => drop(Box::from_raw(addr as *mut MockContext)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed() {
        assert!(well_formed("<a><b/>text</a>"));
        assert!(well_formed("<?xml version=\"1.0\"?><a x=\"1\"></a>"));
        assert!(well_formed(IDENTITY_XSLT));
        assert!(!well_formed("<a><b></a>"));
        assert!(!well_formed("<p>unclosed"));
        assert!(!well_formed("<a/><b/>"));
        assert!(!well_formed("no markup"));
    }

    #[test]
    fn test_select() {
        let text = "<r><i>1</i><x/><i>2</i></r>";
        assert_eq!(select(text, "i"), vec!["1", "2"]);
        assert!(select(text, "missing").is_empty());
    }
}
