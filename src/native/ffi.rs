//! Raw declarations for the parts of libxml2, libxslt and libexslt used by
//! [`super::libxslt::LibXslt`].

#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals, dead_code)]

use std::ffi::{c_char, c_double, c_int, c_void};

pub type xmlChar = u8;

#[repr(C)]
pub struct xmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct xmlNode {
    _private: [u8; 0],
}

#[repr(C)]
pub struct xsltStylesheet {
    _private: [u8; 0],
}

#[repr(C)]
pub struct xmlXPathContext {
    _private: [u8; 0],
}

#[repr(C)]
pub struct xmlNodeSet {
    pub nodeNr: c_int,
    pub nodeMax: c_int,
    pub nodeTab: *mut *mut xmlNode,
}

pub type xmlXPathObjectType = c_int;

pub const XPATH_UNDEFINED: xmlXPathObjectType = 0;
pub const XPATH_NODESET: xmlXPathObjectType = 1;
pub const XPATH_BOOLEAN: xmlXPathObjectType = 2;
pub const XPATH_NUMBER: xmlXPathObjectType = 3;
pub const XPATH_STRING: xmlXPathObjectType = 4;
pub const XPATH_XSLT_TREE: xmlXPathObjectType = 9;

#[repr(C)]
pub struct xmlXPathObject {
    pub type_: xmlXPathObjectType,
    pub nodesetval: *mut xmlNodeSet,
    pub boolval: c_int,
    pub floatval: c_double,
    pub stringval: *mut xmlChar,
    pub user: *mut c_void,
    pub index: c_int,
    pub user2: *mut c_void,
    pub index2: c_int,
}

pub type xmlFreeFunc = Option<unsafe extern "C" fn(mem: *mut c_void)>;

#[link(name = "xml2")]
extern "C" {
    pub static xmlFree: xmlFreeFunc;

    pub fn xmlInitParser();

    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        URL: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut xmlDoc;

    pub fn htmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        URL: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut xmlDoc;

    pub fn xmlFreeDoc(cur: *mut xmlDoc);

    pub fn xmlDocDumpMemory(cur: *mut xmlDoc, mem: *mut *mut xmlChar, size: *mut c_int);

    pub fn xmlXPathNewContext(doc: *mut xmlDoc) -> *mut xmlXPathContext;

    pub fn xmlXPathFreeContext(ctxt: *mut xmlXPathContext);

    pub fn xmlXPathRegisterNs(
        ctxt: *mut xmlXPathContext,
        prefix: *const xmlChar,
        ns_uri: *const xmlChar,
    ) -> c_int;

    pub fn xmlXPathEvalExpression(
        str: *const xmlChar,
        ctxt: *mut xmlXPathContext,
    ) -> *mut xmlXPathObject;

    pub fn xmlXPathFreeObject(obj: *mut xmlXPathObject);

    pub fn xmlXPathCastNodeToString(node: *mut xmlNode) -> *mut xmlChar;
}

#[link(name = "xslt")]
extern "C" {
    pub fn xsltParseStylesheetDoc(doc: *mut xmlDoc) -> *mut xsltStylesheet;

    pub fn xsltFreeStylesheet(style: *mut xsltStylesheet);

    pub fn xsltApplyStylesheet(
        style: *mut xsltStylesheet,
        doc: *mut xmlDoc,
        params: *mut *const c_char,
    ) -> *mut xmlDoc;

    pub fn xsltSaveResultToString(
        doc_txt_ptr: *mut *mut xmlChar,
        doc_txt_len: *mut c_int,
        result: *mut xmlDoc,
        style: *mut xsltStylesheet,
    ) -> c_int;
}

#[link(name = "exslt")]
extern "C" {
    pub fn exsltRegisterAll();
}
