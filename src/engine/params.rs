//! Transform parameter marshaling.
//!
//! The XSLT engine takes parameters as one flat, NULL-terminated array of C
//! strings, `name, value, name, value, ..., NULL`, and evaluates every value
//! as an XPath expression. Host callers hand over two flat key/value arrays:
//! expressions, copied verbatim, and literal strings, which must be quoted so
//! the engine reads them as string literals.

use crate::error::{ParamSequence, Result, RuntimeError};
use std::ffi::{c_char, CStr, CString};
use std::ptr;

/// Owned, NULL-terminated parameter array for one transform call.
///
/// The tokens and the pointer array are released when the list is dropped,
/// whichever way the call exits.
#[derive(Debug)]
pub struct ParamList {
    tokens: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl ParamList {
    /// Build the engine's parameter array from an expression array and a
    /// literal-string array, both flat `[name, value, ...]` lists.
    pub fn build<E, L>(expressions: &[E], literals: &[L]) -> Result<Self>
    where
        E: AsRef<str>,
        L: AsRef<str>,
    {
        check_even(ParamSequence::Expression, expressions.len())?;
        check_even(ParamSequence::Literal, literals.len())?;

        let count = expressions.len() + literals.len();
        let mut tokens: Vec<CString> = Vec::new();
        tokens
            .try_reserve_exact(count)
            .map_err(|_| RuntimeError::Allocation { what: "parameter list" })?;

        for (index, pair) in expressions.chunks_exact(2).enumerate() {
            let name = pair[0].as_ref();
            let value = pair[1].as_ref();
            tokens.push(token(ParamSequence::Expression, index, "name", name.as_bytes())?);
            tokens.push(token(ParamSequence::Expression, index, "value", value.as_bytes())?);
        }

        for (index, pair) in literals.chunks_exact(2).enumerate() {
            let name = pair[0].as_ref();
            let value = pair[1].as_ref();
            tokens.push(token(ParamSequence::Literal, index, "name", name.as_bytes())?);
            tokens.push(quoted_literal(index, value)?);
        }

        let mut ptrs: Vec<*const c_char> = Vec::new();
        ptrs.try_reserve_exact(count + 1)
            .map_err(|_| RuntimeError::Allocation { what: "parameter array" })?;
        ptrs.extend(tokens.iter().map(|t| t.as_ptr()));
        ptrs.push(ptr::null());

        Ok(Self { tokens, ptrs })
    }

    /// Pointer to the NULL-terminated array, valid while `self` is alive
    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    /// Number of tokens, excluding the terminator
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the list carries no parameters
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Tokens in engine order
    pub fn tokens(&self) -> impl Iterator<Item = &CStr> {
        self.tokens.iter().map(CString::as_c_str)
    }

    /// `(name, value)` pairs in engine order
    pub fn pairs(&self) -> impl Iterator<Item = (&CStr, &CStr)> {
        self.tokens
            .chunks_exact(2)
            .map(|pair| (pair[0].as_c_str(), pair[1].as_c_str()))
    }
}

fn check_even(sequence: ParamSequence, len: usize) -> Result<()> {
    if len % 2 != 0 {
        return Err(RuntimeError::OddParams { sequence, len });
    }
    Ok(())
}

fn check_nul(sequence: ParamSequence, index: usize, role: &str, bytes: &[u8]) -> Result<()> {
    match bytes.iter().position(|&b| b == 0) {
        Some(offset) => Err(RuntimeError::InvalidParam {
            what: format!("{} {} #{}", sequence, role, index),
            offset,
        }),
        None => Ok(()),
    }
}

fn into_cstring(bytes: Vec<u8>) -> Result<CString> {
    // Callers have already rejected NUL bytes.
    CString::new(bytes).map_err(|e| RuntimeError::InvalidParam {
        what: "parameter token".to_string(),
        offset: e.nul_position(),
    })
}

/// Copy a key or expression value into a fresh C string.
fn token(sequence: ParamSequence, index: usize, role: &str, bytes: &[u8]) -> Result<CString> {
    check_nul(sequence, index, role, bytes)?;

    let mut buf: Vec<u8> = Vec::new();
    buf.try_reserve_exact(bytes.len() + 1)
        .map_err(|_| RuntimeError::Allocation { what: "parameter token" })?;
    buf.extend_from_slice(bytes);
    into_cstring(buf)
}

/// Quote a literal value for the engine.
///
/// XPath 1.0 string literals have no escape syntax. A value holding `"` is
/// wrapped in `'` instead, and a value holding both quote characters is
/// spelled as a `concat()` of pieces that each avoid one of them.
fn quoted_literal(index: usize, value: &str) -> Result<CString> {
    check_nul(ParamSequence::Literal, index, "value", value.as_bytes())?;

    let expr = match (value.contains('"'), value.contains('\'')) {
        (false, _) => format!("\"{}\"", value),
        (true, false) => format!("'{}'", value),
        (true, true) => concat_literal(value),
    };

    let mut quoted: Vec<u8> = Vec::new();
    quoted
        .try_reserve_exact(expr.len() + 1)
        .map_err(|_| RuntimeError::Allocation { what: "parameter token" })?;
    quoted.extend_from_slice(expr.as_bytes());
    into_cstring(quoted)
}

/// `it's "x"` becomes `concat('it', "'", 's "x"')`
fn concat_literal(value: &str) -> String {
    let mut pieces: Vec<String> = Vec::new();
    for (i, part) in value.split('\'').enumerate() {
        if i > 0 {
            pieces.push("\"'\"".to_string());
        }
        if !part.is_empty() {
            pieces.push(format!("'{}'", part));
        }
    }
    format!("concat({})", pieces.join(", "))
}
