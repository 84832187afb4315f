//! Owned native handles.
//!
//! An [`OwnedHandle`] holds exactly one engine pointer together with a tag
//! naming its destructor. The host never sees the pointer: it holds
//! [`Document`] or [`Stylesheet`] references, which are cheap `Rc` clones of
//! the same owner. When the last reference goes away (for a JS object, when
//! the garbage collector finalizes it) `Drop` runs the destructor exactly
//! once.
//!
//! Operations borrow a reference for their whole duration, so a handle can
//! never be freed while a call is using it. Raw pointers are only lent out
//! through `with_raw` and must not be kept past the closure.

use crate::metrics::{MetricsCollector, ResourceKind};
use crate::native::{Engine, RawDocument, RawStylesheet};
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Which destructor releases a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// Freed with the engine's document destructor
    Document,
    /// Freed with the engine's stylesheet destructor
    Stylesheet,
}

impl HandleKind {
    fn resource(self) -> ResourceKind {
        match self {
            HandleKind::Document => ResourceKind::Document,
            HandleKind::Stylesheet => ResourceKind::Stylesheet,
        }
    }
}

/// Exclusive owner of one native handle
pub struct OwnedHandle {
    id: u64,
    kind: HandleKind,
    /// Taken exactly once, by `Drop`
    ptr: Option<NonNull<c_void>>,
    engine: Rc<dyn Engine>,
    metrics: Arc<MetricsCollector>,
}

impl OwnedHandle {
    /// Take ownership of a handle produced by a successful parse or compile.
    ///
    /// From here on the handle must not be freed by anyone else.
    pub fn wrap(
        engine: Rc<dyn Engine>,
        metrics: Arc<MetricsCollector>,
        ptr: NonNull<c_void>,
        kind: HandleKind,
    ) -> Self {
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        metrics.record_acquire(kind.resource());
        trace!(handle_id = id, kind = ?kind, "Wrapped native handle");

        Self {
            id,
            kind,
            ptr: Some(ptr),
            engine,
            metrics,
        }
    }

    /// Process-unique id, for logs
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Destructor tag
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    fn ptr(&self) -> NonNull<c_void> {
        match self.ptr {
            Some(ptr) => ptr,
            // Only `Drop` empties the slot, and nothing can borrow `self` after that.
            None => unreachable!("native handle {} used after finalization", self.id),
        }
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        let Some(ptr) = self.ptr.take() else {
            return;
        };

        // SAFETY: `ptr` came from this engine, is exclusively owned by this
        // wrapper, and the slot is now empty so it cannot be freed again.
        unsafe {
            match self.kind {
                HandleKind::Document => self.engine.free_document(RawDocument::from_nonnull(ptr)),
                HandleKind::Stylesheet => {
                    self.engine.free_stylesheet(RawStylesheet::from_nonnull(ptr))
                }
            }
        }

        self.metrics.record_release(self.kind.resource());
        trace!(handle_id = self.id, kind = ?self.kind, "Finalized native handle");
    }
}

impl fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("engine", &self.engine.name())
            .finish()
    }
}

/// How a document was parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOrigin {
    /// Strict XML parser
    Xml,
    /// HTML parser in recovery mode
    Html,
}

/// Reference to a parsed document
#[derive(Debug, Clone)]
pub struct Document {
    handle: Rc<OwnedHandle>,
    origin: DocumentOrigin,
}

impl Document {
    pub(crate) fn new(handle: OwnedHandle, origin: DocumentOrigin) -> Self {
        debug_assert_eq!(handle.kind(), HandleKind::Document);
        Self {
            handle: Rc::new(handle),
            origin,
        }
    }

    /// Handle id, for logs
    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    /// Parser that produced the document
    pub fn origin(&self) -> DocumentOrigin {
        self.origin
    }

    /// Number of live references to the underlying handle
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.handle)
    }

    /// Lend the raw handle to `f`; it must not escape the closure
    pub fn with_raw<R>(&self, f: impl FnOnce(RawDocument) -> R) -> R {
        f(RawDocument::from_nonnull(self.handle.ptr()))
    }
}

/// Reference to a compiled stylesheet
#[derive(Debug, Clone)]
pub struct Stylesheet {
    handle: Rc<OwnedHandle>,
}

impl Stylesheet {
    pub(crate) fn new(handle: OwnedHandle) -> Self {
        debug_assert_eq!(handle.kind(), HandleKind::Stylesheet);
        Self {
            handle: Rc::new(handle),
        }
    }

    /// Handle id, for logs
    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    /// Number of live references to the underlying handle
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.handle)
    }

    /// Lend the raw handle to `f`; it must not escape the closure
    pub fn with_raw<R>(&self, f: impl FnOnce(RawStylesheet) -> R) -> R {
        f(RawStylesheet::from_nonnull(self.handle.ptr()))
    }
}
