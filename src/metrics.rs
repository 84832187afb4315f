//! Resource and operation metrics.
//!
//! Every native handle the runtime creates or frees is counted here, which
//! is what makes leaks and double frees observable. Operation counts and
//! timings are collected alongside for monitoring.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Kind of native resource tracked by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Document owned by a `Document` wrapper
    Document,
    /// Compiled stylesheet owned by a `Stylesheet` wrapper
    Stylesheet,
    /// Transient document (stylesheet source or transform result)
    TransientDocument,
    /// Per-call XPath evaluation context
    XPathContext,
}

impl ResourceKind {
    const ALL: [ResourceKind; 4] = [
        ResourceKind::Document,
        ResourceKind::Stylesheet,
        ResourceKind::TransientDocument,
        ResourceKind::XPathContext,
    ];

    fn index(self) -> usize {
        match self {
            ResourceKind::Document => 0,
            ResourceKind::Stylesheet => 1,
            ResourceKind::TransientDocument => 2,
            ResourceKind::XPathContext => 3,
        }
    }

    /// Label used in exported metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Document => "document",
            ResourceKind::Stylesheet => "stylesheet",
            ResourceKind::TransientDocument => "transient_document",
            ResourceKind::XPathContext => "xpath_context",
        }
    }
}

/// Façade operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// `parse_xml`
    ParseXml,
    /// `parse_html`
    ParseHtml,
    /// `compile_stylesheet`
    CompileStylesheet,
    /// `evaluate_xpath`
    EvaluateXPath,
    /// `transform` / `transform_bytes`
    Transform,
    /// `serialize`
    Serialize,
}

impl Operation {
    /// Label used in exported metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ParseXml => "parse_xml",
            Operation::ParseHtml => "parse_html",
            Operation::CompileStylesheet => "compile_stylesheet",
            Operation::EvaluateXPath => "evaluate_xpath",
            Operation::Transform => "transform",
            Operation::Serialize => "serialize",
        }
    }
}

/// Runtime statistics snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStats {
    /// Total operations executed
    pub total_operations: u64,

    /// Operations that returned an error
    pub failed_operations: u64,

    /// Documents currently owned by live wrappers
    pub live_documents: u64,

    /// Stylesheets currently owned by live wrappers
    pub live_stylesheets: u64,

    /// Transient documents not yet released (should be 0 between calls)
    pub live_transient_documents: u64,

    /// XPath contexts not yet released (should be 0 between calls)
    pub live_xpath_contexts: u64,

    /// Average operation time in microseconds
    pub avg_operation_time_us: f64,
}

/// Metrics collector for aggregating runtime metrics
pub struct MetricsCollector {
    acquired: [AtomicU64; 4],
    released: [AtomicU64; 4],
    total_operations: AtomicU64,
    failed_operations: AtomicU64,
    total_operation_time_us: AtomicU64,
    operation_counts: parking_lot::Mutex<HashMap<(Operation, bool), u64>>,
    error_counts: parking_lot::Mutex<HashMap<String, u64>>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            acquired: Default::default(),
            released: Default::default(),
            total_operations: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
            total_operation_time_us: AtomicU64::new(0),
            operation_counts: parking_lot::Mutex::new(HashMap::new()),
            error_counts: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Record a native resource coming into existence
    pub fn record_acquire(&self, kind: ResourceKind) {
        self.acquired[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Record a native resource being freed
    pub fn record_release(&self, kind: ResourceKind) {
        self.released[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Total resources of a kind ever acquired
    pub fn acquired(&self, kind: ResourceKind) -> u64 {
        self.acquired[kind.index()].load(Ordering::Relaxed)
    }

    /// Total resources of a kind ever released
    pub fn released(&self, kind: ResourceKind) -> u64 {
        self.released[kind.index()].load(Ordering::Relaxed)
    }

    /// Resources of a kind currently alive
    pub fn live(&self, kind: ResourceKind) -> u64 {
        self.acquired(kind).saturating_sub(self.released(kind))
    }

    /// Record a finished operation
    pub fn record_operation(&self, operation: Operation, duration: Duration, success: bool) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_operations.fetch_add(1, Ordering::Relaxed);
        }
        self.total_operation_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        *self
            .operation_counts
            .lock()
            .entry((operation, success))
            .or_insert(0) += 1;
    }

    /// Record an error
    pub fn record_error(&self, error_code: &str) {
        let mut counts = self.error_counts.lock();
        *counts.entry(error_code.to_string()).or_insert(0) += 1;
    }

    /// Get total operations
    pub fn total_operations(&self) -> u64 {
        self.total_operations.load(Ordering::Relaxed)
    }

    /// Get failed operations
    pub fn failed_operations(&self) -> u64 {
        self.failed_operations.load(Ordering::Relaxed)
    }

    /// Get average operation time in microseconds
    pub fn avg_operation_time_us(&self) -> f64 {
        let total = self.total_operations.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            self.total_operation_time_us.load(Ordering::Relaxed) as f64 / total as f64
        }
    }

    /// Get error counts
    pub fn error_counts(&self) -> HashMap<String, u64> {
        self.error_counts.lock().clone()
    }

    /// Snapshot the collector
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            total_operations: self.total_operations(),
            failed_operations: self.failed_operations(),
            live_documents: self.live(ResourceKind::Document),
            live_stylesheets: self.live(ResourceKind::Stylesheet),
            live_transient_documents: self.live(ResourceKind::TransientDocument),
            live_xpath_contexts: self.live(ResourceKind::XPathContext),
            avg_operation_time_us: self.avg_operation_time_us(),
        }
    }

    /// Export Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP xslt_operations_total Operations by outcome\n");
        output.push_str("# TYPE xslt_operations_total counter\n");
        let mut operations: Vec<_> = self
            .operation_counts
            .lock()
            .iter()
            .map(|(&(op, success), &count)| (op.as_str(), success, count))
            .collect();
        operations.sort();
        for (op, success, count) in operations {
            output.push_str(&format!(
                "xslt_operations_total{{operation=\"{}\",status=\"{}\"}} {}\n",
                op,
                if success { "success" } else { "error" },
                count
            ));
        }

        output.push_str("\n# HELP xslt_operation_time_us Average operation time\n");
        output.push_str("# TYPE xslt_operation_time_us gauge\n");
        output.push_str(&format!(
            "xslt_operation_time_us {:.2}\n",
            self.avg_operation_time_us()
        ));

        output.push_str("\n# HELP xslt_native_handles Native handles currently alive\n");
        output.push_str("# TYPE xslt_native_handles gauge\n");
        for kind in ResourceKind::ALL {
            output.push_str(&format!(
                "xslt_native_handles{{kind=\"{}\"}} {}\n",
                kind.as_str(),
                self.live(kind)
            ));
        }

        output.push_str("\n# HELP xslt_native_handles_freed_total Native handles released\n");
        output.push_str("# TYPE xslt_native_handles_freed_total counter\n");
        for kind in ResourceKind::ALL {
            output.push_str(&format!(
                "xslt_native_handles_freed_total{{kind=\"{}\"}} {}\n",
                kind.as_str(),
                self.released(kind)
            ));
        }

        output.push_str("\n# HELP xslt_errors_total Error counts by code\n");
        output.push_str("# TYPE xslt_errors_total counter\n");
        for (code, count) in self.error_counts() {
            output.push_str(&format!("xslt_errors_total{{code=\"{}\"}} {}\n", code, count));
        }

        output
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for measuring operation duration
pub struct OperationTimer {
    operation: Operation,
    start: Instant,
}

impl OperationTimer {
    /// Start a new timer
    pub fn start(operation: Operation) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record the outcome of the timed operation
    pub fn finish<T>(
        self,
        metrics: &MetricsCollector,
        result: &crate::error::Result<T>,
    ) {
        let elapsed = self.elapsed();
        metrics.record_operation(self.operation, elapsed, result.is_ok());
        if let Err(e) = result {
            metrics.record_error(e.code().as_str());
        }
    }
}
