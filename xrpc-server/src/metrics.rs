//! Engine metrics definitions
//!
//! OpenTelemetry instruments for the XML-RPC engine. They are recorded only
//! when the engine was built with observability enabled
//! (`EngineBuilder::with_observability` or `with_metrics`) and exported
//! through whatever meter provider is installed globally.
//!
//! # Metrics Collected
//!
//! - **requests_total**: calls answered, by `method` and `outcome`
//!   (`success` / `fault`)
//! - **faults_total**: fault responses, by `code`
//! - **request_duration**: seconds from dispatch to response
//! - **passthrough_total**: requests the `text/xml` step let through
//! - **body_bytes**: size distribution of XML-RPC request bodies
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use xrpc_core::{Fault, MethodResponse};
//! use xrpc_server::ServerMetrics;
//!
//! let metrics = ServerMetrics::new("blog-rpc");
//! metrics.record_response("blogger.getUsersBlogs", &MethodResponse::Fault(Fault::parse_error()), Duration::from_millis(3));
//! metrics.record_body(512);
//! ```

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};
use std::time::Duration;
use xrpc_core::MethodResponse;

/// Engine metrics for monitoring
///
/// All instruments are prefixed with `xrpc.server.*`.
pub struct ServerMetrics {
    /// Calls answered
    pub requests_total: Counter<u64>,
    /// Fault responses sent
    pub faults_total: Counter<u64>,
    /// Dispatch-to-response latency in seconds
    pub request_duration: Histogram<f64>,
    /// Requests passed through without XML-RPC processing
    pub passthrough_total: Counter<u64>,
    /// Request body sizes in bytes
    pub body_bytes: Histogram<u64>,
}

impl ServerMetrics {
    /// Create instruments on the global meter for `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create instruments on a specific meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("xrpc.server.requests.total")
                .with_description("Total number of XML-RPC calls answered")
                .build(),
            faults_total: meter
                .u64_counter("xrpc.server.faults.total")
                .with_description("Total number of fault responses")
                .build(),
            request_duration: meter
                .f64_histogram("xrpc.server.request.duration")
                .with_description("Time from dispatch to response in seconds")
                .with_unit("s")
                .build(),
            passthrough_total: meter
                .u64_counter("xrpc.server.passthrough.total")
                .with_description("Requests passed through without XML-RPC processing")
                .build(),
            body_bytes: meter
                .u64_histogram("xrpc.server.body.bytes")
                .with_description("Size of XML-RPC request bodies")
                .with_unit("By")
                .build(),
        }
    }

    /// Record the response of one call
    pub fn record_response(&self, method: &str, response: &MethodResponse, elapsed: Duration) {
        let outcome = if response.is_success() { "success" } else { "fault" };
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("outcome", outcome),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(elapsed.as_secs_f64(), attributes);

        if let Some(fault) = response.fault() {
            self.faults_total
                .add(1, &[KeyValue::new("code", i64::from(fault.code))]);
        }
    }

    /// Record a request that was not `text/xml`
    pub fn record_passthrough(&self) {
        self.passthrough_total.add(1, &[]);
    }

    /// Record the size of an XML-RPC body
    pub fn record_body(&self, bytes: usize) {
        self.body_bytes.record(bytes as u64, &[]);
    }
}

impl std::fmt::Debug for ServerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerMetrics").finish_non_exhaustive()
    }
}
