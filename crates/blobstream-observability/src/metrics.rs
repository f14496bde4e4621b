use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Producer Metrics
    // ============================================================================

    /// Total number of events written
    pub static ref PRODUCER_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobstream_producer_events_total", "Total events written"),
        &["partition"]
    ).expect("metric can be created");

    /// Total payload bytes written
    pub static ref PRODUCER_BYTES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobstream_producer_bytes_total", "Total payload bytes written"),
        &["partition"]
    ).expect("metric can be created");

    /// Producer errors (a failed blob write burns the allocated sequence number)
    pub static ref PRODUCER_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobstream_producer_errors_total", "Total producer errors"),
        &["partition", "error_type"]
    ).expect("metric can be created");

    // ============================================================================
    // Consumer Metrics
    // ============================================================================

    /// Total number of events delivered to handlers
    pub static ref CONSUMER_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobstream_consumer_events_total", "Total events delivered"),
        &["partition", "consumer"]
    ).expect("metric can be created");

    /// Slots skipped because the blob was never written
    pub static ref CONSUMER_GAPS_SKIPPED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobstream_consumer_gaps_skipped_total", "Total missing slots skipped"),
        &["partition", "consumer"]
    ).expect("metric can be created");

    /// Consumer lag (committed counter minus checkpoint) at the end of a batch
    pub static ref CONSUMER_LAG: IntGaugeVec = IntGaugeVec::new(
        Opts::new("blobstream_consumer_lag", "Consumer lag in number of events"),
        &["partition", "consumer"]
    ).expect("metric can be created");

    // ============================================================================
    // Coordination Metrics
    // ============================================================================

    /// Lease acquisitions rejected because another owner holds the lease
    pub static ref LEASE_CONTENTION_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobstream_lease_contention_total", "Total rejected lease acquisitions"),
        &["scope"] // partition, consumer
    ).expect("metric can be created");

    /// Notifications published to the topic
    pub static ref NOTIFICATIONS_PUBLISHED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobstream_notifications_published_total", "Total notifications published"),
        &["partition"]
    ).expect("metric can be created");

    /// Notification triggers collapsed into an open debounce window
    pub static ref NOTIFICATIONS_SUPPRESSED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobstream_notifications_suppressed_total", "Total notifications suppressed"),
        &["partition"]
    ).expect("metric can be created");

    // ============================================================================
    // Blob Store Metrics
    // ============================================================================

    /// Blob requests by operation type
    pub static ref BLOB_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobstream_blob_requests_total", "Total blob store requests"),
        &["operation"] // GET, PUT, LIST
    ).expect("metric can be created");

    /// Blob errors by type
    pub static ref BLOB_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobstream_blob_errors_total", "Total blob store errors"),
        &["operation", "error_type"] // not_found, failed
    ).expect("metric can be created");

    /// Blob request latency
    pub static ref BLOB_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("blobstream_blob_latency_seconds", "Blob store latency in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["operation"]
    ).expect("metric can be created");
}

/// Initialize metrics registry
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        // Producer metrics
        REGISTRY
            .register(Box::new(PRODUCER_EVENTS_TOTAL.clone()))
            .expect("producer_events_total can be registered");
        REGISTRY
            .register(Box::new(PRODUCER_BYTES_TOTAL.clone()))
            .expect("producer_bytes_total can be registered");
        REGISTRY
            .register(Box::new(PRODUCER_ERRORS_TOTAL.clone()))
            .expect("producer_errors_total can be registered");

        // Consumer metrics
        REGISTRY
            .register(Box::new(CONSUMER_EVENTS_TOTAL.clone()))
            .expect("consumer_events_total can be registered");
        REGISTRY
            .register(Box::new(CONSUMER_GAPS_SKIPPED_TOTAL.clone()))
            .expect("consumer_gaps_skipped_total can be registered");
        REGISTRY
            .register(Box::new(CONSUMER_LAG.clone()))
            .expect("consumer_lag can be registered");

        // Coordination metrics
        REGISTRY
            .register(Box::new(LEASE_CONTENTION_TOTAL.clone()))
            .expect("lease_contention_total can be registered");
        REGISTRY
            .register(Box::new(NOTIFICATIONS_PUBLISHED_TOTAL.clone()))
            .expect("notifications_published_total can be registered");
        REGISTRY
            .register(Box::new(NOTIFICATIONS_SUPPRESSED_TOTAL.clone()))
            .expect("notifications_suppressed_total can be registered");

        // Blob store metrics
        REGISTRY
            .register(Box::new(BLOB_REQUESTS_TOTAL.clone()))
            .expect("blob_requests_total can be registered");
        REGISTRY
            .register(Box::new(BLOB_ERRORS_TOTAL.clone()))
            .expect("blob_errors_total can be registered");
        REGISTRY
            .register(Box::new(BLOB_LATENCY.clone()))
            .expect("blob_latency can be registered");
    });
}

/// Render every registered metric in the Prometheus text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;

    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
