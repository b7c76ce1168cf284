use std::time::Duration;

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

pub const NAMESPACE: &str = "externaldns_webhook";
pub const PROVIDER_NAME: &str = "unifi";

/// All Prometheus instruments for the webhook, registered on a private
/// registry and injected where needed (no process-wide singleton).
pub struct Metrics {
    pub registry: Registry,

    // HTTP front-end
    pub http_validation_errors_total: CounterVec,
    pub http_json_errors_total: CounterVec,
    pub adjust_endpoints_total: CounterVec,
    pub negotiate_total: CounterVec,

    // DNS business metrics
    pub records_total: GaugeVec,
    pub changes_total: CounterVec,
    pub changes_by_type_total: CounterVec,
    pub cname_conflicts_total: CounterVec,
    pub ignored_cname_targets_total: CounterVec,
    pub srv_parsing_errors_total: CounterVec,
    pub batch_size: HistogramVec,

    // UniFi API metrics
    pub unifi_api_errors_total: CounterVec,
    pub unifi_api_duration_seconds: HistogramVec,
    pub unifi_login_total: CounterVec,
    pub unifi_relogin_total: CounterVec,
    pub unifi_csrf_refreshes_total: CounterVec,
    pub unifi_connected: GaugeVec,
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<CounterVec, prometheus::Error> {
    let c = CounterVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

fn gauge(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<GaugeVec, prometheus::Error> {
    let g = GaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

fn histogram(
    registry: &Registry,
    name: &str,
    help: &str,
    buckets: Vec<f64>,
    labels: &[&str],
) -> Result<HistogramVec, prometheus::Error> {
    let h = HistogramVec::new(
        HistogramOpts::new(name, help)
            .namespace(NAMESPACE)
            .buckets(buckets),
        labels,
    )?;
    registry.register(Box::new(h.clone()))?;
    Ok(h)
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        Ok(Self {
            http_validation_errors_total: counter(
                &registry,
                "http_validation_errors_total",
                "Total number of HTTP header validation errors",
                &["provider", "header_type"],
            )?,
            http_json_errors_total: counter(
                &registry,
                "http_json_errors_total",
                "Total number of JSON decoding errors",
                &["provider", "endpoint"],
            )?,
            adjust_endpoints_total: counter(
                &registry,
                "adjust_endpoints_total",
                "Total number of adjust endpoints calls",
                &["provider"],
            )?,
            negotiate_total: counter(
                &registry,
                "negotiate_total",
                "Total number of negotiate calls",
                &["provider"],
            )?,
            records_total: gauge(
                &registry,
                "records_total",
                "Total number of DNS records by type",
                &["provider", "record_type"],
            )?,
            changes_total: counter(
                &registry,
                "changes_total",
                "Total number of DNS changes",
                &["provider", "operation"],
            )?,
            changes_by_type_total: counter(
                &registry,
                "changes_by_type_total",
                "Total number of DNS changes by record type",
                &["provider", "operation", "record_type"],
            )?,
            cname_conflicts_total: counter(
                &registry,
                "cname_conflicts_total",
                "Total number of CNAME conflicts detected",
                &["provider"],
            )?,
            ignored_cname_targets_total: counter(
                &registry,
                "ignored_cname_targets_total",
                "Total number of ignored CNAME targets (only the first target is used)",
                &["provider"],
            )?,
            srv_parsing_errors_total: counter(
                &registry,
                "srv_parsing_errors_total",
                "Total number of SRV record parsing errors",
                &["provider"],
            )?,
            batch_size: histogram(
                &registry,
                "batch_size",
                "Size of change batches",
                prometheus::exponential_buckets(1.0, 2.0, 10)?,
                &["provider", "operation"],
            )?,
            unifi_api_errors_total: counter(
                &registry,
                "unifi_api_errors_total",
                "Total number of UniFi API errors",
                &["provider", "operation"],
            )?,
            unifi_api_duration_seconds: histogram(
                &registry,
                "unifi_api_duration_seconds",
                "UniFi API request duration in seconds",
                prometheus::DEFAULT_BUCKETS.to_vec(),
                &["provider", "operation"],
            )?,
            unifi_login_total: counter(
                &registry,
                "unifi_login_total",
                "Total number of UniFi login attempts",
                &["provider", "status"],
            )?,
            unifi_relogin_total: counter(
                &registry,
                "unifi_relogin_total",
                "Total number of UniFi re-login attempts after 401",
                &["provider"],
            )?,
            unifi_csrf_refreshes_total: counter(
                &registry,
                "unifi_csrf_refreshes_total",
                "Total number of CSRF token refreshes",
                &["provider"],
            )?,
            unifi_connected: gauge(
                &registry,
                "unifi_connected",
                "UniFi connection status (1 = connected, 0 = disconnected)",
                &["provider"],
            )?,
            registry,
        })
    }

    /// Record duration + outcome of one controller API operation.
    pub fn observe_api_call(&self, operation: &str, duration: Duration, failed: bool) {
        self.unifi_api_duration_seconds
            .with_label_values(&[PROVIDER_NAME, operation])
            .observe(duration.as_secs_f64());
        if failed {
            self.unifi_api_errors_total
                .with_label_values(&[PROVIDER_NAME, operation])
                .inc();
        }
    }

    /// Record one applied DNS change.
    pub fn record_change(&self, operation: &str, record_type: &str) {
        self.changes_total
            .with_label_values(&[PROVIDER_NAME, operation])
            .inc();
        self.changes_by_type_total
            .with_label_values(&[PROVIDER_NAME, operation, record_type])
            .inc();
    }

    pub fn set_records_by_type(&self, record_type: &str, count: usize) {
        self.records_total
            .with_label_values(&[PROVIDER_NAME, record_type])
            .set(count as f64);
    }

    /// Encode every registered metric in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
