use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder};

/// Metrics collects and exposes HTTP and order metrics.
pub struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    errors_total: CounterVec,
    orders_created_total: IntCounter,
    payment_webhooks_total: CounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "endpoint"],
        )?;
        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total number of errors"),
            &["source", "endpoint"],
        )?;
        let orders_created_total =
            IntCounter::new("orders_created_total", "Total number of orders created")?;
        let payment_webhooks_total = CounterVec::new(
            Opts::new(
                "payment_webhooks_total",
                "Payment provider callbacks by outcome",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(orders_created_total.clone()))?;
        registry.register(Box::new(payment_webhooks_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            errors_total,
            orders_created_total,
            payment_webhooks_total,
        })
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration.as_secs_f64());
    }

    fn record_error(&self, source: &str, endpoint: &str) {
        self.errors_total.with_label_values(&[source, endpoint]).inc();
    }

    pub fn record_order_created(&self) {
        self.orders_created_total.inc();
    }

    pub fn record_webhook(&self, outcome: &str) {
        self.payment_webhooks_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Renders the registry in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Middleware for collecting metrics on HTTP requests.
///
/// Requests are labelled by route template so path parameters do not blow up
/// label cardinality.
pub async fn metrics_middleware(
    State(metrics): State<Arc<Metrics>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(req).await;
    let status = response.status().as_u16();

    metrics.record_request(&method, &endpoint, status, start.elapsed());
    if status >= 400 {
        metrics.record_error("http", &endpoint);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_export() {
        let metrics = Metrics::new().unwrap();
        metrics.record_order_created();
        metrics.record_webhook("reconciled");
        metrics.record_request("GET", "/health", 200, Duration::from_millis(3));

        let text = metrics.encode().unwrap();

        assert!(text.contains("orders_created_total 1"));
        assert!(text.contains(r#"payment_webhooks_total{outcome="reconciled"} 1"#));
        assert!(text.contains(r#"http_requests_total{endpoint="/health",method="GET",status="200"} 1"#));
    }
}
