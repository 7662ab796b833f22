//! # Request Metrics
//!
//! Records every API request through the `metrics` facade. The installed
//! Prometheus recorder renders them on `/metrics` next to the engine's
//! own counters.
//!
//! - `http_requests_total`: counter labelled `method`, `route`, `status`
//! - `http_request_duration_seconds`: histogram with the same labels
//!
//! `route` is the matched route template, never the raw path, so order
//! ids do not become label values.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};

/// Middleware that records request count and latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    counter!(
        "http_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "route" => route,
        "status" => status
    )
    .record(started.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    #[tokio::test]
    async fn records_route_template_and_status() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/orders/{id}", get(|| async { StatusCode::CONFLICT }))
            .layer(from_fn(metrics_middleware));

        for uri in ["/ok", "/orders/a", "/orders/b"] {
            app.clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
        }

        let text = handle.render();
        let line = |route: &str, status: &str| {
            text.lines()
                .find(|l| {
                    l.starts_with("http_requests_total{")
                        && l.contains(&format!("route=\"{route}\""))
                        && l.contains(&format!("status=\"{status}\""))
                })
                .map(str::to_string)
        };
        let conflicts = line("/orders/{id}", "409").unwrap_or_else(|| panic!("{text}"));
        assert!(conflicts.ends_with(" 2"), "{conflicts}");
        assert!(conflicts.contains("method=\"GET\""));
        let ok = line("/ok", "200").unwrap_or_else(|| panic!("{text}"));
        assert!(ok.ends_with(" 1"), "{ok}");
        assert!(!text.contains("/orders/a"));
        assert!(text.contains("http_request_duration_seconds"));
    }
}
