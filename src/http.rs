use crate::collectors::MetricsProvider;
use crate::metrics::Telemetry;
use crate::snapshot::{collect_snapshot, SnapshotOptions};
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
pub struct HttpAppState {
    pub provider: Arc<dyn MetricsProvider>,
    pub options: Arc<SnapshotOptions>,
    pub telemetry: Arc<Telemetry>,
    pub cors_allow_origin: HeaderValue,
}

pub fn build_router(state: HttpAppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(snapshot_handler))
        .route("/agent/metrics", get(telemetry_handler))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn snapshot_handler(State(state): State<HttpAppState>) -> Response {
    state.telemetry.inc_request();
    let mut response = match collect_snapshot(state.provider.clone(), &state.options).await {
        Ok(collected) => {
            state.telemetry.observe_snapshot(&collected);
            info!(
                elapsed_ms = collected.elapsed.as_millis() as u64,
                interfaces = collected.metrics.network.len(),
                network_degraded = collected.network_degraded,
                "снимок метрик отдан"
            );
            Json(collected.metrics).into_response()
        }
        Err(err) => {
            state.telemetry.inc_failure(err.source_label());
            error!(error = %err, "не удалось собрать снимок метрик");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    };
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, state.cors_allow_origin.clone());
    response
}

async fn telemetry_handler(State(state): State<HttpAppState>) -> Response {
    match state.telemetry.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("ошибка кодирования метрик: {err}"),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::fake::FakeProvider;
    use crate::collectors::{InterfaceCounters, Query};
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::path::PathBuf;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with(provider: FakeProvider) -> (Router, Arc<Telemetry>) {
        let telemetry = Telemetry::new().expect("инициализация метрик");
        let state = HttpAppState {
            provider: Arc::new(provider),
            options: Arc::new(SnapshotOptions {
                root_path: PathBuf::from("/"),
                observation_window: Duration::from_millis(50),
                cpu_window: Duration::from_millis(50),
                overlap_windows: true,
                deadline: Some(Duration::from_secs(5)),
            }),
            telemetry: telemetry.clone(),
            cors_allow_origin: HeaderValue::from_static("*"),
        };
        (build_router(state), telemetry)
    }

    async fn get_path(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn eth0(bytes_sent: u64) -> InterfaceCounters {
        InterfaceCounters {
            name: "eth0".to_string(),
            bytes_sent,
            bytes_recv: 10,
            packets_sent: 3,
            packets_recv: 4,
            ..InterfaceCounters::default()
        }
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let (app, _) = app_with(FakeProvider::new());
        let response = get_path(app, "/healthz").await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn metrics_returns_json_snapshot_with_cors() {
        let provider =
            FakeProvider::new().with_counters(vec![vec![eth0(100)], vec![eth0(200)]]);
        let (app, _) = app_with(provider);
        let response = get_path(app, "/metrics").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        for key in ["timestamp", "system", "cpu", "memory", "disk", "network", "gpu"] {
            assert!(body.get(key).is_some(), "нет поля {key}");
        }
        assert_eq!(body["system"]["hostname"], "fake-host");
        assert_eq!(body["cpu"]["load_average"]["1min"], 0.5);
        assert_eq!(body["memory"]["total_gb"], 16.0);
        assert_eq!(body["disk"]["disk_io"]["write_mb"], 20.0);
        assert_eq!(body["network"]["eth0"]["bytes_sent"], 200);
        assert_eq!(body["network"]["eth0"]["packets_recv"], 4);
        assert_eq!(body["gpu"]["available"], false);
        assert!(body["gpu"]["error"].as_str().is_some_and(|e| !e.is_empty()));
        assert_eq!(body["gpu"]["gpus"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn empty_disk_list_serializes_null_io() {
        let provider = FakeProvider::new().with_disk_io(Vec::new());
        let (app, _) = app_with(provider);
        let response = get_path(app, "/metrics").await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["disk"]["disk_io"]["read_mb"].is_null());
        assert!(body["disk"]["disk_io"]["write_mb"].is_null());
    }

    #[tokio::test]
    async fn provider_failure_is_server_error_text() {
        let (app, telemetry) = app_with(FakeProvider::new().failing(Query::DiskUsage));
        let response = get_path(app, "/metrics").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("disk_usage"));
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_err());

        let encoded = String::from_utf8(telemetry.encode_metrics().unwrap()).unwrap();
        assert!(encoded.contains("agent_snapshot_failures_total{query=\"disk_usage\"} 1"));
    }

    #[tokio::test]
    async fn agent_metrics_counts_requests() {
        let (app, _) = app_with(FakeProvider::new());
        let _ = get_path(app.clone(), "/metrics").await;
        let response = get_path(app, "/agent/metrics").await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("agent_snapshot_requests_total 1"));
        assert!(text.contains("agent_snapshot_duration_seconds"));
    }
}
