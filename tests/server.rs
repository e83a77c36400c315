mod common;

use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App};
use common::{broken_log, service, ScriptedSource};
use system_health_dashboard::{
    server::{manager::configure, pages::SampleResponse},
    telemetry::{Query, TelemetryService},
};

macro_rules! app {
    ($service:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from($service.clone()))
                .configure(configure),
        )
        .await
    };
}

async fn ticked(values: &[f64]) -> Arc<TelemetryService> {
    let service = service(ScriptedSource::cpu(values.to_vec()), broken_log(), 10);
    for _ in values {
        service.tick().await;
    }
    service
}

#[actix_web::test]
async fn stats_returns_the_latest_sample() {
    let service = ticked(&[12.5, 37.0]).await;
    let app = app!(service);

    let request = test::TestRequest::get().uri("/stats").to_request();
    let response: SampleResponse = test::call_and_read_body_json(&app, request).await;

    let latest = service.latest().unwrap();
    assert_eq!(response.cpu, 37.0);
    assert_eq!(response.memory, latest.mem_pct());
    assert_eq!(response.disk, latest.disk_pct());
    assert_eq!(response.time, latest.formatted_time());
}

#[actix_web::test]
async fn stats_is_unavailable_before_the_first_sample() {
    let service = ticked(&[]).await;
    let app = app!(service);

    let request = test::TestRequest::get().uri("/stats").to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn history_supports_limit_and_versioned_route() {
    let service = ticked(&[1.0, 2.0, 3.0, 4.0]).await;
    let app = app!(service);

    for uri in ["/history?limit=2", "/v1/history?limit=2"] {
        let request = test::TestRequest::get().uri(uri).to_request();
        let response: Vec<SampleResponse> = test::call_and_read_body_json(&app, request).await;
        let cpu: Vec<f64> = response.iter().map(|sample| sample.cpu).collect();
        assert_eq!(cpu, vec![3.0, 4.0], "{uri}");
    }

    let request = test::TestRequest::get().uri("/history").to_request();
    let response: Vec<SampleResponse> = test::call_and_read_body_json(&app, request).await;
    assert_eq!(response.len(), 4);
}

#[actix_web::test]
async fn history_since_excludes_the_named_second() {
    let service = ticked(&[1.0, 2.0]).await;
    let app = app!(service);
    let samples = service.query(Query::All);

    let latest = samples[1].formatted_time().replace(' ', "%20");
    let request = test::TestRequest::get()
        .uri(&format!("/history?since={latest}"))
        .to_request();
    let response: Vec<SampleResponse> = test::call_and_read_body_json(&app, request).await;
    assert!(response.is_empty(), "{response:?}");

    let before = (samples[0].timestamp() - chrono::Duration::seconds(1))
        .format("%Y-%m-%d%%20%H:%M:%S")
        .to_string();
    let request = test::TestRequest::get()
        .uri(&format!("/history?since={before}"))
        .to_request();
    let response: Vec<SampleResponse> = test::call_and_read_body_json(&app, request).await;
    let cpu: Vec<f64> = response.iter().map(|sample| sample.cpu).collect();
    assert_eq!(cpu, vec![1.0, 2.0]);
}

#[actix_web::test]
async fn history_rejects_bad_queries() {
    let service = ticked(&[1.0]).await;
    let app = app!(service);

    for uri in [
        "/history?limit=1&since=2024-05-01%2012:00:00",
        "/history?since=yesterday",
        "/history?limit=-1",
    ] {
        let request = test::TestRequest::get().uri(uri).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[actix_web::test]
async fn status_reports_counters() {
    let service = ticked(&[1.0, 2.0]).await;
    let app = app!(service);

    let request = test::TestRequest::get().uri("/status").to_request();
    let status: serde_json::Value = test::call_and_read_body_json(&app, request).await;

    assert_eq!(status["state"], "stopped");
    assert_eq!(status["total_ticks"], 2);
    assert_eq!(status["failed_ticks"], 0);
    assert_eq!(status["write_failures"], 2);
    assert_eq!(status["last_write_error"], "Durable log unavailable: disk full");
}

#[actix_web::test]
async fn dashboard_page_is_served() {
    let service = ticked(&[]).await;
    let app = app!(service);

    let request = test::TestRequest::get().uri("/").to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let request = test::TestRequest::get().uri("/missing.js").to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
