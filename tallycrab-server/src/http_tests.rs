#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tallycrab::{AdmissionGate, App, TtlCache};
    use tower::ServiceExt;

    use crate::http::{AppState, router};
    use crate::metrics::Metrics;
    use crate::report::Reporter;
    use crate::service::Service;
    use crate::storage::MemoryStorage;

    fn test_router(interval: Duration, max_apps: i64) -> Router {
        let gate = AdmissionGate::builder().interval(interval).build();
        let credentials = TtlCache::new(Duration::from_secs(86_400));
        let service = Arc::new(Service::new(
            Arc::new(MemoryStorage::new()),
            gate,
            credentials,
            Reporter::disabled(),
            max_apps,
        ));
        let metrics = Arc::new(Metrics::new());
        router(
            AppState { service, metrics },
            None,
        )
    }

    /// A router whose gate admits everything
    fn open_router() -> Router {
        test_router(Duration::ZERO, 5)
    }

    async fn get(app: &Router, uri: &str, ip: &str) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header("x-real-ip", ip)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    async fn create_app(app: &Router, name: &str, ip: &str) -> App {
        let response = get(app, &format!("/app/create/{name}"), ip).await;
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_full_counting_flow() {
        let app = open_router();
        let registered = create_app(&app, "my-blog", "10.0.0.1").await;

        let uri = format!(
            "/app/{}/action/click/create?token={}",
            registered.id, registered.token
        );
        let response = get(&app, &uri, "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"null");

        let uri = format!(
            "/app/{}/action/click/create?token={}&count=4",
            registered.id, registered.token
        );
        let response = get(&app, &uri, "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::OK);

        let uri = format!("/app/{}/action/click/count/2h", registered.id);
        let response = get(&app, &uri, "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!(5));

        let uri = format!("/app/{}/action/click/summary", registered.id);
        let response = get(&app, &uri, "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::OK);
        // Assert the day window rather than the hour window so the test
        // cannot trip over an hour boundary between report and read
        let summary = body_json(response).await;
        assert_eq!(summary["day"], 5);
        assert_eq!(summary["year"], 5);
    }

    #[tokio::test]
    async fn test_create_app_speaks_camel_case() {
        let app = open_router();

        let response = get(&app, "/app/create/cased?strict_auth=true", "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;

        assert_eq!(body["name"], "cased");
        assert_eq!(body["strictAuth"], true);
        assert_eq!(body["ip"], "10.0.0.1");
        assert!(body["createdAt"].is_string());
        assert_eq!(body["token"].as_str().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_token_header_is_accepted() {
        let app = open_router();
        let registered = create_app(&app, "headered", "10.0.0.1").await;

        let uri = format!("/app/{}/action/click/create", registered.id);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(&uri)
                    .header("x-real-ip", "10.0.0.1")
                    .header("TOKEN", &registered.token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_write_without_token_is_unauthorized() {
        let app = open_router();
        let registered = create_app(&app, "locked", "10.0.0.1").await;

        let uri = format!("/app/{}/action/click/create", registered.id);
        let response = get(&app, &uri, "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid token for application");

        let uri = format!("/app/{}/action/click/create?token=wrong", registered.id);
        let response = get(&app, &uri, "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_app_is_unauthorized() {
        let app = open_router();

        let response = get(
            &app,
            "/app/zzzzzzzzzz/action/click/create?token=whatever",
            "10.0.0.1",
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_strict_app_guards_reads() {
        let app = open_router();

        let response = get(&app, "/app/create/guarded?strict_auth=true", "10.0.0.1").await;
        let strict: App = serde_json::from_slice(&body_bytes(response).await).unwrap();

        let uri = format!("/app/{}/action/click/count/1h", strict.id);
        let response = get(&app, &uri, "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let uri = format!(
            "/app/{}/action/click/count/1h?token={}",
            strict.id, strict.token
        );
        let response = get(&app, &uri, "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!(0));

        // Permissive applications serve reads to anyone
        let open = create_app(&app, "open", "10.0.0.2").await;
        let uri = format!("/app/{}/action/click/count/1h", open.id);
        let response = get(&app, &uri, "10.0.0.2").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rapid_repeats_hit_the_gate() {
        // A wide interval keeps the second request inside it even on a
        // heavily loaded test machine
        let app = test_router(Duration::from_secs(60), 5);

        let response = get(&app, "/app/create/first", "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(&app, "/app/create/second", "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["error"], "rate limit exceeded (1 request per second)");

        // Another caller is not held up
        let response = get(&app, "/app/create/third", "10.0.0.2").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_app_cap_returns_forbidden() {
        let app = test_router(Duration::ZERO, 1);

        let response = get(&app, "/app/create/only", "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(&app, "/app/create/onetoomany", "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"], "application limit reached for this address");
    }

    #[tokio::test]
    async fn test_bad_count_is_rejected() {
        let app = open_router();
        let registered = create_app(&app, "strict-counts", "10.0.0.1").await;

        for bad in ["abc", "0", "-3", "1.5"] {
            let uri = format!(
                "/app/{}/action/click/create?token={}&count={}",
                registered.id, registered.token, bad
            );
            let response = get(&app, &uri, "10.0.0.1").await;
            assert_eq!(
                response.status(),
                StatusCode::BAD_REQUEST,
                "count {bad} must be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_bad_duration_is_rejected() {
        let app = open_router();
        let registered = create_app(&app, "durations", "10.0.0.1").await;

        let uri = format!("/app/{}/action/click/count/notaduration", registered.id);
        let response = get(&app, &uri, "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid lookback duration");
    }

    #[tokio::test]
    async fn test_stats_needs_no_credentials() {
        let app = open_router();
        create_app(&app, "counted", "10.0.0.1").await;

        let response = get(&app, "/stats", "10.0.0.9").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["apps"], 1);
        assert_eq!(body["actionsRecorded"], 0);
        assert_eq!(body["countsCalculated"], 0);
        assert_eq!(body["summariesCalculated"], 0);
    }

    #[tokio::test]
    async fn test_health_and_metrics_endpoints() {
        let app = open_router();

        let response = get(&app, "/health", "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"OK");

        create_app(&app, "measured", "10.0.0.1").await;

        let response = get(&app, "/metrics", "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(text.contains("tallycrab_requests_total 1"));
        assert!(text.contains("tallycrab_operations_completed{operation=\"create-app\"} 1"));
    }
}
