use axum::Json;
use serde_json::{json, Value};

/// GET /health
/// Returns a simple status object with service version.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "outreach-api"
    }))
}

#[cfg(test)]
mod tests {
    use super::super::build_router;
    use super::super::testing::{send, test_state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let router = build_router(test_state(dir.path()).await);

        let (status, body) = send(router, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "outreach-api");
    }
}
