pub mod health;
pub mod reports;
pub mod runs;
pub mod settings;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Per-user settings
        .route(
            "/api/v1/users/:user_id/settings",
            get(settings::handle_get_settings).put(settings::handle_put_settings),
        )
        // Runs
        .route(
            "/api/v1/users/:user_id/runs",
            get(runs::handle_list_runs).post(runs::handle_start_run),
        )
        .route("/api/v1/runs/:run_id", get(runs::handle_get_run))
        .route("/api/v1/runs/:run_id/stop", post(runs::handle_stop_run))
        // Ledger reports
        .route("/api/v1/users/:user_id/stats", get(reports::handle_stats))
        .route(
            "/api/v1/users/:user_id/applications",
            get(reports::handle_recent_applications),
        )
        .route(
            "/api/v1/users/:user_id/applications/:application_id/emails",
            post(reports::handle_record_follow_up),
        )
        .route(
            "/api/v1/users/:user_id/postings",
            get(reports::handle_posting_history),
        )
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::test_pool;
    use crate::pipeline::{RunManager, ServiceRunFactory};
    use crate::state::AppState;

    pub async fn test_state(data_dir: &Path) -> AppState {
        let config = Config {
            data_dir: data_dir.to_path_buf(),
            ..Config::default()
        };
        let db = test_pool().await;
        let runs = RunManager::new(
            db.clone(),
            Arc::new(ServiceRunFactory::new(config.clone())),
            config.stale_run_after,
        );
        AppState { db, config, runs }
    }

    pub async fn send(
        router: Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
