use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use gojob_storage::Database;

use crate::{jobs, preferences, recommendations, telemetry};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    clock: Clock,
    dashboard_limit: usize,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database, dashboard_limit: u32) -> Self {
        Self {
            metrics,
            storage,
            clock: Arc::new(Utc::now),
            dashboard_limit: dashboard_limit as usize,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn dashboard_limit(&self) -> usize {
        self.dashboard_limit
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/jobs", post(jobs::create))
        .route(
            "/seekers/:seeker_id/preferences",
            get(preferences::fetch).put(preferences::replace),
        )
        .route(
            "/seekers/:seeker_id/recommended-jobs",
            get(recommendations::recommended_jobs),
        )
        .route("/seekers/:seeker_id/dashboard", get(recommendations::dashboard))
        .route(
            "/seekers/:seeker_id/jobs/:job_id/match",
            get(recommendations::job_match),
        )
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Request};
    use chrono::{Duration, TimeZone};
    use gojob_storage::{NewJob, NewSeeker, PreferencesUpdate};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicI64, Ordering};
    use tower::ServiceExt;

    struct Fixture {
        state: AppState,
        seeker: i64,
        backend_job: i64,
        mixed_job: i64,
        field_job: i64,
        unrelated_job: i64,
        remote_level_job: i64,
    }

    fn fixed_clock() -> Clock {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let tick = Arc::new(AtomicI64::new(0));
        Arc::new(move || base + Duration::minutes(tick.fetch_add(1, Ordering::SeqCst)))
    }

    async fn setup_state() -> AppState {
        let metrics = telemetry::init_metrics().expect("metrics init");
        let database = Database::connect("sqlite::memory:")
            .await
            .expect("connect");
        database.run_migrations().await.expect("migrations");
        AppState::new(metrics, database, 2).with_clock(fixed_clock())
    }

    /// Seeds the taxonomy:
    /// field IT {backend, frontend, devops}, field Design {illustration}, field Finance {audit}.
    async fn setup_fixture() -> Fixture {
        let state = setup_state().await;
        let db = state.storage().clone();
        let taxonomy = db.taxonomy();
        let it = taxonomy.insert_field("Information Technology").await.unwrap();
        let design = taxonomy.insert_field("Design").await.unwrap();
        let finance = taxonomy.insert_field("Finance").await.unwrap();
        let backend = taxonomy.insert_category(it, "Backend").await.unwrap();
        let frontend = taxonomy.insert_category(it, "Frontend").await.unwrap();
        let devops = taxonomy.insert_category(it, "DevOps").await.unwrap();
        let illustration = taxonomy.insert_category(design, "Illustration").await.unwrap();
        let audit = taxonomy.insert_category(finance, "Audit").await.unwrap();

        let seeker = db
            .seekers()
            .insert_seeker(&NewSeeker {
                display_name: "Grace",
                experience_level_id: None,
                created_at: state.now(),
            })
            .await
            .unwrap();
        db.seekers()
            .replace_preferences(
                seeker,
                &PreferencesUpdate {
                    experience_level_id: Some(1),
                    category_ids: &[backend],
                    field_ids: &[it],
                    updated_at: state.now(),
                },
            )
            .await
            .unwrap();

        let post = |title: &'static str, level: Option<i64>, categories: Vec<i64>, day: u32| {
            let db = db.clone();
            async move {
                db.jobs()
                    .insert_job(&NewJob {
                        title,
                        company_name: "Acme",
                        experience_level_id: level,
                        category_ids: &categories,
                        posted_at: Utc.with_ymd_and_hms(2024, 2, day, 9, 0, 0).unwrap(),
                    })
                    .await
                    .unwrap()
            }
        };

        // backend exact + Entry level: (100 * 0.6 + 100 * 0.1) / 0.7 = 100
        let backend_job = post("Backend Engineer", Some(1), vec![backend], 1).await;
        // 1 of 3 categories: 83
        let mixed_job = post("Full Stack", None, vec![backend, frontend, illustration], 2).await;
        // field fallback 1 of 1 field: 60
        let field_job = post("Platform", None, vec![devops], 3).await;
        let unrelated_job = post("Auditor", None, vec![audit], 4).await;
        // experience only, Entry vs Executive: 20
        let remote_level_job = post("Chief Officer", Some(5), vec![], 5).await;

        Fixture {
            state,
            seeker,
            backend_job,
            mixed_job,
            field_job,
            unrelated_job,
            remote_level_job,
        }
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .oneshot(builder.body(body).unwrap())
            .await
            .expect("handler should respond");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    fn job_ids(body: &Value) -> Vec<i64> {
        body["jobs"]
            .as_array()
            .expect("jobs array")
            .iter()
            .map(|job| job["job_id"].as_i64().expect("job id"))
            .collect()
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let collected = response
            .into_body()
            .collect()
            .await
            .expect("body should read");
        let body = String::from_utf8(collected.to_bytes().to_vec()).expect("utf-8");
        assert!(body.contains("app_build_info"));
        assert!(body.contains("app_uptime_seconds"));
    }

    #[tokio::test]
    async fn recommended_jobs_rank_and_filter_at_25() {
        let fixture = setup_fixture().await;
        let app = app_router(fixture.state.clone());

        let (status, body) = send(
            app,
            Method::GET,
            &format!("/seekers/{}/recommended-jobs", fixture.seeker),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"], "recommended_jobs");
        assert_eq!(body["min_match"], 25);
        assert_eq!(body["candidates"], 5);
        assert_eq!(
            job_ids(&body),
            vec![fixture.backend_job, fixture.mixed_job, fixture.field_job]
        );
        assert_eq!(body["jobs"][0]["match_percentage"], 100);
        assert_eq!(body["jobs"][1]["match_percentage"], 83);
        assert_eq!(body["jobs"][2]["match_percentage"], 60);
        assert_eq!(body["jobs"][2]["breakdown"]["category"], Value::Null);
        assert_eq!(body["jobs"][2]["breakdown"]["field"], 60.0);
    }

    #[tokio::test]
    async fn recommended_jobs_honours_limit() {
        let fixture = setup_fixture().await;
        let app = app_router(fixture.state.clone());

        let (status, body) = send(
            app,
            Method::GET,
            &format!("/seekers/{}/recommended-jobs?limit=1", fixture.seeker),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(job_ids(&body), vec![fixture.backend_job]);
    }

    #[tokio::test]
    async fn dashboard_uses_lower_threshold_and_configured_limit() {
        let fixture = setup_fixture().await;
        let seeker = fixture.seeker;

        // Drop the topical preferences so only the experience-only job is scored by level.
        let (status, _) = send(
            app_router(fixture.state.clone()),
            Method::PUT,
            &format!("/seekers/{seeker}/preferences"),
            Some(json!({ "experience_level_id": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, dashboard) = send(
            app_router(fixture.state.clone()),
            Method::GET,
            &format!("/seekers/{seeker}/dashboard"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["min_match"], 20);
        assert_eq!(
            job_ids(&dashboard),
            vec![fixture.backend_job, fixture.remote_level_job]
        );
        assert_eq!(dashboard["jobs"][1]["match_percentage"], 20);

        let (_, listing) = send(
            app_router(fixture.state.clone()),
            Method::GET,
            &format!("/seekers/{seeker}/recommended-jobs"),
            None,
        )
        .await;
        assert_eq!(job_ids(&listing), vec![fixture.backend_job]);
    }

    #[tokio::test]
    async fn dashboard_truncates_to_limit() {
        let fixture = setup_fixture().await;
        let (status, body) = send(
            app_router(fixture.state.clone()),
            Method::GET,
            &format!("/seekers/{}/dashboard", fixture.seeker),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(job_ids(&body), vec![fixture.backend_job, fixture.mixed_job]);
    }

    #[tokio::test]
    async fn unknown_seeker_is_not_found() {
        let fixture = setup_fixture().await;
        let (status, body) = send(
            app_router(fixture.state.clone()),
            Method::GET,
            "/seekers/9999/recommended-jobs",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["type"], "seeker_not_found");
    }

    #[tokio::test]
    async fn job_match_reports_breakdown_without_threshold() {
        let fixture = setup_fixture().await;

        let (status, body) = send(
            app_router(fixture.state.clone()),
            Method::GET,
            &format!(
                "/seekers/{}/jobs/{}/match",
                fixture.seeker, fixture.unrelated_job
            ),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["match_percentage"], 0);
        assert_eq!(body["breakdown"]["topical_floor_applied"], false);

        let (status, body) = send(
            app_router(fixture.state.clone()),
            Method::GET,
            &format!("/seekers/{}/jobs/424242/match", fixture.seeker),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["type"], "job_not_found");
    }

    #[tokio::test]
    async fn preferences_round_trip_and_validation() {
        let fixture = setup_fixture().await;
        let seeker = fixture.seeker;

        let (status, body) = send(
            app_router(fixture.state.clone()),
            Method::GET,
            &format!("/seekers/{seeker}/preferences"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["experience_level_id"], 1);
        assert_eq!(body["category_ids"].as_array().map(Vec::len), Some(1));

        let (status, body) = send(
            app_router(fixture.state.clone()),
            Method::PUT,
            &format!("/seekers/{seeker}/preferences"),
            Some(json!({ "experience_level_id": 9 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["type"], "invalid_experience_level");

        let (status, body) = send(
            app_router(fixture.state.clone()),
            Method::PUT,
            &format!("/seekers/{seeker}/preferences"),
            Some(json!({ "category_ids": [31337] })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["type"], "unknown_category");

        let (status, _) = send(
            app_router(fixture.state.clone()),
            Method::PUT,
            "/seekers/9999/preferences",
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn created_job_appears_first_among_ties() {
        let fixture = setup_fixture().await;
        let lookup = fixture
            .state
            .storage()
            .taxonomy()
            .category_field_lookup()
            .await
            .unwrap();
        let backend = fixture
            .state
            .storage()
            .jobs()
            .fetch_job(fixture.backend_job)
            .await
            .unwrap()
            .record
            .categories[0]
            .category_id;
        assert!(lookup.field_of(backend).is_some());

        let (status, created) = send(
            app_router(fixture.state.clone()),
            Method::POST,
            "/jobs",
            Some(json!({
                "title": "Senior Backend Engineer",
                "company_name": "Initech",
                "experience_level_id": 1,
                "category_ids": [backend],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let new_job = created["job_id"].as_i64().expect("job id");

        let (_, body) = send(
            app_router(fixture.state.clone()),
            Method::GET,
            &format!("/seekers/{}/recommended-jobs", fixture.seeker),
            None,
        )
        .await;
        // Both score 100; the newer posting keeps its upstream position.
        assert_eq!(job_ids(&body)[..2], [new_job, fixture.backend_job]);
    }

    #[tokio::test]
    async fn create_job_validates_input() {
        let fixture = setup_fixture().await;

        let (status, body) = send(
            app_router(fixture.state.clone()),
            Method::POST,
            "/jobs",
            Some(json!({ "title": "  ", "company_name": "Initech" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["type"], "invalid_job");

        let (status, body) = send(
            app_router(fixture.state.clone()),
            Method::POST,
            "/jobs",
            Some(json!({ "title": "Ghost", "company_name": "Initech", "category_ids": [31337] })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["type"], "unknown_category");
    }
}
