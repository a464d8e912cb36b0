use std::{
    fmt::Write as _,
    sync::{Mutex, OnceLock},
    time::Instant,
};

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{
    BuildError as PrometheusBuildError, PrometheusBuilder, PrometheusHandle,
};
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self as tracing_fmt, time::UtcTime},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use gojob_util::{AppConfig, Environment};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] TryInitError),
    #[error("failed to initialize prometheus recorder: {0}")]
    Metrics(#[from] PrometheusBuildError),
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_INSTALL_GUARD: Mutex<()> = Mutex::new(());
static START_TIME: OnceLock<Instant> = OnceLock::new();

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

fn build_git_sha() -> &'static str {
    option_env!("GIT_SHA").unwrap_or("unknown")
}

/// Installs the global tracing subscriber.
///
/// Production emits JSON lines; every other environment uses the pretty
/// formatter. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryError> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let base = tracing_fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_timer(UtcTime::rfc_3339());

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.environment {
        Environment::Production => registry.with(base.json()).try_init()?,
        Environment::Development | Environment::Test => registry.with(base.pretty()).try_init()?,
    }

    TRACING_INIT.set(()).ok();
    tracing::info!(
        stage = "telemetry",
        env = %config.environment.as_str(),
        version = BUILD_VERSION,
        git_sha = build_git_sha(),
        "tracing initialized"
    );
    Ok(())
}

/// Installs the Prometheus recorder once and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let _guard = METRICS_INSTALL_GUARD
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    METRICS_HANDLE.set(handle.clone()).ok();
    describe_metrics();
    START_TIME.get_or_init(Instant::now);

    Ok(handle)
}

fn describe_metrics() {
    describe_gauge!("app_build_info", "Build metadata for the running binary");
    describe_gauge!("app_uptime_seconds", "Seconds since the process started");
    describe_counter!(
        "recommendation_requests_total",
        "Count of recommendation list requests, labelled by view and result"
    );
    describe_counter!(
        "recommendation_candidates_total",
        "Count of open jobs scored for recommendation lists, labelled by view"
    );
    describe_histogram!(
        "recommendation_scoring_seconds",
        "Time in seconds spent preparing and scoring candidates, labelled by view"
    );
    describe_counter!(
        "match_requests_total",
        "Count of single job match requests, labelled by result"
    );
    describe_counter!(
        "preferences_updates_total",
        "Count of seeker preference replacements, labelled by result"
    );
    describe_counter!(
        "jobs_created_total",
        "Count of job creation requests, labelled by result"
    );
}

/// Renders the recorder output followed by build and uptime gauges.
pub fn render_metrics(handle: &PrometheusHandle) -> String {
    let mut body = handle.render();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs_f64())
        .unwrap_or_default();

    // Writing into a String cannot fail.
    let _ = writeln!(body, "# TYPE app_build_info gauge");
    let _ = writeln!(
        body,
        "app_build_info{{version=\"{}\",git=\"{}\"}} 1",
        BUILD_VERSION,
        build_git_sha()
    );
    let _ = writeln!(body, "# TYPE app_uptime_seconds gauge");
    let _ = writeln!(body, "app_uptime_seconds {uptime}");

    body
}
