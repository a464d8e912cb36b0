use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use gojob_core::{
    prepare::{prepare_job, prepare_seeker},
    recommend, MatchBreakdown, MatchScore, RecommendationView,
};
use gojob_storage::{Database, JobError, JobListing, SeekerError, TaxonomyError};

use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Ranked jobs for one seeker and one view.
#[derive(Debug, Serialize)]
pub struct RecommendationList {
    pub seeker_id: i64,
    pub view: RecommendationView,
    pub min_match: MatchScore,
    pub candidates: usize,
    pub jobs: Vec<RecommendedJob>,
}

#[derive(Debug, Serialize)]
pub struct RecommendedJob {
    pub job_id: i64,
    pub title: String,
    pub company_name: String,
    pub posted_at: DateTime<Utc>,
    pub match_percentage: MatchScore,
    pub breakdown: MatchBreakdown,
}

/// Match between one seeker and one job, regardless of thresholds.
#[derive(Debug, Serialize)]
pub struct JobMatch {
    pub seeker_id: i64,
    pub job_id: i64,
    pub match_percentage: MatchScore,
    pub breakdown: MatchBreakdown,
}

/// Loads the seeker and all open jobs, then scores and ranks them for `view`.
///
/// `limit` truncates after ranking so the best matches are kept.
pub async fn build_recommendations(
    database: &Database,
    seeker_id: i64,
    view: RecommendationView,
    limit: Option<usize>,
) -> Result<RecommendationList, RecommendationError> {
    let preferences = database.seekers().fetch_preferences(seeker_id).await?;
    let lookup = database.taxonomy().category_field_lookup().await?;
    let listings = database.jobs().list_open_jobs(None).await?;

    let started = Instant::now();
    let seeker = prepare_seeker(&preferences, &lookup);
    let candidates = listings.len();
    let ranked = recommend(
        &seeker,
        listings.into_iter().map(|listing| {
            let job = prepare_job(&listing.record, &lookup);
            (listing, job)
        }),
        view,
    );
    histogram!("recommendation_scoring_seconds", "view" => view.as_str())
        .record(started.elapsed().as_secs_f64());
    counter!("recommendation_candidates_total", "view" => view.as_str())
        .increment(candidates as u64);

    let jobs: Vec<_> = ranked
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|recommendation| to_recommended_job(recommendation.item, recommendation.breakdown))
        .collect();

    debug!(
        stage = "recommend",
        seeker_id,
        view = view.as_str(),
        candidates,
        returned = jobs.len(),
        "recommendations built"
    );

    Ok(RecommendationList {
        seeker_id,
        view,
        min_match: view.min_match(),
        candidates,
        jobs,
    })
}

/// Scores a single job for a seeker.
pub async fn build_job_match(
    database: &Database,
    seeker_id: i64,
    job_id: i64,
) -> Result<JobMatch, RecommendationError> {
    let preferences = database.seekers().fetch_preferences(seeker_id).await?;
    let listing = database.jobs().fetch_job(job_id).await?;
    let lookup = database.taxonomy().category_field_lookup().await?;

    let seeker = prepare_seeker(&preferences, &lookup);
    let job = prepare_job(&listing.record, &lookup);
    let breakdown = gojob_core::evaluate(&seeker, &job);

    Ok(JobMatch {
        seeker_id,
        job_id,
        match_percentage: breakdown.percentage,
        breakdown,
    })
}

fn to_recommended_job(listing: JobListing, breakdown: MatchBreakdown) -> RecommendedJob {
    RecommendedJob {
        job_id: listing.id,
        title: listing.title,
        company_name: listing.company_name,
        posted_at: listing.posted_at,
        match_percentage: breakdown.percentage,
        breakdown,
    }
}

#[derive(Debug, Error)]
pub enum RecommendationError {
    #[error("failed to load seeker preferences: {0}")]
    Seeker(#[from] SeekerError),
    #[error("failed to load category taxonomy: {0}")]
    Taxonomy(#[from] TaxonomyError),
    #[error("failed to load jobs: {0}")]
    Job(#[from] JobError),
}

impl RecommendationError {
    fn metric_label(&self) -> &'static str {
        match self {
            Self::Seeker(SeekerError::NotFound) | Self::Job(JobError::NotFound) => "not_found",
            _ => "error",
        }
    }

    fn into_problem(self, seeker_id: i64) -> ProblemResponse {
        match self {
            Self::Seeker(SeekerError::NotFound) => ProblemResponse::not_found(
                "seeker_not_found",
                format!("seeker {seeker_id} does not exist"),
            ),
            Self::Job(JobError::NotFound) => {
                ProblemResponse::not_found("job_not_found", "job does not exist")
            }
            other => {
                error!(stage = "recommend", seeker_id, error = %other, "failed to build recommendations");
                ProblemResponse::internal("recommendation_failed", "failed to build recommendations")
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    limit: Option<usize>,
}

/// `GET /seekers/:seeker_id/recommended-jobs`
pub async fn recommended_jobs(
    State(state): State<AppState>,
    Path(seeker_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<RecommendationList>, ProblemResponse> {
    respond(
        build_recommendations(
            state.storage(),
            seeker_id,
            RecommendationView::RecommendedJobs,
            query.limit,
        )
        .await,
        seeker_id,
        RecommendationView::RecommendedJobs,
    )
}

/// `GET /seekers/:seeker_id/dashboard`
pub async fn dashboard(
    State(state): State<AppState>,
    Path(seeker_id): Path<i64>,
) -> Result<Json<RecommendationList>, ProblemResponse> {
    respond(
        build_recommendations(
            state.storage(),
            seeker_id,
            RecommendationView::DashboardSummary,
            Some(state.dashboard_limit()),
        )
        .await,
        seeker_id,
        RecommendationView::DashboardSummary,
    )
}

fn respond(
    result: Result<RecommendationList, RecommendationError>,
    seeker_id: i64,
    view: RecommendationView,
) -> Result<Json<RecommendationList>, ProblemResponse> {
    match result {
        Ok(list) => {
            counter!("recommendation_requests_total", "view" => view.as_str(), "result" => "ok")
                .increment(1);
            Ok(Json(list))
        }
        Err(err) => {
            counter!(
                "recommendation_requests_total",
                "view" => view.as_str(),
                "result" => err.metric_label()
            )
            .increment(1);
            Err(err.into_problem(seeker_id))
        }
    }
}

/// `GET /seekers/:seeker_id/jobs/:job_id/match`
pub async fn job_match(
    State(state): State<AppState>,
    Path((seeker_id, job_id)): Path<(i64, i64)>,
) -> Result<Json<JobMatch>, ProblemResponse> {
    match build_job_match(state.storage(), seeker_id, job_id).await {
        Ok(found) => {
            counter!("match_requests_total", "result" => "ok").increment(1);
            Ok(Json(found))
        }
        Err(err) => {
            counter!("match_requests_total", "result" => err.metric_label()).increment(1);
            Err(err.into_problem(seeker_id))
        }
    }
}
