use axum::{extract::State, http::StatusCode, Json};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use gojob_core::ExperienceLevel;
use gojob_storage::{JobError, NewJob};

use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub company_name: String,
    #[serde(default)]
    pub experience_level_id: Option<i64>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: i64,
}

/// `POST /jobs`
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ProblemResponse> {
    let title = request.title.trim();
    let company_name = request.company_name.trim();
    if title.is_empty() || company_name.is_empty() {
        counter!("jobs_created_total", "result" => "invalid").increment(1);
        return Err(ProblemResponse::unprocessable(
            "invalid_job",
            "title and company_name must not be empty",
        ));
    }
    if let Some(level_id) = request.experience_level_id {
        ExperienceLevel::try_from(level_id).map_err(|err| {
            counter!("jobs_created_total", "result" => "invalid").increment(1);
            ProblemResponse::unprocessable("invalid_experience_level", err.to_string())
        })?;
    }

    let job = NewJob {
        title,
        company_name,
        experience_level_id: request.experience_level_id,
        category_ids: &request.category_ids,
        posted_at: state.now(),
    };
    let job_id = state
        .storage()
        .jobs()
        .insert_job(&job)
        .await
        .map_err(|err| {
            counter!("jobs_created_total", "result" => "rejected").increment(1);
            match err {
                JobError::UnknownCategory(_) => {
                    ProblemResponse::unprocessable("unknown_category", err.to_string())
                }
                other => {
                    error!(stage = "jobs", error = %other, "failed to insert job");
                    ProblemResponse::internal("job_create_failed", "failed to store job")
                }
            }
        })?;

    counter!("jobs_created_total", "result" => "ok").increment(1);
    info!(stage = "jobs", job_id, categories = request.category_ids.len(), "job posted");
    Ok((StatusCode::CREATED, Json(CreateJobResponse { job_id })))
}
