use axum::{
    extract::{Path, State},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use gojob_core::{prepare::SeekerPreferencesRecord, ExperienceLevel};
use gojob_storage::{PreferencesUpdate, SeekerError};

use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Full replacement of a seeker's matching preferences.
#[derive(Debug, Deserialize)]
pub struct PreferencesRequest {
    #[serde(default)]
    pub experience_level_id: Option<i64>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
    #[serde(default)]
    pub field_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub seeker_id: i64,
    pub experience_level_id: Option<i64>,
    pub category_ids: Vec<i64>,
    pub field_ids: Vec<i64>,
}

impl PreferencesResponse {
    fn from_record(seeker_id: i64, record: SeekerPreferencesRecord) -> Self {
        Self {
            seeker_id,
            experience_level_id: record.experience_level_id,
            category_ids: record.preferred_category_ids,
            field_ids: record.preferred_field_ids,
        }
    }
}

/// `GET /seekers/:seeker_id/preferences`
pub async fn fetch(
    State(state): State<AppState>,
    Path(seeker_id): Path<i64>,
) -> Result<Json<PreferencesResponse>, ProblemResponse> {
    let record = state
        .storage()
        .seekers()
        .fetch_preferences(seeker_id)
        .await
        .map_err(|err| seeker_problem(err, seeker_id))?;
    Ok(Json(PreferencesResponse::from_record(seeker_id, record)))
}

/// `PUT /seekers/:seeker_id/preferences`
pub async fn replace(
    State(state): State<AppState>,
    Path(seeker_id): Path<i64>,
    Json(request): Json<PreferencesRequest>,
) -> Result<Json<PreferencesResponse>, ProblemResponse> {
    if let Some(level_id) = request.experience_level_id {
        ExperienceLevel::try_from(level_id).map_err(|err| {
            counter!("preferences_updates_total", "result" => "invalid").increment(1);
            ProblemResponse::unprocessable("invalid_experience_level", err.to_string())
        })?;
    }

    let repo = state.storage().seekers();
    let update = PreferencesUpdate {
        experience_level_id: request.experience_level_id,
        category_ids: &request.category_ids,
        field_ids: &request.field_ids,
        updated_at: state.now(),
    };
    if let Err(err) = repo.replace_preferences(seeker_id, &update).await {
        counter!("preferences_updates_total", "result" => "rejected").increment(1);
        return Err(seeker_problem(err, seeker_id));
    }

    counter!("preferences_updates_total", "result" => "ok").increment(1);
    info!(
        stage = "preferences",
        seeker_id,
        categories = request.category_ids.len(),
        fields = request.field_ids.len(),
        "seeker preferences replaced"
    );

    let record = repo
        .fetch_preferences(seeker_id)
        .await
        .map_err(|err| seeker_problem(err, seeker_id))?;
    Ok(Json(PreferencesResponse::from_record(seeker_id, record)))
}

fn seeker_problem(err: SeekerError, seeker_id: i64) -> ProblemResponse {
    match err {
        SeekerError::NotFound => ProblemResponse::not_found(
            "seeker_not_found",
            format!("seeker {seeker_id} does not exist"),
        ),
        SeekerError::UnknownCategory(_) => {
            ProblemResponse::unprocessable("unknown_category", err.to_string())
        }
        SeekerError::UnknownField(_) => {
            ProblemResponse::unprocessable("unknown_field", err.to_string())
        }
        SeekerError::Database(_) => {
            error!(stage = "preferences", seeker_id, error = %err, "seeker preference storage failed");
            ProblemResponse::internal("preferences_failed", "failed to access seeker preferences")
        }
    }
}
