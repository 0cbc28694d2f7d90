//! Route handlers

use super::error::{ApiError, ApiResult};
use super::tenant::Tenant;
use super::AppState;
use crate::ai::{RecommendationRequest, RecommendationSet, Recommender};
use crate::models::{Patient, PatientAssessmentInput, PatientDraft, RiskAssessmentResult};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub async fn health() -> &'static str {
    "ok"
}

/// Assessment input, optionally naming a stored patient to update
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    #[serde(flatten)]
    pub input: PatientAssessmentInput,
    #[serde(default)]
    pub patient_id: Option<String>,
}

pub async fn predict(
    State(state): State<AppState>,
    Tenant(hospital): Tenant,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> ApiResult<Json<RiskAssessmentResult>> {
    let Json(request) = payload?;
    let now = Utc::now();
    let result = state.scorer.score(&request.input, now);

    if let Some(raw_id) = request.patient_id.as_deref().filter(|s| !s.trim().is_empty()) {
        match Uuid::parse_str(raw_id.trim()) {
            Ok(id) => {
                // redb commits block, keep them off the async workers
                let store = Arc::clone(&state.store);
                let tenant = hospital.clone();
                let assessment = result.clone();
                let recorded = tokio::task::spawn_blocking(move || {
                    store.tenant(tenant).record_assessment(id, &assessment, now)
                })
                .await
                .map_err(ApiError::internal)??;

                match recorded {
                    Some(_) => info!(
                        "Recorded {} risk ({}) on patient {}",
                        result.risk_level, result.readmission_risk, id
                    ),
                    None => warn!(
                        "Patient {} not found for hospital {}, assessment not recorded",
                        id, hospital
                    ),
                }
            }
            Err(_) => warn!("Ignoring malformed patientId '{}'", raw_id),
        }
    }

    Ok(Json(result))
}

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request("Invalid patient ID"))
}

pub async fn list_patients(
    State(state): State<AppState>,
    Tenant(hospital): Tenant,
) -> ApiResult<Json<Vec<Patient>>> {
    Ok(Json(state.store.tenant(hospital).list()?))
}

pub async fn get_patient(
    State(state): State<AppState>,
    Tenant(hospital): Tenant,
    Path(id): Path<String>,
) -> ApiResult<Json<Patient>> {
    let id = parse_id(&id)?;
    state
        .store
        .tenant(hospital)
        .get(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Patient not found"))
}

pub async fn create_patient(
    State(state): State<AppState>,
    Tenant(hospital): Tenant,
    payload: Result<Json<PatientDraft>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    let Json(draft) = payload?;
    let patient = state.store.tenant(hospital).create(draft, Utc::now())?;
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn update_patient(
    State(state): State<AppState>,
    Tenant(hospital): Tenant,
    Path(id): Path<String>,
    payload: Result<Json<PatientDraft>, JsonRejection>,
) -> ApiResult<Json<Patient>> {
    let id = parse_id(&id)?;
    let Json(draft) = payload?;
    state
        .store
        .tenant(hospital)
        .update(id, draft, Utc::now())?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Patient not found"))
}

pub async fn delete_patient(
    State(state): State<AppState>,
    Tenant(hospital): Tenant,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    if state.store.tenant(hospital).delete(id)? {
        Ok(Json(json!({ "message": "Patient deleted" })))
    } else {
        Err(ApiError::not_found("Patient not found"))
    }
}

/// Always answers 200; generation problems fall back to the fixed table
pub async fn recommend(
    State(state): State<AppState>,
    Tenant(_hospital): Tenant,
    payload: Result<Json<RecommendationRequest>, JsonRejection>,
) -> ApiResult<Json<RecommendationSet>> {
    let Json(request) = payload?;
    let now = Utc::now();
    let tier = request.tier();

    // The LLM client is blocking
    let recommender = state.recommender.clone();
    let set = tokio::task::spawn_blocking(move || recommender.recommend(&request, now))
        .await
        .unwrap_or_else(|e| {
            warn!("Recommendation task failed ({}), using fallback", e);
            Recommender::fallback(tier, now)
        });

    Ok(Json(set))
}
