//! Tenant extraction from the `X-Hospital-Id` header

use super::error::ApiError;
use crate::models::HospitalId;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub const HOSPITAL_HEADER: &str = "x-hospital-id";

/// The calling hospital. Handlers that take this can only be reached with a
/// valid header; everything else is rejected with 401.
#[derive(Debug, Clone)]
pub struct Tenant(pub HospitalId);

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(HOSPITAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(HospitalId::new)
            .map(Tenant)
            .ok_or_else(|| ApiError::unauthorized("Missing or invalid X-Hospital-Id header"))
    }
}
