use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRef, Path, State},
    http::{StatusCode, Uri},
    routing::{get, post},
};
use companies_core::CompanyRecord;
use companies_records::RecordService;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::{Authenticated, TokenAuthority},
    error::ApiError,
};

#[derive(Clone)]
pub struct AppState {
    pub records: Arc<RecordService>,
    pub auth: Arc<TokenAuthority>,
}

impl FromRef<AppState> for Arc<TokenAuthority> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.auth)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompanyResponse {
    pub company_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/token", post(issue_token))
        .route("/api/v1/companies", post(create_company))
        .route(
            "/api/v1/companies/{id}",
            get(get_company)
                .patch(update_company)
                .delete(delete_company),
        )
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn issue_token(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TokenResponse>, ApiError> {
    let login: LoginRequest = serde_json::from_slice(&body)
        .map_err(|err| ApiError::BadRequest(format!("invalid login request: {err}")))?;

    if !state.auth.check_credentials(&login.username, &login.password) {
        warn!("login refused for {:?}", login.username);
        return Err(ApiError::Unauthorized("unknown credentials".to_string()));
    }

    let token = state
        .auth
        .issue(&login.username)
        .map_err(|err| ApiError::Internal(format!("could not sign token: {err}")))?;

    Ok(Json(TokenResponse { token }))
}

async fn create_company(
    State(state): State<AppState>,
    _auth: Authenticated,
    uri: Uri,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateCompanyResponse>), ApiError> {
    let company_id = state.records.create(uri.path(), &body).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateCompanyResponse { company_id }),
    ))
}

async fn update_company(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(id): Path<String>,
    uri: Uri,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state.records.update(uri.path(), &id, &body).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn delete_company(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(id): Path<String>,
    uri: Uri,
) -> Result<StatusCode, ApiError> {
    state.records.delete(uri.path(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CompanyRecord>, ApiError> {
    let record = state.records.get(&id).await?;
    Ok(Json(record))
}
