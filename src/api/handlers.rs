use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::data_models::{ExtractResponse, SearchQuery, SearchResponse};
use crate::error::ServiceError;

use super::AppState;
use super::models::{ErrorBody, ExtractRequestBody, HealthResponse};

pub const SERVICE_NAME: &str = "searchbridge";

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

fn bad_json(rejection: JsonRejection) -> ServiceError {
    ServiceError::InvalidRequest(rejection.body_text())
}

pub async fn search_handler(
    State(state): State<AppState>,
    payload: Result<Json<SearchQuery>, JsonRejection>,
) -> Result<Json<SearchResponse>, ServiceError> {
    let Json(query) = payload.map_err(bad_json)?;
    let response = state.search.search(&query).await?;
    Ok(Json(response))
}

pub async fn extract_handler(
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequestBody>, JsonRejection>,
) -> Result<Json<ExtractResponse>, ServiceError> {
    let Json(body) = payload.map_err(bad_json)?;
    let response = state.extract.extract(&body.into()).await?;
    Ok(Json(response))
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

pub async fn robots_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "User-agent: *\nDisallow: /",
    )
}
