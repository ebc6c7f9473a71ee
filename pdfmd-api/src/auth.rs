use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::AppState;

const API_KEY_HEADER: &str = "X-API-Key";

pub async fn api_key_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if state.valid_api_keys.iter().any(|k| k == provided) {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::Unauthorized)
    }
}
