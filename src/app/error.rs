//! HTTP error responses for the demo application

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

/// One entry of a 422 `detail` list.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationDetail {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub loc: Vec<&'static str>,
    pub msg: String,
    pub input: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 404
    NotFound,
    /// 422
    Validation(ValidationDetail),
}

impl ApiError {
    pub fn invalid_integer(location: &'static str, field: &'static str, input: &str) -> Self {
        Self::Validation(ValidationDetail {
            kind: "int_parsing",
            loc: vec![location, field],
            msg: "Input should be a valid integer, unable to parse string as an integer"
                .to_string(),
            input: input.to_string(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not Found" }))).into_response()
            }
            ApiError::Validation(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": [detail] })),
            )
                .into_response(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound => write!(f, "Not found"),
            ApiError::Validation(d) => write!(f, "Validation error at {:?}: {}", d.loc, d.msg),
        }
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = Result<T, ApiError>;
