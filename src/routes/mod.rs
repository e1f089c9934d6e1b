//! HTTP route handlers

pub mod entity;
pub mod folder;
pub mod health;

pub use health::health_check;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::AppError;

/// JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(value)
        .unwrap_or_else(|_| r#"{"error":"serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Map an application error onto the HTTP surface
pub fn error_response(error: AppError) -> Response<Full<Bytes>> {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({
        "error": error.kind(),
        "message": error.to_string(),
    });
    json_response(status, &body)
}

/// Collect and parse a JSON request body
pub async fn read_json_body<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, AppError> {
    let body = req
        .collect()
        .await
        .map_err(|e| AppError::InvalidArgument(format!("failed to read request body: {e}")))?
        .to_bytes();
    serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidArgument(format!("invalid JSON body: {e}")))
}
