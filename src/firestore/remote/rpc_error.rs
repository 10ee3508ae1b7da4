use reqwest::StatusCode;
use serde::Deserialize;

use crate::firestore::error::{
    already_exists, deadline_exceeded, failed_precondition, internal_error, invalid_argument,
    not_found, permission_denied, resource_exhausted, unauthenticated, unavailable,
    FirestoreError,
};

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: Option<GoogleError>,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Maps a failed REST response to a store error.
///
/// The `status` of a Google error payload wins over the HTTP status and is kept
/// on the error so transport failures can report it verbatim.
pub fn map_http_error(status: StatusCode, body: &str) -> FirestoreError {
    let payload = extract_error_payload(body);
    let message = payload
        .as_ref()
        .and_then(|payload| payload.message.clone())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("HTTP error").to_string());

    if let Some(status_name) = payload.and_then(|payload| payload.status) {
        return map_status_code(&status_name, &message).with_status(status_name);
    }

    match status {
        StatusCode::BAD_REQUEST => invalid_argument(message),
        StatusCode::UNAUTHORIZED => unauthenticated(message),
        StatusCode::FORBIDDEN => permission_denied(message),
        StatusCode::NOT_FOUND => not_found(message),
        StatusCode::CONFLICT => already_exists(message),
        StatusCode::PRECONDITION_FAILED => failed_precondition(message),
        StatusCode::TOO_MANY_REQUESTS => resource_exhausted(message),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => unavailable(message),
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => deadline_exceeded(message),
        status if status.is_client_error() => invalid_argument(message),
        _ => internal_error(message),
    }
}

fn map_status_code(status: &str, message: &str) -> FirestoreError {
    match status {
        "INVALID_ARGUMENT" | "OUT_OF_RANGE" => invalid_argument(message),
        "FAILED_PRECONDITION" | "ABORTED" => failed_precondition(message),
        "UNAUTHENTICATED" => unauthenticated(message),
        "PERMISSION_DENIED" => permission_denied(message),
        "NOT_FOUND" => not_found(message),
        "ALREADY_EXISTS" => already_exists(message),
        "RESOURCE_EXHAUSTED" => resource_exhausted(message),
        "UNAVAILABLE" => unavailable(message),
        "DEADLINE_EXCEEDED" => deadline_exceeded(message),
        _ => internal_error(message),
    }
}

fn extract_error_payload(body: &str) -> Option<GoogleError> {
    serde_json::from_str::<GoogleErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::error::FirestoreErrorCode;

    #[test]
    fn payload_status_wins() {
        let body = r#"{"error":{"code":409,"message":"Document already exists: users/ann","status":"ALREADY_EXISTS"}}"#;
        let err = map_http_error(StatusCode::CONFLICT, body);
        assert_eq!(err.code, FirestoreErrorCode::AlreadyExists);
        assert_eq!(err.message(), "Document already exists: users/ann");
        assert_eq!(err.status(), Some("ALREADY_EXISTS"));
    }

    #[test]
    fn falls_back_to_http_status() {
        let err = map_http_error(StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(err.code, FirestoreErrorCode::ResourceExhausted);
        assert_eq!(err.message(), "Too Many Requests");

        let err = map_http_error(StatusCode::INTERNAL_SERVER_ERROR, "not json");
        assert_eq!(err.code, FirestoreErrorCode::Internal);
    }

    #[test]
    fn unknown_status_is_internal_but_kept() {
        let body = r#"{"error":{"message":"lost","status":"DATA_LOSS"}}"#;
        let err = map_http_error(StatusCode::INTERNAL_SERVER_ERROR, body).into_transport_failure();
        assert_eq!(err.message(), "[DATA_LOSS] lost");
    }
}
