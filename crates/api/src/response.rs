//! Shared JSON response helper for API handlers.
//!
//! Handlers serialize through [`json`] rather than `axum::Json` so that an
//! encoding failure surfaces as [`AppError::Encoding`] with the standard
//! `{ "error", "code" }` body instead of a bare 500.

use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Serialize `value` into an `application/json` response.
pub fn json<T: Serialize>(value: &T) -> AppResult<Response> {
    let body = serde_json::to_vec(value).map_err(AppError::Encoding)?;
    Ok(([(CONTENT_TYPE, "application/json")], body).into_response())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::http::StatusCode;
    use serde::ser::Error as _;
    use serde::Serializer;

    use super::*;

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("sensor value cannot be encoded"))
        }
    }

    #[derive(Serialize)]
    struct Snapshot {
        watts: f64,
    }

    #[test]
    fn serializable_value_becomes_json_response() {
        let response = json(&Snapshot { watts: 12.5 }).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn encoding_failure_maps_to_500_encoding_error() {
        let err = json(&Unencodable).unwrap_err();
        assert_matches!(err, AppError::Encoding(_));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
