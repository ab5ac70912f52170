//! Turning raw responses into JSON values or [`ApiError`]s.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{errors::ApiError, transport::HttpResponse};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Read a 2xx response.
///
/// JSON bodies are parsed. Responses without a JSON content type, and JSON
/// responses with an empty body, yield an empty object.
///
/// # Errors
///
/// Returns an error carrying the response status if a declared JSON body
/// fails to parse.
pub fn read_success(response: &HttpResponse) -> Result<Value, ApiError> {
    if !response.is_json() || response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    serde_json::from_slice(&response.body).map_err(|error| {
        ApiError::new(
            response.status,
            format!("invalid JSON in response body: {error}"),
        )
    })
}

/// Build the error for a non-success response.
///
/// Uses the body's `message` field when the body is JSON carrying one,
/// otherwise the status text.
#[must_use]
pub fn read_failure(response: &HttpResponse) -> ApiError {
    let message = serde_json::from_slice::<ErrorBody>(&response.body)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| response.status_text.clone());

    ApiError::new(response.status, message)
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn response(status: u16, status_text: &str, content_type: &str, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            status_text: status_text.to_string(),
            content_type: Some(content_type.to_string()),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn json_success_is_parsed() -> TestResult {
        let value = read_success(&response(200, "OK", "application/json", r#"[{"id":1}]"#))?;

        assert_eq!(value, serde_json::json!([{ "id": 1 }]));

        Ok(())
    }

    #[test]
    fn non_json_success_is_empty_object() -> TestResult {
        let value = read_success(&response(200, "OK", "text/plain", ""))?;

        assert_eq!(value, serde_json::json!({}));

        Ok(())
    }

    #[test]
    fn empty_json_body_is_empty_object() -> TestResult {
        let value = read_success(&response(204, "No Content", "application/json", ""))?;

        assert_eq!(value, serde_json::json!({}));

        Ok(())
    }

    #[test]
    fn malformed_json_success_keeps_status() {
        let result = read_success(&response(200, "OK", "application/json", "{not json"));

        assert!(
            matches!(&result, Err(error) if error.status == 200),
            "expected status 200 error, got {result:?}"
        );
    }

    #[test]
    fn failure_uses_message_field() {
        let error = read_failure(&response(
            400,
            "Bad Request",
            "application/json",
            r#"{"message":"amount is required"}"#,
        ));

        assert_eq!(error, ApiError::new(400, "amount is required"));
    }

    #[test]
    fn failure_falls_back_to_status_text() {
        let error = read_failure(&response(
            502,
            "Bad Gateway",
            "text/html",
            "<html>upstream down</html>",
        ));

        assert_eq!(error, ApiError::new(502, "Bad Gateway"));
    }

    #[test]
    fn failure_without_message_field_uses_status_text() {
        let error = read_failure(&response(
            404,
            "Not Found",
            "application/json",
            r#"{"detail":"nope"}"#,
        ));

        assert_eq!(error, ApiError::new(404, "Not Found"));
    }
}
