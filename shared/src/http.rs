//! Response helpers for the HTTP-facing Lambda.

use lambda_http::{Body, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Error;

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// JSON response with the given status code.
pub fn json_response<T: Serialize>(status: u16, data: &T) -> Result<Response<Body>, lambda_http::Error> {
    let response = Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(data)?))?;
    Ok(response)
}

pub fn error_response(status: u16, message: impl Into<String>) -> Result<Response<Body>, lambda_http::Error> {
    json_response(status, &ApiResponse::<()>::error(message))
}

/// Error response using the error's own status code.
pub fn from_error(error: &Error) -> Result<Response<Body>, lambda_http::Error> {
    error_response(error.status_code(), error.to_string())
}

/// Parse an optional JSON body. An empty body yields `T::default()`.
///
/// Returns `Ok(Err(Response))` with a 400 when the body is not valid JSON.
pub fn parse_json_body<T: DeserializeOwned + Default>(
    body: &Body,
) -> Result<Result<T, Response<Body>>, lambda_http::Error> {
    let bytes: &[u8] = body.as_ref();
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Ok(T::default()));
    }

    match serde_json::from_slice(bytes) {
        Ok(parsed) => Ok(Ok(parsed)),
        Err(e) => {
            let response = error_response(400, format!("Invalid request body: {}", e))?;
            Ok(Err(response))
        }
    }
}

/// Parse the request body, returning early with 400 on parse error.
///
/// ```ignore
/// let request: TriggerRequest = parse_body!(event.body());
/// ```
#[macro_export]
macro_rules! parse_body {
    ($body:expr) => {
        match shared::http::parse_json_body($body)? {
            Ok(parsed) => parsed,
            Err(response) => return Ok(response),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Payload {
        #[serde(default)]
        source: String,
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        let parsed: Payload = parse_json_body(&Body::Empty).unwrap().unwrap();
        assert_eq!(parsed, Payload::default());

        let parsed: Payload = parse_json_body(&Body::from(r#"{"source":"checkfront"}"#))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.source, "checkfront");

        let response = parse_json_body::<Payload>(&Body::from("{not json"))
            .unwrap()
            .unwrap_err();
        assert_eq!(response.status(), 400);
    }

    #[test]
    fn test_from_error_status() {
        let response = from_error(&Error::Validation("source too long".into())).unwrap();
        assert_eq!(response.status(), 400);

        let response = from_error(&Error::Aws("queue down".into())).unwrap();
        assert_eq!(response.status(), 500);
    }
}
