//! Shared HTTP utilities for the payment handler workspace.
//!
//! Implements the callable-function envelope spoken by the mobile SDK
//! (`{"data": ...}` in, `{"result": ...}` or `{"error": ...}` out) plus the
//! response helpers used by api-server and lambda-payments.

use domain::{CoreError, ErrorCode};

// ============================================================================
// Callable status codes
// ============================================================================

/// Status carried in a callable error body, with its HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableStatus {
    InvalidArgument,
    Unauthenticated,
    NotFound,
    Internal,
}

impl CallableStatus {
    /// Canonical protocol name, e.g. `INVALID_ARGUMENT`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallableStatus::InvalidArgument => "INVALID_ARGUMENT",
            CallableStatus::Unauthenticated => "UNAUTHENTICATED",
            CallableStatus::NotFound => "NOT_FOUND",
            CallableStatus::Internal => "INTERNAL",
        }
    }

    /// Client SDK error code, e.g. `invalid-argument`.
    pub fn code(&self) -> &'static str {
        match self {
            CallableStatus::InvalidArgument => "invalid-argument",
            CallableStatus::Unauthenticated => "unauthenticated",
            CallableStatus::NotFound => "not-found",
            CallableStatus::Internal => "internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            CallableStatus::InvalidArgument => 400,
            CallableStatus::Unauthenticated => 401,
            CallableStatus::NotFound => 404,
            CallableStatus::Internal => 500,
        }
    }
}

impl From<ErrorCode> for CallableStatus {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Unauthenticated => CallableStatus::Unauthenticated,
            ErrorCode::InvalidArgument => CallableStatus::InvalidArgument,
            ErrorCode::Internal => CallableStatus::Internal,
        }
    }
}

// ============================================================================
// JSON Envelope Helpers (framework-agnostic)
// ============================================================================

/// Wrap a handler output: `{"result": <value>}`.
pub fn callable_result(value: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "result": value })
}

/// Structured callable error.
///
/// Returns: `{"error": {"status": "<STATUS>", "code": "<code>", "message": "<message>"}}`
pub fn callable_error(status: CallableStatus, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "status": status.as_str(),
            "code": status.code(),
            "message": message,
        }
    })
}

/// Map a domain error to the status and client-facing message.
///
/// Provider detail stays server-side; clients get a fixed message.
pub fn error_parts(err: &CoreError) -> (CallableStatus, String) {
    let status = CallableStatus::from(err.code());
    let message = match err {
        CoreError::Unauthenticated => "The function must be called while authenticated.".into(),
        CoreError::InvalidArgument(msg) => msg.clone(),
        CoreError::Provider { step, .. } => match step {
            domain::ProviderStep::CheckoutSession => "Unable to create checkout session".into(),
            _ => "Unable to create payment intent".into(),
        },
    };
    (status, message)
}

/// Extract the `data` member of a callable request body.
///
/// The body must be a JSON object with a `data` field; `data` itself may be
/// any JSON value and is validated by the handler.
pub fn parse_callable_body(body: &[u8]) -> Result<serde_json::Value, CoreError> {
    if body.is_empty() {
        return Err(CoreError::invalid("request body is empty"));
    }
    let mut envelope: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| CoreError::invalid("request body is not JSON"))?;
    match envelope.get_mut("data") {
        Some(data) => Ok(data.take()),
        None => Err(CoreError::invalid("request body is missing data")),
    }
}

// ============================================================================
// Header Helpers
// ============================================================================

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Header carrying the caller uid when auth runs in debug mode.
pub const DEBUG_USER_HEADER: &str = "x-debug-user";

// ============================================================================
// Lambda HTTP Helpers (feature-gated)
// ============================================================================

#[cfg(feature = "lambda")]
pub mod lambda {
    //! Lambda-specific HTTP response builders using `lambda_http` types.

    use super::CallableStatus;
    use lambda_http::{Body, Response};

    /// Build an HTTP response with an optional JSON body.
    ///
    /// Falls back to a bare 500 if the builder rejects its input, which
    /// cannot happen for the fixed header names used here.
    pub fn resp(status: u16, body_json: Option<serde_json::Value>) -> Response<Body> {
        let rb = Response::builder().status(status);
        let built = match body_json {
            Some(val) => rb
                .header("content-type", "application/json")
                .body(Body::Text(val.to_string())),
            None => rb.body(Body::Empty),
        };
        built.unwrap_or_else(|_| {
            let mut fallback = Response::new(Body::Empty);
            *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }

    /// Success response: 200 with `{"result": ...}`.
    pub fn resp_result(value: serde_json::Value) -> Response<Body> {
        resp(200, Some(crate::callable_result(value)))
    }

    /// Error response with the callable error body and mapped status.
    pub fn resp_with_error(status: CallableStatus, message: &str) -> Response<Body> {
        resp(
            status.http_status(),
            Some(crate::callable_error(status, message)),
        )
    }

    /// Add CORS headers to a response.
    ///
    /// Uses `CORS_ALLOW_ORIGIN` env var, defaulting to `*`.
    pub fn with_cors(mut resp: Response<Body>) -> Response<Body> {
        use http::header::{HeaderName, HeaderValue};
        let headers = resp.headers_mut();
        let allow_origin =
            std::env::var("CORS_ALLOW_ORIGIN").unwrap_or_else(|_| "*".to_string());
        headers.insert(
            HeaderName::from_static("access-control-allow-origin"),
            HeaderValue::from_str(&allow_origin).unwrap_or(HeaderValue::from_static("*")),
        );
        headers.insert(
            HeaderName::from_static("access-control-allow-headers"),
            HeaderValue::from_static("authorization, content-type"),
        );
        headers.insert(
            HeaderName::from_static("access-control-allow-methods"),
            HeaderValue::from_static("OPTIONS, POST"),
        );
        resp
    }
}
