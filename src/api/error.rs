use std::fmt;

/// Closed taxonomy for failures at the AI-service boundary. Every raw
/// error shape (transport, HTTP status, schema parse) is folded into one of
/// these kinds exactly once, inside this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    RateLimited,
    NetworkUnavailable,
    Malformed,
    Unknown,
}

#[derive(Debug)]
pub struct ApiFailure {
    pub kind: ApiErrorKind,
    pub detail: String,
}

impl ApiFailure {
    pub fn from_reqwest(error: reqwest::Error, request_url: &str) -> Self {
        let kind = if error.is_connect() || error.is_timeout() || error.is_request() {
            ApiErrorKind::NetworkUnavailable
        } else if error.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            ApiErrorKind::RateLimited
        } else if error.is_decode() {
            ApiErrorKind::Malformed
        } else {
            ApiErrorKind::Unknown
        };
        Self {
            kind,
            detail: format!("request to '{request_url}' failed: {error}"),
        }
    }

    /// Folds a non-success HTTP status and its response body into a failure.
    /// The body is the service's error document when one was returned.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let service_message = extract_service_error(body);
        let rate_limited = status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || service_message
                .as_deref()
                .is_some_and(|m| m.contains("RESOURCE_EXHAUSTED"))
            || body.contains("RESOURCE_EXHAUSTED");
        let kind = if rate_limited {
            ApiErrorKind::RateLimited
        } else {
            ApiErrorKind::Unknown
        };
        let detail = match service_message {
            Some(message) => format!("HTTP {status}: {message}"),
            None => format!("HTTP {status}"),
        };
        Self { kind, detail }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Malformed,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.detail)
    }
}

impl std::error::Error for ApiFailure {}

// The service reports errors as {"error": {"message": ..., "status": ...}}.
fn extract_service_error(body: &str) -> Option<String> {
    let document: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let error = document.get("error")?;
    let message = error.get("message").and_then(|m| m.as_str());
    let status = error.get("status").and_then(|s| s.as_str());
    match (message, status) {
        (Some(message), Some(status)) => Some(format!("{status}: {message}")),
        (Some(message), None) => Some(message.to_string()),
        (None, Some(status)) => Some(status.to_string()),
        (None, None) => None,
    }
}

/// Which user action a failure interrupted. Selects the prefix of the
/// user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorContext {
    Chat,
    Worksheet,
    Initialization,
    Validation,
}

impl ErrorContext {
    pub fn prefix(&self) -> &'static str {
        match self {
            ErrorContext::Chat => "Sorry, I encountered an error:",
            ErrorContext::Worksheet => "Failed to generate worksheet:",
            ErrorContext::Initialization => "Failed to initialize chat:",
            ErrorContext::Validation => "API connection failed:",
        }
    }
}

pub const GENERIC_ERROR_TEXT: &str = "An unknown error occurred. Please try again later.";

pub fn classify(error: &anyhow::Error) -> ApiErrorKind {
    match error.downcast_ref::<ApiFailure>() {
        Some(failure) => failure.kind,
        None => ApiErrorKind::Unknown,
    }
}

/// The one place raw failures become user-visible text. No retry is attached
/// to any of these: the user resends, re-requests, or resets.
pub fn user_facing_message(context: ErrorContext, error: &anyhow::Error) -> String {
    let friendly = match classify(error) {
        ApiErrorKind::RateLimited => {
            "API rate limit exceeded. Please wait a moment before trying again.".to_string()
        }
        ApiErrorKind::NetworkUnavailable => {
            "A network request failed. Check your internet connection and any \
             proxy settings, then try again."
                .to_string()
        }
        ApiErrorKind::Malformed => {
            "The service returned a response that could not be understood.".to_string()
        }
        ApiErrorKind::Unknown => {
            let detail = error.to_string();
            if detail.trim().is_empty() {
                GENERIC_ERROR_TEXT.to_string()
            } else {
                detail
            }
        }
    };
    format!("{} {friendly}", context.prefix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_429_maps_to_rate_limited() {
        let failure = ApiFailure::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(failure.kind, ApiErrorKind::RateLimited);
    }

    #[test]
    fn test_resource_exhausted_body_maps_to_rate_limited() {
        let body = r#"{"error":{"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let failure = ApiFailure::from_status(reqwest::StatusCode::FORBIDDEN, body);
        assert_eq!(failure.kind, ApiErrorKind::RateLimited);
        assert!(failure.detail.contains("Quota exceeded"));
    }

    #[test]
    fn test_service_error_message_is_surfaced() {
        let body = r#"{"error":{"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let failure = ApiFailure::from_status(reqwest::StatusCode::BAD_REQUEST, body);
        assert_eq!(failure.kind, ApiErrorKind::Unknown);
        assert!(failure.detail.contains("API key not valid"));
    }

    #[test]
    fn test_user_message_prefixes_by_context() {
        let error = anyhow::Error::new(ApiFailure::malformed("truncated JSON"));
        let message = user_facing_message(ErrorContext::Worksheet, &error);
        assert!(message.starts_with("Failed to generate worksheet:"));

        let error = anyhow::Error::new(ApiFailure {
            kind: ApiErrorKind::RateLimited,
            detail: "HTTP 429".to_string(),
        });
        let message = user_facing_message(ErrorContext::Chat, &error);
        assert!(message.starts_with("Sorry, I encountered an error:"));
        assert!(message.contains("rate limit"));
    }

    #[test]
    fn test_unclassified_error_falls_back_to_its_own_text() {
        let error = anyhow::anyhow!("something odd happened");
        let message = user_facing_message(ErrorContext::Validation, &error);
        assert_eq!(
            message,
            "API connection failed: something odd happened"
        );
    }
}
