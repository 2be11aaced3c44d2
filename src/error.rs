use reqwest::StatusCode;
use thiserror::Error;

/// Message used when a response decodes but does not have the expected shape.
pub const UNEXPECTED_RESPONSE: &str = "Unexpected response from server";

/// Classified outcome of a failed backend call.
///
/// Every request made through [`crate::client::ApiClient`] resolves to either a
/// payload or one of these variants; nothing escapes as a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Missing or expired credential. Terminal for the current view.
    #[error("authentication required")]
    Unauthenticated,

    /// The backend answered with a non-2xx status other than 401, or with a
    /// payload of the wrong shape.
    #[error("request rejected ({status}){}", detail(.message))]
    RequestRejected {
        status: u16,
        message: Option<String>,
    },

    /// No response was received (connect failure, timeout, reset).
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// Rejected locally before any network call.
    #[error("{0}")]
    Invalid(String),

    /// A request was issued before the client was given a base address.
    #[error("client has no base address configured")]
    NotConfigured,
}

impl ApiError {
    pub fn rejected(status: StatusCode, message: Option<String>) -> Self {
        ApiError::RequestRejected {
            status: status.as_u16(),
            message,
        }
    }

    pub fn unexpected_shape(status: StatusCode) -> Self {
        ApiError::rejected(status, Some(UNEXPECTED_RESPONSE.to_string()))
    }

    /// Authentication failures redirect instead of showing a message.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthenticated)
    }

    /// Worth offering the user a retry of the same action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Unreachable(_))
    }

    /// Inline message for a form or status line. `None` for auth failures,
    /// which are handled by navigating to the login screen.
    pub fn user_message(&self, fallback: &str) -> Option<String> {
        match self {
            ApiError::Unauthenticated => None,
            ApiError::RequestRejected {
                message: Some(m), ..
            } => Some(m.clone()),
            ApiError::RequestRejected { message: None, .. } => Some(fallback.to_string()),
            ApiError::Unreachable(_) => {
                Some("Could not reach the server. Please try again.".to_string())
            }
            ApiError::Invalid(m) => Some(m.clone()),
            ApiError::NotConfigured => Some(fallback.to_string()),
        }
    }
}

fn detail(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {}", m),
        None => String::new(),
    }
}
