use reqwest::StatusCode;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";
pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to perform this action.";
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please check your credentials.";

/// Closed failure taxonomy shared with the view layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AuthExpired,
    Forbidden,
    RequestFailed,
    ValidationFailed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthExpired => "AUTH_EXPIRED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::RequestFailed => "REQUEST_FAILED",
            ErrorKind::ValidationFailed => "VALIDATION_FAILED",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{}", .message.as_deref().unwrap_or(SESSION_EXPIRED_MESSAGE))]
    AuthExpired { message: Option<String> },
    #[error("{}", .message.as_deref().unwrap_or(FORBIDDEN_MESSAGE))]
    Forbidden { message: Option<String> },
    #[error("{message}")]
    RequestFailed {
        status: Option<StatusCode>,
        message: String,
    },
    #[error("{0}")]
    Validation(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::AuthExpired { .. } => ErrorKind::AuthExpired,
            AuthError::Forbidden { .. } => ErrorKind::Forbidden,
            AuthError::RequestFailed { .. } | AuthError::Http(_) | AuthError::Decode(_) => {
                ErrorKind::RequestFailed
            }
            AuthError::Validation(_) => ErrorKind::ValidationFailed,
            AuthError::Io(_) | AuthError::Config(_) => ErrorKind::Internal,
        }
    }

    /// Message supplied by the server, if the failure came with one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            AuthError::AuthExpired { message } | AuthError::Forbidden { message } => {
                message.as_deref()
            }
            AuthError::RequestFailed {
                status: Some(_),
                message,
            } => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AuthError::AuthExpired { .. } => Some(StatusCode::UNAUTHORIZED),
            AuthError::Forbidden { .. } => Some(StatusCode::FORBIDDEN),
            AuthError::RequestFailed { status, .. } => *status,
            AuthError::Http(err) => err.status(),
            _ => None,
        }
    }

    pub fn request_failed(message: impl Into<String>) -> Self {
        AuthError::RequestFailed {
            status: None,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(
            AuthError::AuthExpired { message: None }.kind(),
            ErrorKind::AuthExpired
        );
        assert_eq!(
            AuthError::Forbidden { message: None }.kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            AuthError::request_failed("boom").kind(),
            ErrorKind::RequestFailed
        );
        assert_eq!(
            AuthError::Validation("email is required".into()).kind(),
            ErrorKind::ValidationFailed
        );
        assert_eq!(
            AuthError::Config("missing".into()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(ErrorKind::AuthExpired.as_str(), "AUTH_EXPIRED");
    }

    #[test]
    fn display_falls_back_to_default_messages() {
        let expired = AuthError::AuthExpired { message: None };
        assert_eq!(expired.to_string(), SESSION_EXPIRED_MESSAGE);
        assert_eq!(expired.server_message(), None);

        let forbidden = AuthError::Forbidden {
            message: Some("Admins only".into()),
        };
        assert_eq!(forbidden.to_string(), "Admins only");
        assert_eq!(forbidden.server_message(), Some("Admins only"));
        assert_eq!(forbidden.status(), Some(StatusCode::FORBIDDEN));
    }

    #[test]
    fn locally_raised_request_failures_have_no_server_message() {
        let err = AuthError::request_failed(LOGIN_FAILED_MESSAGE);
        assert_eq!(err.server_message(), None);
        assert_eq!(err.to_string(), LOGIN_FAILED_MESSAGE);

        let err = AuthError::RequestFailed {
            status: Some(StatusCode::BAD_REQUEST),
            message: "Email already registered".into(),
        };
        assert_eq!(err.server_message(), Some("Email already registered"));
    }
}
