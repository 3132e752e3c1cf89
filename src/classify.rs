//! Maps failures onto the taxonomy a chat front end cares about.

use std::fmt;

use crate::Error;

/// The user-facing kind of a failed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The send was cancelled. Never shown as an error.
    AbortSignal,
    /// Bad input that never reached the network.
    ValidationError {
        /// What was wrong with the input.
        message: String,
    },
    /// An attachment could not be decoded.
    EncodingError {
        /// Why decoding failed.
        message: String,
    },
    /// The provider answered with a non-success status.
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
    /// No response was received.
    NetworkError,
    /// Anything else.
    UnknownError {
        /// Best-effort description.
        message: String,
    },
}

impl ErrorKind {
    /// Classify an error.
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::Abort { .. } => ErrorKind::AbortSignal,
            Error::Validation { message, .. } => ErrorKind::ValidationError {
                message: message.clone(),
            },
            Error::Encoding { message, .. } => ErrorKind::EncodingError {
                message: message.clone(),
            },
            Error::Api {
                status_code, body, ..
            } => ErrorKind::ApiError {
                status: *status_code,
                body: body.clone(),
            },
            Error::Connection { .. } | Error::Timeout { .. } | Error::HttpClient { .. } => {
                ErrorKind::NetworkError
            }
            other => ErrorKind::UnknownError {
                message: other.to_string(),
            },
        }
    }

    /// True for [`ErrorKind::AbortSignal`].
    pub fn is_abort(&self) -> bool {
        matches!(self, ErrorKind::AbortSignal)
    }

    /// The string recorded in the session's error field, if this kind is recorded at all.
    ///
    /// Aborts are expected and validation failures are reported to the caller
    /// directly, so neither is recorded.
    pub fn session_message(&self) -> Option<String> {
        match self {
            ErrorKind::AbortSignal | ErrorKind::ValidationError { .. } => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::AbortSignal => write!(f, "Aborted"),
            ErrorKind::ValidationError { message } => write!(f, "Invalid input: {message}"),
            ErrorKind::EncodingError { message } => write!(f, "Encoding Error: {message}"),
            ErrorKind::ApiError { status, body } => write!(f, "API Error: {status} - {body}"),
            ErrorKind::NetworkError => {
                write!(f, "Network Error: No response received from the server")
            }
            ErrorKind::UnknownError { message } => write!(f, "Error: {message}"),
        }
    }
}

impl From<&Error> for ErrorKind {
    fn from(err: &Error) -> Self {
        ErrorKind::classify(err)
    }
}
