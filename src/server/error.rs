use hyper::StatusCode;
use std::fmt;
use tracing::debug;

#[derive(Debug, PartialEq)]
pub enum Error {
    NotFound,
    MethodNotAllowed,
    NotReady,
    Internal(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound => "NOT_FOUND",
            Error::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Error::NotReady => "NOT_READY",
            Error::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Client-facing message. Carries no internal detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            Error::NotFound => "resource not found",
            Error::MethodNotAllowed => "method not allowed",
            Error::NotReady => "discovery data not available yet",
            Error::Internal(_) => "internal server error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Internal(detail) => write!(f, "internal server error: {detail}"),
            _ => write!(f, "{}", self.public_message()),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        debug!("Serialization error: {error}");
        Error::Internal(format!("serialization failed: {error}"))
    }
}

impl From<hyper::header::InvalidHeaderValue> for Error {
    fn from(error: hyper::header::InvalidHeaderValue) -> Self {
        Error::Internal(format!("invalid header value: {error}"))
    }
}
