use hyper::StatusCode;
use std::{fmt, io};
use tracing::debug;

#[derive(Debug)]
pub enum Error {
    Config(String),
    Transport(String),
    Status(StatusCode),
    BodyTooLarge(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(err) => write!(f, "Upstream configuration error: {err}"),
            Error::Transport(err) => write!(f, "Upstream transport error: {err}"),
            Error::Status(status) => write!(f, "Upstream responded with status {status}"),
            Error::BodyTooLarge(limit) => {
                write!(f, "Upstream response body exceeds {limit} bytes")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        debug!("IO error: {err}");
        Error::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(format!("invalid kubeconfig: {err}"))
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Config(format!("TLS error: {err}"))
    }
}

impl From<rustls_pki_types::pem::Error> for Error {
    fn from(err: rustls_pki_types::pem::Error) -> Self {
        Error::Config(format!("PEM error: {err}"))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Config(format!("invalid base64 data: {err}"))
    }
}

impl From<hyper::http::Error> for Error {
    fn from(err: hyper::http::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<hyper::header::InvalidHeaderValue> for Error {
    fn from(err: hyper::header::InvalidHeaderValue) -> Self {
        Error::Config(format!("invalid header value: {err}"))
    }
}
