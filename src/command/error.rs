use crate::{configuration, discovery, server, upstream};
use std::{fmt, io};
use tokio::task::JoinError;

#[derive(Debug)]
pub enum Error {
    IO(io::Error),
    Configuration(configuration::Error),
    Upstream(upstream::Error),
    Discovery(discovery::Error),
    Server(server::Error),
    Task(JoinError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IO(err) => write!(f, "IO error: {err}"),
            Error::Configuration(err) => {
                write!(f, "Configuration error: ")?;
                write!(f, "{err}")
            }
            Error::Upstream(err) => {
                write!(f, "Upstream error: ")?;
                write!(f, "{err}")
            }
            Error::Discovery(err) => {
                write!(f, "Discovery error: ")?;
                write!(f, "{err}")
            }
            Error::Server(err) => {
                write!(f, "Server error: ")?;
                write!(f, "{err}")
            }
            Error::Task(err) => write!(f, "Background task failed: {err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IO(err)
    }
}

impl From<configuration::Error> for Error {
    fn from(err: configuration::Error) -> Self {
        Error::Configuration(err)
    }
}

impl From<upstream::Error> for Error {
    fn from(err: upstream::Error) -> Self {
        Error::Upstream(err)
    }
}

impl From<discovery::Error> for Error {
    fn from(err: discovery::Error) -> Self {
        Error::Discovery(err)
    }
}

impl From<server::Error> for Error {
    fn from(err: server::Error) -> Self {
        Error::Server(err)
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::Task(err)
    }
}
