use crate::upstream;
use std::fmt;

/// The step of a fetch cycle that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchStage {
    Metadata,
    UrlParse,
    Jwks,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FetchStage::Metadata => write!(f, "metadata"),
            FetchStage::UrlParse => write!(f, "urlparse"),
            FetchStage::Jwks => write!(f, "jwks"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Transport {
        stage: FetchStage,
        path: String,
        source: upstream::Error,
    },
    Parse {
        stage: FetchStage,
        path: String,
        reason: String,
    },
}

impl Error {
    pub fn stage(&self) -> FetchStage {
        match self {
            Error::Transport { stage, .. } | Error::Parse { stage, .. } => *stage,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Error::Transport { path, .. } | Error::Parse { path, .. } => path,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Transport {
                stage,
                path,
                source,
            } => write!(f, "{stage}: getting {path}: {source}"),
            Error::Parse {
                stage,
                path,
                reason,
            } => write!(f, "{stage}: parsing {path}: {reason}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport { source, .. } => Some(source),
            Error::Parse { .. } => None,
        }
    }
}
