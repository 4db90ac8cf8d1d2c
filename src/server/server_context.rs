use crate::discovery::SnapshotCache;
use crate::server::Error;
use hyper::header::HeaderValue;
use std::sync::Arc;
use std::time::Duration;

/// Everything a request handler may read. Handlers only ever read the cache.
pub struct ServerContext {
    pub cache: Arc<SnapshotCache>,
    pub jwks_path: String,
    pub cache_control: HeaderValue,
}

impl ServerContext {
    pub fn new(
        cache: Arc<SnapshotCache>,
        jwks_path: String,
        refresh_interval: Duration,
    ) -> Result<Self, Error> {
        let cache_control = HeaderValue::from_str(&format!(
            "public, max-age={}",
            refresh_interval.as_secs()
        ))?;

        Ok(Self {
            cache,
            jwks_path,
            cache_control,
        })
    }
}
