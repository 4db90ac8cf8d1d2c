use crate::discovery::{DiscoveryFetcher, Error, FetchedDiscovery, Snapshot, SnapshotCache};
use crate::metrics_provider::METRICS_PROVIDER;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Sole writer of the [`SnapshotCache`].
///
/// `prime` performs the blocking first fetch; `run` then refreshes on a fixed
/// interval until cancelled, keeping the previous snapshot when a fetch fails.
pub struct RefreshLoop {
    fetcher: DiscoveryFetcher,
    cache: Arc<SnapshotCache>,
    interval: Duration,
    jwks_path: String,
}

impl RefreshLoop {
    pub fn new(
        fetcher: DiscoveryFetcher,
        cache: Arc<SnapshotCache>,
        interval: Duration,
        jwks_path: String,
    ) -> Self {
        Self {
            fetcher,
            cache,
            interval,
            jwks_path,
        }
    }

    pub async fn prime(&self) -> Result<(), Error> {
        match self.fetcher.fetch().await {
            Ok(fetched) => {
                self.commit(fetched);
                Ok(())
            }
            Err(error) => {
                METRICS_PROVIDER.record_refresh_failure();
                Err(error)
            }
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Refreshing discovery data every {:?}", self.interval);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                result = self.fetcher.fetch() => match result {
                    Ok(fetched) => self.commit(fetched),
                    Err(error) => {
                        METRICS_PROVIDER.record_refresh_failure();
                        error!(
                            "Failed to refresh discovery data (stage: {}, path: {}), serving previous snapshot: {error}",
                            error.stage(),
                            error.path()
                        );
                    }
                },
            }
        }

        info!("Discovery refresh stopped");
    }

    fn commit(&self, fetched: FetchedDiscovery) {
        let fetched_at = Utc::now();
        let metadata = fetched.metadata.republish(&self.jwks_path);

        info!(
            "Committed discovery snapshot for issuer {} fetched at {fetched_at}",
            metadata.issuer
        );

        self.cache
            .set(Snapshot::new(metadata, fetched.jwks, fetched_at));
        METRICS_PROVIDER.record_refresh_success(fetched_at.timestamp());
    }
}
