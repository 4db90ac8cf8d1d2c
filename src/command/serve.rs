use crate::command;
use crate::configuration::Configuration;
use crate::discovery::{DiscoveryFetcher, RefreshLoop, SnapshotCache};
use crate::server::{Listener, ServerContext, Timeouts};
use crate::upstream::{ClientConfig, KubernetesClient, UpstreamClient};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Startup ordering and shutdown of the discovery service.
///
/// Discovery data is primed before the listener is bound; afterwards the
/// refresh loop and the HTTP listener run side by side until `shutdown` fires.
pub struct Command {
    refresh: RefreshLoop,
    context: Arc<ServerContext>,
    listen: String,
    timeouts: Timeouts,
}

impl Command {
    pub fn new(config: &Configuration) -> Result<Self, command::Error> {
        let client_config = ClientConfig::resolve(config.upstream.kubeconfig.as_deref())?;
        info!("Using Kubernetes API server {}", client_config.server);

        let client = KubernetesClient::new(client_config, config.discovery.max_document_size)?;
        Self::with_client(config, Arc::new(client))
    }

    pub fn with_client(
        config: &Configuration,
        client: Arc<dyn UpstreamClient>,
    ) -> Result<Self, command::Error> {
        let cache = Arc::new(SnapshotCache::new());
        let refresh_interval = config.discovery.refresh_interval();

        let refresh = RefreshLoop::new(
            DiscoveryFetcher::new(client),
            Arc::clone(&cache),
            refresh_interval,
            config.discovery.jwks_path.clone(),
        );
        let context = Arc::new(ServerContext::new(
            cache,
            config.discovery.jwks_path.clone(),
            refresh_interval,
        )?);

        let timeouts = Timeouts {
            query_timeout: Duration::from_secs(config.server.query_timeout),
            query_timeout_grace_period: Duration::from_secs(
                config.server.query_timeout_grace_period,
            ),
            shutdown_grace_period: Duration::from_secs(config.server.shutdown_grace_period),
        };

        Ok(Command {
            refresh,
            context,
            listen: config.server.listen.clone(),
            timeouts,
        })
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<(), command::Error> {
        info!("Fetching initial discovery data");

        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                info!("Shutdown requested before discovery data was available, exiting");
                return Ok(());
            }
            result = self.refresh.prime() => {
                if let Err(error) = result {
                    error!(
                        "Initial discovery fetch failed (stage: {}, path: {}): {error}",
                        error.stage(),
                        error.path()
                    );
                    return Err(error.into());
                }
            }
        }

        let listener = Listener::bind(&self.listen).await.map_err(|error| {
            error!("Failed to bind {}: {error}", self.listen);
            error
        })?;
        info!("Bound HTTP listener to {}", listener.local_addr());

        let refresh = tokio::spawn(self.refresh.run(shutdown.clone()));
        let server = tokio::spawn(listener.serve(self.context, self.timeouts, shutdown.clone()));

        let (refresh, server) = tokio::join!(refresh, server);
        refresh?;
        server?;

        info!("Shutdown complete");
        Ok(())
    }
}

/// Cancel `shutdown` on the first SIGINT or SIGTERM.
pub async fn cancel_on_signal(shutdown: CancellationToken) -> Result<(), io::Error> {
    wait_for_signal().await?;
    info!("Termination signal received, shutting down");
    shutdown.cancel();
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<(), io::Error> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<(), io::Error> {
    tokio::signal::ctrl_c().await
}
