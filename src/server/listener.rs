use crate::server::{serve_connection, ServerContext};
use hyper_util::rt::TokioIo;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Connection-level timing: per-connection lifetime and the shutdown drain window.
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
    pub query_timeout: Duration,
    pub query_timeout_grace_period: Duration,
    pub shutdown_grace_period: Duration,
}

pub struct Listener {
    listener: TcpListener,
    binding_address: SocketAddr,
}

impl Listener {
    pub async fn bind(address: &str) -> Result<Self, io::Error> {
        let listener = TcpListener::bind(address).await?;
        let binding_address = listener.local_addr()?;

        Ok(Self {
            listener,
            binding_address,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.binding_address
    }

    /// Accept connections until `shutdown` fires, then stop accepting, let open
    /// connections finish within the shutdown grace period and abort the rest.
    pub async fn serve(
        self,
        context: Arc<ServerContext>,
        timeouts: Timeouts,
        shutdown: CancellationToken,
    ) {
        info!("Listening on {} (non-TLS)", self.binding_address);

        let connection_timeouts = Arc::new([
            timeouts.query_timeout,
            timeouts.query_timeout_grace_period,
        ]);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                Some(result) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(error) = result {
                        error!("Connection task failed: {error}");
                    }
                }
                accepted = self.listener.accept() => {
                    let (tcp, remote_address) = match accepted {
                        Ok(accepted) => accepted,
                        Err(error) => {
                            warn!("Failed to accept connection: {error}");
                            if accept_backoff(&shutdown).await {
                                continue;
                            }
                            break;
                        }
                    };

                    debug!("Accepted connection from {remote_address}");
                    connections.spawn(serve_connection(
                        TokioIo::new(tcp),
                        Arc::clone(&context),
                        Arc::clone(&connection_timeouts),
                        shutdown.clone(),
                    ));
                }
            }
        }

        drop(self.listener);
        info!(
            "Stopped accepting connections, draining {} open connections",
            connections.len()
        );

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(timeouts.shutdown_grace_period, drain)
            .await
            .is_err()
        {
            warn!(
                "Shutdown grace period elapsed, closing {} connections",
                connections.len()
            );
            connections.shutdown().await;
        }

        info!("HTTP server stopped");
    }
}

/// Pause after a failed accept. Returns `false` when shutdown fired meanwhile.
async fn accept_backoff(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(ACCEPT_BACKOFF) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{ProviderMetadata, Snapshot, SnapshotCache};
    use bytes::Bytes;
    use chrono::Utc;
    use http_body_util::{BodyExt, Empty};
    use hyper::header::HOST;
    use hyper::{Request, StatusCode};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    static JWKS: &str = r#"{"keys":[{"kid":"abc","kty":"RSA","n":"xGOr","e":"AQAB"}]}"#;

    fn timeouts() -> Timeouts {
        Timeouts {
            query_timeout: Duration::from_secs(60),
            query_timeout_grace_period: Duration::from_secs(5),
            shutdown_grace_period: Duration::from_millis(200),
        }
    }

    fn context() -> Arc<ServerContext> {
        let cache = Arc::new(SnapshotCache::new());
        let metadata = ProviderMetadata {
            issuer: "https://api.example:6443".to_string(),
            jwks_uri: "https://10.0.0.1:6443/openid/v1/jwks".to_string(),
            ..ProviderMetadata::default()
        };
        cache.set(Snapshot::new(
            metadata.republish("/jwks"),
            Bytes::from_static(JWKS.as_bytes()),
            Utc::now(),
        ));

        Arc::new(ServerContext::new(cache, "/jwks".to_string(), Duration::from_secs(300)).unwrap())
    }

    async fn start() -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(listener.serve(context(), timeouts(), shutdown.clone()));
        (address, shutdown, handle)
    }

    async fn get(address: SocketAddr, path: &str) -> (StatusCode, Bytes) {
        let stream = TcpStream::connect(address).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);

        let request = Request::builder()
            .uri(path)
            .header(HOST, "localhost")
            .body(Empty::<Bytes>::new())
            .unwrap();
        let response = sender.send_request(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    #[tokio::test]
    async fn test_serves_and_shuts_down() {
        let (address, shutdown, handle) = start().await;

        let (status, body) = get(address, "/jwks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, JWKS.as_bytes());

        let (status, body) = get(address, "/.well-known/openid-configuration").await;
        assert_eq!(status, StatusCode::OK);
        let document: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(document["jwks_uri"], "https://api.example:6443/jwks");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server did not stop")
            .unwrap();

        assert!(TcpStream::connect(address).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_backoff_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        assert!(accept_backoff(&shutdown).await);

        let started = tokio::time::Instant::now();
        let waiter = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { accept_backoff(&shutdown).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.cancel();

        assert!(!waiter.await.unwrap());
        assert!(started.elapsed() < ACCEPT_BACKOFF);
    }

    #[tokio::test]
    async fn test_request_in_flight_at_shutdown_completes() {
        let (address, shutdown, handle) = start().await;

        let mut stream = TcpStream::connect(address).await.unwrap();
        stream
            .write_all(b"GET /jwks HTTP/1.1\r\nHost: localhost\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.write_all(b"\r\n").await.unwrap();

        let mut response = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut response))
            .await
            .expect("no response before the connection closed")
            .unwrap();
        let response = String::from_utf8(response).unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with(JWKS), "{response}");

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_unfinished_request_does_not_outlive_grace_period() {
        let (address, shutdown, handle) = start().await;

        let mut stream = TcpStream::connect(address).await.unwrap();
        stream
            .write_all(b"GET /jwks HTTP/1.1\r\nHost: localhost\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server did not stop within the grace period")
            .unwrap();
    }
}
