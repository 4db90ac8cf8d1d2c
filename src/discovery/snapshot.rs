use crate::discovery::ProviderMetadata;
use arc_swap::ArcSwap;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Discovery document and key set from a single fetch cycle.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub metadata: ProviderMetadata,
    pub jwks: Bytes,
    /// `None` until the first successful fetch has been committed.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(metadata: ProviderMetadata, jwks: Bytes, fetched_at: DateTime<Utc>) -> Self {
        Self {
            metadata,
            jwks,
            fetched_at: Some(fetched_at),
        }
    }

    pub fn is_primed(&self) -> bool {
        self.fetched_at.is_some()
    }
}

/// Holds the latest committed [`Snapshot`].
///
/// Readers never wait on the writer: `set` swaps the whole snapshot pointer,
/// so a reader sees either the previous or the new snapshot, never a mix.
#[derive(Debug)]
pub struct SnapshotCache {
    current: ArcSwap<Snapshot>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    pub fn get(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn set(&self, snapshot: Snapshot) {
        self.current.store(Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(generation: usize) -> Snapshot {
        let metadata = ProviderMetadata {
            issuer: format!("https://issuer-{generation}.example"),
            jwks_uri: format!("https://issuer-{generation}.example/jwks"),
            ..ProviderMetadata::default()
        };
        let jwks = Bytes::from(format!(r#"{{"keys":[{{"kid":"{generation}"}}]}}"#));

        Snapshot::new(metadata, jwks, Utc::now())
    }

    #[test]
    fn test_get_before_set_is_empty() {
        let cache = SnapshotCache::new();

        let current = cache.get();

        assert!(!current.is_primed());
        assert!(current.metadata.issuer.is_empty());
        assert!(current.jwks.is_empty());
    }

    #[test]
    fn test_set_replaces_snapshot() {
        let cache = SnapshotCache::new();
        cache.set(snapshot(1));
        let first = cache.get();

        cache.set(snapshot(2));
        let second = cache.get();

        assert!(second.is_primed());
        assert_eq!(second.metadata.issuer, "https://issuer-2.example");
        assert_eq!(first.metadata.issuer, "https://issuer-1.example");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_observe_mixed_snapshot() {
        let cache = Arc::new(SnapshotCache::new());
        cache.set(snapshot(0));

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            readers.push(tokio::spawn(async move {
                for _ in 0..2_000 {
                    let current = cache.get();
                    let generation = current
                        .metadata
                        .issuer
                        .trim_start_matches("https://issuer-")
                        .trim_end_matches(".example")
                        .to_string();
                    let expected = format!(r#"{{"keys":[{{"kid":"{generation}"}}]}}"#);
                    assert_eq!(current.jwks, Bytes::from(expected));
                    tokio::task::yield_now().await;
                }
            }));
        }

        for generation in 1..500 {
            cache.set(snapshot(generation));
            tokio::task::yield_now().await;
        }

        for reader in readers {
            reader.await.unwrap();
        }
    }
}
