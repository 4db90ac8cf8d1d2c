mod error;
mod fetcher;
mod provider_metadata;
mod refresh;
mod snapshot;

pub use error::{Error, FetchStage};
pub use fetcher::{DiscoveryFetcher, FetchedDiscovery, WELL_KNOWN_OPENID_CONFIGURATION};
pub use provider_metadata::ProviderMetadata;
pub use refresh::RefreshLoop;
pub use snapshot::{Snapshot, SnapshotCache};
