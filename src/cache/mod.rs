//! The exact-match caching subsystem: components A (key derivation), B/C/D
//! (the local/remote/tiered storage tiers), and E (the request-facing
//! handler).

pub mod error;
pub mod exact_handler;
pub mod keys;
pub mod memory;
#[cfg(feature = "redis")]
pub mod remote;
pub mod tiered;
pub mod traits;

pub use error::{CacheError, CacheResult};
pub use exact_handler::{CachedResponseEnvelope, ExactHandler};
pub use keys::KeyGenerator;
pub use memory::{LocalCache, LocalCacheConfig};
#[cfg(feature = "redis")]
pub use remote::RemoteCache;
pub use tiered::{TieredCache, TieredCacheConfig};
pub use traits::{Cache, CacheStats};
