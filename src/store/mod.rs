#[cfg(feature = "dashmap")]
#[cfg_attr(docsrs, doc(cfg(feature = "dashmap")))]
pub mod memory;

#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
pub mod redis;

#[cfg(feature = "dashmap")]
pub use memory::{InMemoryStore, InMemoryStoreBuilder};

use std::future::Future;
use std::time::Duration;

/// A key-value store where every entry carries its own expiry.
///
/// This is the only state the limiter relies on; the limiter itself is
/// stateless between calls. A store is required to implement [Clone], usually
/// this means wrapping your data store within an [Arc](std::sync::Arc),
/// although many connection pools already do so internally; there is no need
/// to wrap it twice.
pub trait TtlStore: Clone {
    type Error;

    /// Read the counter stored at `key`.
    ///
    /// Returns [None] when the key is absent or its TTL has elapsed; the two
    /// cases are indistinguishable to callers.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<u64>, Self::Error>>;

    /// Write `value` at `key`, replacing any existing entry and setting the
    /// expiry to `ttl` from now.
    ///
    /// Note the TTL is reset even when the key already holds a live entry.
    fn set(
        &self,
        key: &str,
        value: u64,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), Self::Error>>;
}
