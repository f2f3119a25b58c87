use crate::store::TtlStore;
use actix_web::rt::task::JoinHandle;
use actix_web::rt::time::Instant;
use dashmap::DashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_GC_INTERVAL_SECONDS: u64 = 60 * 10;

/// A [TtlStore] that keeps counters in a [Dashmap](dashmap::DashMap) in
/// process memory.
#[derive(Clone)]
pub struct InMemoryStore {
    map: Arc<DashMap<String, Entry>>,
    gc_handle: Option<Arc<JoinHandle<()>>>,
}

struct Entry {
    deadline: Instant,
    count: u64,
}

impl InMemoryStore {
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder {
            gc_interval: Some(Duration::from_secs(DEFAULT_GC_INTERVAL_SECONDS)),
        }
    }

    fn garbage_collector(map: Arc<DashMap<String, Entry>>, interval: Duration) -> JoinHandle<()> {
        assert!(
            interval.as_secs_f64() > 0f64,
            "GC interval must be non-zero"
        );
        actix_web::rt::spawn(async move {
            loop {
                let now = Instant::now();
                map.retain(|_k, v| v.deadline > now);
                actix_web::rt::time::sleep_until(now + interval).await;
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn contains_live_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
}

impl TtlStore for InMemoryStore {
    type Error = Infallible;

    async fn get(&self, key: &str) -> Result<Option<u64>, Self::Error> {
        let now = Instant::now();
        // An expired entry reads as absent even if the GC hasn't swept it yet.
        Ok(self
            .map
            .get(key)
            .filter(|entry| entry.deadline > now)
            .map(|entry| entry.count))
    }

    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<(), Self::Error> {
        let deadline = Instant::now()
            .checked_add(ttl)
            .expect("TTL unexpectedly large");
        self.map.insert(
            key.to_string(),
            Entry {
                deadline,
                count: value,
            },
        );
        Ok(())
    }
}

impl Drop for InMemoryStore {
    fn drop(&mut self) {
        if let Some(handle) = &self.gc_handle {
            handle.abort();
        }
    }
}

pub struct InMemoryStoreBuilder {
    gc_interval: Option<Duration>,
}

impl InMemoryStoreBuilder {
    /// Override the default garbage collector interval.
    ///
    /// Set to None to disable garbage collection.
    ///
    /// The garbage collector periodically scans the internal map, removing
    /// expired entries. Expired entries are invisible to [TtlStore::get]
    /// either way; the GC only reclaims their memory.
    pub fn with_gc_interval(mut self, interval: Option<Duration>) -> Self {
        self.gc_interval = interval;
        self
    }

    pub fn build(self) -> InMemoryStore {
        let map = Arc::new(DashMap::<String, Entry>::new());
        let gc_handle = self
            .gc_interval
            .map(|gc_interval| Arc::new(InMemoryStore::garbage_collector(map.clone(), gc_interval)));
        InMemoryStore { map, gc_handle }
    }
}
