use crate::store::TtlStore;
use actix_web::{HttpResponse, ResponseError};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Redis error: {0}")]
    Redis(
        #[source]
        #[from]
        redis::RedisError,
    ),
}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::InternalServerError().finish()
    }
}

/// A [TtlStore] that keeps counters in Redis.
///
/// Counters are read with a plain `GET` and written with `SET .. EX`, so the
/// expiry is reset on every write. The read and the write are two separate
/// round trips; see [Limiter::check](crate::quota::Limiter::check) for what
/// that means under concurrency.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    key_prefix: Option<String>,
}

impl RedisStore {
    /// Create a RedisStoreBuilder.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use actix_request_quota::store::redis::RedisStore;
    /// # use redis::aio::ConnectionManager;
    /// # async fn example() {
    /// let client = redis::Client::open("redis://127.0.0.1/").unwrap();
    /// let manager = ConnectionManager::new(client).await.unwrap();
    /// let store = RedisStore::builder(manager).build();
    /// # };
    /// ```
    pub fn builder(connection: ConnectionManager) -> Builder {
        Builder {
            connection,
            key_prefix: None,
        }
    }

    fn make_key<'t>(&self, key: &'t str) -> Cow<'t, str> {
        match &self.key_prefix {
            None => Cow::Borrowed(key),
            Some(prefix) => Cow::Owned(format!("{prefix}{key}")),
        }
    }
}

pub struct Builder {
    connection: ConnectionManager,
    key_prefix: Option<String>,
}

impl Builder {
    /// Apply an optional prefix to all keys given to this store.
    ///
    /// This may be useful when the Redis instance is being used for other
    /// purposes; the prefix is used as a 'namespace' to avoid collision with
    /// other caches or keys inside Redis. It is applied on top of any policy
    /// key prefix.
    pub fn key_prefix(mut self, key_prefix: Option<&str>) -> Self {
        self.key_prefix = key_prefix.map(ToOwned::to_owned);
        self
    }

    pub fn build(self) -> RedisStore {
        RedisStore {
            connection: self.connection,
            key_prefix: self.key_prefix,
        }
    }
}

impl TtlStore for RedisStore {
    type Error = Error;

    async fn get(&self, key: &str) -> Result<Option<u64>, Self::Error> {
        let key = self.make_key(key);
        let mut con = self.connection.clone();
        let count: Option<u64> = con.get(key.as_ref()).await?;
        Ok(count)
    }

    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<(), Self::Error> {
        let key = self.make_key(key);
        let mut con = self.connection.clone();
        let () = con.set_ex(key.as_ref(), value, ttl.as_secs() as usize).await?;
        Ok(())
    }
}
