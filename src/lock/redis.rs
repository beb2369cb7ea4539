// src/lock/redis.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{cmd, Cmd};
use deadpool_redis::{Config, Pool, Runtime};
use uuid::Uuid;

use super::{HeldLock, Locker};
use crate::error::{SyncError, SyncResult};

const KEY_PREFIX: &str = "aq-forecast-sync:lock:";

const RELEASE_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

/// Redis lock: `SET key token NX PX ttl` to acquire, compare-and-delete to
/// release. The TTL bounds how long a crashed holder blocks later runs.
#[derive(Clone)]
pub struct RedisLocker {
    pool: Arc<Pool>,
    ttl: Duration,
}

impl RedisLocker {
    pub fn from_url(url: &str, ttl: Duration) -> SyncResult<Self> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| SyncError::Lock(format!("creating redis pool: {e}")))?;
        Ok(Self {
            pool: Arc::new(pool),
            ttl,
        })
    }
}

#[async_trait]
impl Locker for RedisLocker {
    async fn lock(&self, resource: &str) -> SyncResult<Option<Box<dyn HeldLock>>> {
        let key = format!("{KEY_PREFIX}{resource}");
        let token = Uuid::new_v4().to_string();
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::Lock(format!("redis pool: {e}")))?;

        let granted: Option<String> = cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Lock(format!("redis SET NX: {e}")))?;

        if granted.is_none() {
            tracing::debug!(resource, "redis lock already held");
            return Ok(None);
        }

        Ok(Some(Box::new(RedisLock {
            pool: self.pool.clone(),
            resource: resource.to_string(),
            key,
            token,
        })))
    }
}

struct RedisLock {
    pool: Arc<Pool>,
    resource: String,
    key: String,
    token: String,
}

#[async_trait]
impl HeldLock for RedisLock {
    fn resource(&self) -> &str {
        &self.resource
    }

    async fn free(self: Box<Self>) -> SyncResult<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::Lock(format!("redis pool: {e}")))?;
        let removed: i32 = release_cmd(&self.key, &self.token)
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Lock(format!("redis release: {e}")))?;
        if removed == 0 {
            tracing::warn!(resource = %self.resource, "lock had already expired or changed hands");
        }
        Ok(())
    }
}

/// `EVAL` of the compare-and-delete script with one key.
fn release_cmd(key: &str, token: &str) -> Cmd {
    let mut c = cmd("EVAL");
    c.arg(RELEASE_SCRIPT).arg(1).arg(key).arg(token);
    c
}
