// src/lock/memory.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use super::{HeldLock, Locker};
use crate::error::{SyncError, SyncResult};

type Table = Arc<Mutex<HashMap<String, (String, Instant)>>>;

/// Process-local lock table. Only excludes runs inside one process; use
/// [`super::RedisLocker`] when several replicas are deployed.
#[derive(Clone)]
pub struct MemoryLocker {
    table: Table,
    ttl: Duration,
}

impl MemoryLocker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn is_held(&self, resource: &str) -> bool {
        self.table
            .lock()
            .map(|t| t.get(resource).is_some_and(|(_, exp)| *exp > Instant::now()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Locker for MemoryLocker {
    async fn lock(&self, resource: &str) -> SyncResult<Option<Box<dyn HeldLock>>> {
        let now = Instant::now();
        let token = Uuid::new_v4().to_string();
        let mut table = self
            .table
            .lock()
            .map_err(|_| SyncError::Lock("lock table mutex poisoned".into()))?;

        if let Some((_, expires)) = table.get(resource) {
            if *expires > now {
                return Ok(None);
            }
        }
        table.insert(resource.to_string(), (token.clone(), now + self.ttl));

        Ok(Some(Box::new(MemoryLock {
            table: self.table.clone(),
            resource: resource.to_string(),
            token,
        })))
    }
}

struct MemoryLock {
    table: Table,
    resource: String,
    token: String,
}

#[async_trait]
impl HeldLock for MemoryLock {
    fn resource(&self) -> &str {
        &self.resource
    }

    async fn free(self: Box<Self>) -> SyncResult<()> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| SyncError::Lock("lock table mutex poisoned".into()))?;
        // Only remove our own entry; an expired lock may have been re-taken.
        if table.get(&self.resource).is_some_and(|(t, _)| *t == self.token) {
            table.remove(&self.resource);
        }
        Ok(())
    }
}
