// src/lock/mod.rs
//! Cluster-wide mutual exclusion for the sync job.
//!
//! `lock()` returns `Ok(None)` when someone else holds the resource; that is
//! a normal outcome ("skip this run"), not an error.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::SyncResult;

pub use memory::MemoryLocker;
pub use redis::RedisLocker;

/// Resource name shared by every run type.
pub const SYNC_LOCK_RESOURCE: &str = "forecasts";

#[async_trait]
pub trait Locker: Send + Sync {
    async fn lock(&self, resource: &str) -> SyncResult<Option<Box<dyn HeldLock>>>;
}

/// An acquired lock. Consumed by `free`, so it can only be released once.
#[async_trait]
pub trait HeldLock: Send {
    fn resource(&self) -> &str;
    async fn free(self: Box<Self>) -> SyncResult<()>;
}

/// Owns a [`HeldLock`] for the length of a run.
///
/// `release` frees it in line. If the guard is dropped while still holding
/// the lock (a panic unwinding through the run, or the run future being
/// dropped), the free is spawned onto the current runtime instead.
pub struct LockGuard {
    held: Option<Box<dyn HeldLock>>,
}

impl LockGuard {
    pub fn new(held: Box<dyn HeldLock>) -> Self {
        Self { held: Some(held) }
    }

    pub fn resource(&self) -> &str {
        self.held.as_ref().map(|h| h.resource()).unwrap_or_default()
    }

    pub async fn release(mut self) {
        if let Some(held) = self.held.take() {
            free_logged(held).await;
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(held) = self.held.take() else {
            return;
        };
        warn!(resource = held.resource(), "run ended without releasing its lock; freeing it");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(free_logged(held));
            }
            Err(_) => {
                warn!(
                    resource = held.resource(),
                    "no runtime to free lock on; it will expire on its own"
                );
            }
        }
    }
}

async fn free_logged(held: Box<dyn HeldLock>) {
    let resource = held.resource().to_string();
    match held.free().await {
        Ok(()) => info!(%resource, "lock released"),
        Err(e) => warn!(%resource, error = %e, "lock release failed; it will expire on its own"),
    }
}
