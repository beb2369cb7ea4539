// src/remote/mod.rs
//! Remote file-server access.
//!
//! The poller only sees [`Connector`] and [`RemoteFs`]; the proxy-tunnelled
//! and direct SFTP variants both implement them.

pub mod sftp;
pub mod tunnel;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SyncResult;

pub use sftp::{connector_from_config, DirectSftpConnector, ProxySftpConnector, SftpTarget};
pub use tunnel::ProxyEndpoint;

/// One directory listing entry. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFile {
    pub name: String,
    pub size: Option<u64>,
    /// Modification time, seconds since the epoch.
    pub mtime: Option<u32>,
}

impl RemoteFile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            mtime: None,
        }
    }
}

/// An open, authenticated file-transfer session.
#[async_trait]
pub trait RemoteFs: Send + Sync {
    async fn list(&self, dir: &str) -> SyncResult<Vec<RemoteFile>>;
    async fn get(&self, path: &str) -> SyncResult<Vec<u8>>;
    /// Tear the session down. Consumes the handle.
    async fn end(self: Box<Self>) -> SyncResult<()>;
}

/// Opens a fresh [`RemoteFs`] session per call.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> SyncResult<Box<dyn RemoteFs>>;
}

/// Join a remote directory and a file name with exactly one separator.
pub fn remote_join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}
