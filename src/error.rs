// src/error.rs
use thiserror::Error;

/// Every failure the sync engine can surface.
///
/// Variants carry plain messages so that failures coming out of transport,
/// SSH or database libraries (some of which hand back opaque values) reach
/// the poller and the logs in one normalized shape.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The CONNECT request never got an answer (proxy unreachable, reset, timeout).
    #[error("proxy connect failed: {0}")]
    ProxyConnect(String),

    /// The proxy answered the CONNECT request with a non-2xx status.
    #[error("proxy CONNECT rejected with status {status}: {reason}")]
    ProxyTunnel { status: u16, reason: String },

    /// SSH handshake, authentication, listing or download failure.
    #[error("remote file transfer error: {0}")]
    Remote(String),

    /// Artifact content could not be turned into records.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("scheduler error: {0}")]
    Schedule(String),
}

impl SyncError {
    /// Connection-layer failures are retried by the poller; everything else
    /// aborts the run.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::ProxyConnect(_) | SyncError::ProxyTunnel { .. } | SyncError::Remote(_)
        )
    }

    pub fn remote(err: impl std::fmt::Display) -> Self {
        SyncError::Remote(err.to_string())
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        SyncError::Store(err.to_string())
    }

    pub fn parse(err: impl std::fmt::Display) -> Self {
        SyncError::Parse(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
