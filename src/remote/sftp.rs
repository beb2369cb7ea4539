// src/remote/sftp.rs
//! SFTP sessions over any byte stream: a proxy tunnel or a plain TCP socket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::Disconnect;
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::tunnel::{open_tunnel, ProxyEndpoint};
use super::{Connector, RemoteFile, RemoteFs};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Where and as whom to log in.
#[derive(Clone)]
pub struct SftpTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub private_key_pem: String,
    /// SHA256 fingerprint pin (with or without the `SHA256:` prefix).
    pub host_fingerprint: Option<String>,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for SftpTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("private_key_pem", &"<redacted>")
            .field("host_fingerprint", &self.host_fingerprint)
            .finish()
    }
}

impl SftpTarget {
    pub fn from_config(cfg: &SyncConfig) -> SyncResult<Self> {
        Ok(Self {
            host: cfg.sftp_host.clone(),
            port: cfg.sftp_port,
            username: cfg.sftp_username.clone(),
            private_key_pem: cfg.private_key_pem()?,
            host_fingerprint: cfg.sftp_host_fingerprint.clone(),
            connect_timeout: cfg.connect_timeout,
        })
    }
}

struct HostKeyCheck {
    expected: Option<String>,
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let Some(expected) = &self.expected else {
            return Ok(true);
        };
        let actual = server_public_key.fingerprint();
        let ok = fingerprint_matches(expected, &actual);
        if !ok {
            tracing::error!(%actual, "sftp host key fingerprint mismatch");
        }
        Ok(ok)
    }
}

fn fingerprint_matches(expected: &str, actual: &str) -> bool {
    let strip = |s: &str| s.trim().trim_start_matches("SHA256:").trim_end_matches('=').to_string();
    strip(expected) == strip(actual)
}

/// SSH handshake, key authentication and SFTP subsystem start over `stream`.
pub async fn handshake<S>(stream: S, target: &SftpTarget) -> SyncResult<SftpClient>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let fut = async {
        let key = russh_keys::decode_secret_key(&target.private_key_pem, None)
            .map_err(|e| SyncError::Remote(format!("decoding private key: {e}")))?;

        let config = Arc::new(client::Config::default());
        let handler = HostKeyCheck {
            expected: target.host_fingerprint.clone(),
        };
        let mut handle = client::connect_stream(config, stream, handler)
            .await
            .map_err(SyncError::remote)?;

        let authenticated = handle
            .authenticate_publickey(target.username.clone(), Arc::new(key))
            .await
            .map_err(SyncError::remote)?;
        if !authenticated {
            return Err(SyncError::Remote(format!(
                "public key authentication rejected for {}",
                target.username
            )));
        }

        let channel = handle.channel_open_session().await.map_err(SyncError::remote)?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(SyncError::remote)?;
        let session = SftpSession::new(channel.into_stream())
            .await
            .map_err(SyncError::remote)?;

        Ok(SftpClient { session, handle })
    };

    match tokio::time::timeout(target.connect_timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(SyncError::Remote(format!(
            "sftp handshake with {}:{} timed out",
            target.host, target.port
        ))),
    }
}

pub struct SftpClient {
    session: SftpSession,
    handle: Handle<HostKeyCheck>,
}

#[async_trait]
impl RemoteFs for SftpClient {
    async fn list(&self, dir: &str) -> SyncResult<Vec<RemoteFile>> {
        let entries = self.session.read_dir(dir).await.map_err(SyncError::remote)?;
        Ok(entries
            .map(|e| {
                let meta = e.metadata();
                RemoteFile {
                    name: e.file_name(),
                    size: meta.size,
                    mtime: meta.mtime,
                }
            })
            .collect())
    }

    async fn get(&self, path: &str) -> SyncResult<Vec<u8>> {
        self.session.read(path).await.map_err(SyncError::remote)
    }

    async fn end(self: Box<Self>) -> SyncResult<()> {
        let closed = self.session.close().await.map_err(SyncError::remote);
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(SyncError::remote)?;
        closed
    }
}

/// SFTP through an HTTP CONNECT proxy. The hardened production path.
pub struct ProxySftpConnector {
    proxy: ProxyEndpoint,
    target: SftpTarget,
}

impl ProxySftpConnector {
    pub fn new(proxy: ProxyEndpoint, target: SftpTarget) -> Self {
        Self { proxy, target }
    }
}

#[async_trait]
impl Connector for ProxySftpConnector {
    async fn connect(&self) -> SyncResult<Box<dyn RemoteFs>> {
        let stream = open_tunnel(
            &self.proxy,
            &self.target.host,
            self.target.port,
            self.target.connect_timeout,
        )
        .await?;
        let client = handshake(stream, &self.target).await?;
        tracing::info!(host = %self.target.host, "sftp connection established via proxy");
        Ok(Box::new(client))
    }
}

/// SFTP over a direct TCP connection, for environments without the proxy.
pub struct DirectSftpConnector {
    target: SftpTarget,
}

impl DirectSftpConnector {
    pub fn new(target: SftpTarget) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Connector for DirectSftpConnector {
    async fn connect(&self) -> SyncResult<Box<dyn RemoteFs>> {
        let addr = (self.target.host.as_str(), self.target.port);
        let stream = tokio::time::timeout(self.target.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SyncError::Remote(format!("connecting to {} timed out", self.target.host)))?
            .map_err(|e| SyncError::Remote(format!("connecting to {}: {e}", self.target.host)))?;
        let client = handshake(stream, &self.target).await?;
        tracing::info!(host = %self.target.host, "sftp connection established");
        Ok(Box::new(client))
    }
}

/// Pick the proxy variant when a proxy is configured, else the direct one.
pub fn connector_from_config(cfg: &SyncConfig) -> SyncResult<Box<dyn Connector>> {
    let target = SftpTarget::from_config(cfg)?;
    match cfg.http_proxy.as_deref() {
        Some(url) => Ok(Box::new(ProxySftpConnector::new(ProxyEndpoint::parse(url)?, target))),
        None => {
            tracing::warn!("HTTP_PROXY not set; connecting to the sftp host directly");
            Ok(Box::new(DirectSftpConnector::new(target)))
        }
    }
}
