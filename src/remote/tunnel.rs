// src/remote/tunnel.rs
//! HTTP CONNECT tunnelling through a forward proxy.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use crate::error::{SyncError, SyncResult};

pub const DEFAULT_PROXY_PORT: u16 = 3128;

/// Upper bound on the proxy's response head.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    /// Value for `Proxy-Authorization`, when the URL carries credentials.
    pub authorization: Option<String>,
}

impl ProxyEndpoint {
    /// Parse `http://[user:pass@]host[:port]`. Missing port defaults to 3128.
    pub fn parse(proxy_url: &str) -> SyncResult<Self> {
        let url = Url::parse(proxy_url.trim())
            .map_err(|e| SyncError::Config(format!("invalid proxy url {proxy_url:?}: {e}")))?;
        if url.scheme() != "http" {
            return Err(SyncError::Config(format!(
                "unsupported proxy scheme {:?}; only http:// proxies can be tunnelled",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| SyncError::Config(format!("proxy url {proxy_url:?} has no host")))?
            .to_string();
        let authorization = if url.username().is_empty() {
            None
        } else {
            let creds = format!("{}:{}", url.username(), url.password().unwrap_or_default());
            Some(format!("Basic {}", STANDARD.encode(creds)))
        };
        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PROXY_PORT),
            authorization,
        })
    }
}

/// Open a raw duplex stream to `target_host:target_port` through the proxy.
///
/// Transport failures become [`SyncError::ProxyConnect`]; a non-2xx answer
/// becomes [`SyncError::ProxyTunnel`] with the status code.
pub async fn open_tunnel(
    proxy: &ProxyEndpoint,
    target_host: &str,
    target_port: u16,
    timeout: Duration,
) -> SyncResult<TcpStream> {
    tracing::info!(
        proxy = %format!("{}:{}", proxy.host, proxy.port),
        target = %format!("{target_host}:{target_port}"),
        "opening proxy tunnel"
    );
    match tokio::time::timeout(timeout, connect_and_handshake(proxy, target_host, target_port)).await {
        Ok(res) => res,
        Err(_) => Err(SyncError::ProxyConnect(format!(
            "no tunnel to {target_host}:{target_port} within {}s",
            timeout.as_secs()
        ))),
    }
}

async fn connect_and_handshake(
    proxy: &ProxyEndpoint,
    target_host: &str,
    target_port: u16,
) -> SyncResult<TcpStream> {
    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port))
        .await
        .map_err(|e| SyncError::ProxyConnect(format!("{}:{}: {e}", proxy.host, proxy.port)))?;

    let authority = format!("{target_host}:{target_port}");
    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(auth) = &proxy.authorization {
        request.push_str(&format!("Proxy-Authorization: {auth}\r\n"));
    }
    request.push_str("\r\n");

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| SyncError::ProxyConnect(format!("writing CONNECT: {e}")))?;

    let head = read_response_head(&mut stream).await?;
    let (status, reason) = parse_status_line(&head)?;
    if !(200..300).contains(&status) {
        tracing::error!(status, reason = %reason, "proxy refused CONNECT");
        return Err(SyncError::ProxyTunnel { status, reason });
    }
    tracing::info!(status, "proxy tunnel established");
    Ok(stream)
}

/// Read up to and including the blank line that ends the response head.
///
/// Reads byte by byte: anything after the head belongs to the tunnelled
/// protocol and must stay in the socket.
async fn read_response_head(stream: &mut TcpStream) -> SyncResult<String> {
    let mut buf = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| SyncError::ProxyConnect(format!("reading CONNECT response: {e}")))?;
        if n == 0 {
            return Err(SyncError::ProxyConnect(
                "proxy closed the connection before answering CONNECT".into(),
            ));
        }
        buf.push(byte[0]);
        if buf.len() > MAX_RESPONSE_HEAD {
            return Err(SyncError::ProxyConnect("CONNECT response head too large".into()));
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn parse_status_line(head: &str) -> SyncResult<(u16, String)> {
    let line = head.lines().next().unwrap_or_default();
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(SyncError::ProxyConnect(format!(
            "malformed CONNECT response: {line:?}"
        )));
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| SyncError::ProxyConnect(format!("malformed CONNECT status: {line:?}")))?;
    Ok((status, parts.next().unwrap_or_default().trim().to_string()))
}
