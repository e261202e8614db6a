//! HTTP CONNECT endpoint.
//!
//! Lets muxrpc share a port with an HTTP listener: a client sends
//! `CONNECT /_muxrpc_ HTTP/1.0`, the server answers with a fixed
//! `200 Connected` status line, and from then on the raw stream carries the
//! standard wire protocol. The exchange is parsed by hand on the raw socket
//! because the hand-off must leave the stream untouched past the blank line
//! ending the request head.

use std::sync::Arc;

use muxrpc_common::{Result, RpcError, CONNECTED_STATUS_LINE, DEFAULT_RPC_PATH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::server::Server;

/// Cap on the CONNECT request head.
const MAX_HEAD_SIZE: usize = 8 * 1024;

impl Server {
    /// Accepts connections on the listener and serves each one as an HTTP
    /// CONNECT upgrade into the wire protocol. Returns when accepting fails.
    ///
    /// Non-CONNECT requests get a `405` and the connection is closed.
    pub async fn serve_http(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer_addr) = listener
                .accept()
                .await
                .map_err(|e| RpcError::Connection(format!("rpc server: accept error: {e}")))?;
            tracing::debug!("http connection established from {peer_addr}");

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.serve_http_conn(stream).await {
                    if !e.is_disconnect() {
                        tracing::debug!("rpc server: http upgrade error: {e}");
                    }
                }
            });
        }
    }

    async fn serve_http_conn(&self, mut stream: TcpStream) -> Result<()> {
        let head = read_request_head(&mut stream).await?;
        let request_line = head.lines().next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default();
        let path = parts.next().unwrap_or_default();

        if method != "CONNECT" {
            let response = "HTTP/1.0 405 Method Not Allowed\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n405 must CONNECT\n";
            stream.write_all(response.as_bytes()).await?;
            return Ok(());
        }
        if path != DEFAULT_RPC_PATH {
            tracing::debug!("rpc server: CONNECT to unexpected path {path}");
        }

        stream.write_all(format!("{CONNECTED_STATUS_LINE}\r\n\r\n").as_bytes()).await?;
        stream.flush().await?;

        self.serve_conn(Box::new(stream)).await;
        Ok(())
    }
}

/// Reads the request head up to and including the blank line. Byte-at-a-time
/// so nothing past the head is consumed.
async fn read_request_head(stream: &mut TcpStream) -> Result<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_HEAD_SIZE {
            return Err(RpcError::InvalidRequest("http request head too large".to_string()));
        }
        stream.read_exact(&mut byte).await?;
        head.push(byte[0]);
    }

    String::from_utf8(head)
        .map_err(|e| RpcError::InvalidRequest(format!("http request head not utf-8: {e}")))
}
