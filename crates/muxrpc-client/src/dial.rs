//! Connection establishment: plain dial, HTTP CONNECT dial, and the
//! `proto@addr` shorthand.

use muxrpc_common::{
    BoxedStream, Options, Result, RpcError, CONNECTED_STATUS_LINE, DEFAULT_RPC_PATH, MAGIC_NUMBER,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::client::Client;

/// Normalizes caller-supplied options.
///
/// At most one `Options` value is accepted. The magic number is always
/// forced to [`MAGIC_NUMBER`] — callers cannot override protocol identity —
/// and an empty codec tag is filled with the default.
pub fn parse_options(opts: &[Options]) -> Result<Options> {
    match opts {
        [] => Ok(Options::default()),
        [opt] => {
            let mut opt = opt.clone();
            opt.magic_number = MAGIC_NUMBER;
            if opt.codec_type.is_empty() {
                opt.codec_type = Options::default().codec_type;
            }
            Ok(opt)
        }
        _ => Err(RpcError::InvalidRequest("number of options is more than 1".to_string())),
    }
}

/// Connects to an RPC server at the specified network address.
///
/// `network` is `"tcp"` or (on Unix) `"unix"`. The connect is bounded by the
/// options' `connect_timeout_ms`; the handshake and client construction that
/// follow are bounded by `handle_timeout_ms` (the same field that bounds
/// server-side handling — the conflation is inherited and documented in
/// DESIGN.md). On either timeout the socket is closed.
pub async fn dial(network: &str, address: &str, opts: &[Options]) -> Result<Client> {
    dial_timeout(false, network, address, opts).await
}

/// Connects to an RPC server reachable through an HTTP CONNECT endpoint,
/// then speaks the standard wire protocol on the upgraded stream.
pub async fn dial_http(network: &str, address: &str, opts: &[Options]) -> Result<Client> {
    dial_timeout(true, network, address, opts).await
}

/// Dials a server named by the general `protocol@addr` format, e.g.
/// `http@10.0.0.1:7001`, `tcp@10.0.0.1:9999`, `unix@/tmp/muxrpc.sock`.
pub async fn xdial(rpc_addr: &str, opts: &[Options]) -> Result<Client> {
    let parts: Vec<&str> = rpc_addr.split('@').collect();
    if parts.len() != 2 {
        return Err(RpcError::InvalidRequest(format!(
            "rpc client: wrong format '{rpc_addr}', expect protocol@addr"
        )));
    }
    let (protocol, addr) = (parts[0], parts[1]);
    match protocol {
        "http" => dial_http("tcp", addr, opts).await,
        _ => dial(protocol, addr, opts).await,
    }
}

async fn dial_timeout(http: bool, network: &str, address: &str, opts: &[Options]) -> Result<Client> {
    let opt = parse_options(opts)?;

    let connect = connect_stream(network, address);
    let stream = if opt.connect_timeout_ms == 0 {
        connect.await?
    } else {
        match tokio::time::timeout(opt.connect_timeout(), connect).await {
            Ok(connected) => connected?,
            Err(_) => {
                tracing::debug!("rpc client: connect to {address} timed out");
                return Err(RpcError::Timeout(opt.connect_timeout_ms));
            }
        }
    };

    // Dropping the construction future on the deadline closes the socket.
    let build = build_client(http, stream, &opt);
    if opt.handle_timeout_ms == 0 {
        build.await
    } else {
        match tokio::time::timeout(opt.handle_timeout(), build).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout(opt.handle_timeout_ms)),
        }
    }
}

async fn connect_stream(network: &str, address: &str) -> Result<BoxedStream> {
    match network {
        "tcp" => {
            let stream = TcpStream::connect(address).await?;
            Ok(Box::new(stream) as BoxedStream)
        }
        #[cfg(unix)]
        "unix" => {
            let stream = UnixStream::connect(address).await?;
            Ok(Box::new(stream) as BoxedStream)
        }
        _ => Err(RpcError::InvalidRequest(format!(
            "rpc client: unsupported network '{network}'"
        ))),
    }
}

async fn build_client(http: bool, mut stream: BoxedStream, opt: &Options) -> Result<Client> {
    if http {
        connect_upgrade(&mut stream).await?;
    }
    Client::new(stream, opt).await
}

/// Performs the CONNECT upgrade: request line out, status line back. The
/// upgrade succeeds only on the exact expected status line.
async fn connect_upgrade(stream: &mut BoxedStream) -> Result<()> {
    let request = format!("CONNECT {DEFAULT_RPC_PATH} HTTP/1.0\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    // Byte-at-a-time: nothing past the blank line may be consumed, it
    // already belongs to the wire protocol.
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= 1024 {
            return Err(RpcError::Connection("http response head too large".to_string()));
        }
        stream.read_exact(&mut byte).await?;
        head.push(byte[0]);
    }

    let status_line =
        std::str::from_utf8(&head).ok().and_then(|head| head.lines().next()).unwrap_or_default();
    if status_line != CONNECTED_STATUS_LINE {
        return Err(RpcError::Connection(format!("unexpected HTTP response: {status_line}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options_defaults() {
        let opt = parse_options(&[]).unwrap();
        assert_eq!(opt, Options::default());
    }

    #[test]
    fn test_parse_options_forces_magic() {
        let supplied = Options { magic_number: 0x1234, ..Options::default() };
        let opt = parse_options(&[supplied]).unwrap();
        assert_eq!(opt.magic_number, MAGIC_NUMBER);
    }

    #[test]
    fn test_parse_options_fills_codec() {
        let supplied = Options { codec_type: String::new(), ..Options::default() };
        let opt = parse_options(&[supplied]).unwrap();
        assert_eq!(opt.codec_type, Options::default().codec_type);
    }

    #[test]
    fn test_parse_options_rejects_more_than_one() {
        let opts = [Options::default(), Options::default()];
        assert!(matches!(parse_options(&opts), Err(RpcError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_xdial_rejects_malformed_address() {
        let err = xdial("oops", &[]).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidRequest(_)), "unexpected error: {err}");

        let err = xdial("tcp@1.2.3.4@5678", &[]).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidRequest(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_dial_rejects_unknown_network() {
        let err = dial("carrier-pigeon", "127.0.0.1:1", &[]).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidRequest(_)), "unexpected error: {err}");
    }
}
