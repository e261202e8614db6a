//! Protocol message types: the `Options` handshake frame and the per-call
//! `Header`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::transport::codec;

/// Identifies a muxrpc connection. The server rejects any `Options` frame
/// whose magic number differs.
pub const MAGIC_NUMBER: u32 = 0x3bef5c;

/// Path requested by the CONNECT upgrade when tunneling muxrpc through an
/// HTTP endpoint.
pub const DEFAULT_RPC_PATH: &str = "/_muxrpc_";

/// Status line the server answers a CONNECT request with. The client accepts
/// the upgrade only on an exact match.
pub const CONNECTED_STATUS_LINE: &str = "HTTP/1.0 200 Connected to muxrpc";

/// Default connect timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Connection-level options, sent once by the client before any framed
/// message.
///
/// The frame is always JSON-encoded regardless of the body codec it
/// negotiates, so the server can read it before knowing the codec. All
/// timeouts are integer milliseconds; `0` means unbounded.
///
/// # Fields
///
/// - `magic_number`: must equal [`MAGIC_NUMBER`]; the dial path forces it,
///   so a caller-supplied value never reaches the wire
/// - `codec_type`: registered tag of the body codec (see
///   [`BodyCodec::from_type`](crate::BodyCodec::from_type))
/// - `connect_timeout_ms`: bound on dialing, client-side only
/// - `handle_timeout_ms`: bound on the server-side handling of one request;
///   the client also uses it to bound its own construction step after the
///   socket opens
///
/// # Example
///
/// ```
/// use muxrpc_common::{Options, MAGIC_NUMBER};
///
/// let opts = Options::default();
/// assert_eq!(opts.magic_number, MAGIC_NUMBER);
/// assert_eq!(opts.handle_timeout_ms, 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Options {
    /// Protocol identity; must equal [`MAGIC_NUMBER`]
    pub magic_number: u32,
    /// Registered tag of the body codec
    pub codec_type: String,
    /// Dial bound in milliseconds (0 = unbounded)
    pub connect_timeout_ms: u64,
    /// Per-request handling bound in milliseconds (0 = unbounded)
    pub handle_timeout_ms: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: codec::MSGPACK_TYPE.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            handle_timeout_ms: 0,
        }
    }
}

impl Options {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handle_timeout(&self) -> Duration {
        Duration::from_millis(self.handle_timeout_ms)
    }
}

/// Per-message header, carried in the negotiated body codec.
///
/// Requests and responses share this shape. `seq` is assigned by the client
/// and echoed back by the server; `error` is empty on requests and on
/// successful responses. A non-empty `error` means the call failed and the
/// body is a placeholder.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    /// Dotted `"<service>.<method>"` name of the callable
    pub service_method: String,
    /// Client-assigned sequence number identifying the call on this connection
    pub seq: u64,
    /// Empty on success; otherwise the failure reported by the peer
    pub error: String,
}

impl Header {
    /// Creates a request header for the given call.
    pub fn request(service_method: impl Into<String>, seq: u64) -> Self {
        Self { service_method: service_method.into(), seq, error: String::new() }
    }
}
