//! muxrpc Common Types and Transport
//!
//! This crate provides the protocol definitions, codecs and wire framing for
//! the muxrpc RPC system.
//!
//! # Overview
//!
//! muxrpc is a small multiplexed RPC system: one connection carries many
//! in-flight calls at once, each identified by a client-assigned sequence
//! number. This crate contains the pieces shared by the client and server:
//!
//! - **Protocol Layer**: `Header` and `Options` message types, error handling
//! - **Transport Layer**: body codecs and length-prefixed framing over any
//!   byte stream
//!
//! # Wire Format
//!
//! Every connection starts with a single JSON-encoded `Options` frame that
//! negotiates the body codec. Everything after it is (header, body) pairs in
//! the negotiated codec, each as a length-prefixed frame:
//!
//! ```text
//! [4-byte length as u32 big-endian] [data]
//! ```
//!
//! # Example
//!
//! ```
//! use muxrpc_common::{BodyCodec, Header};
//!
//! let codec = BodyCodec::default();
//! let header = Header::request("Foo.Sum", 1);
//!
//! let encoded = codec.encode(&header).unwrap();
//! let decoded: Header = codec.decode(&encoded).unwrap();
//! assert_eq!(header, decoded);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::error::{Result, RpcError};
pub use protocol::message::{Header, Options, CONNECTED_STATUS_LINE, DEFAULT_RPC_PATH, MAGIC_NUMBER};
pub use transport::codec::BodyCodec;
pub use transport::frame::{BoxedStream, RpcStream};
