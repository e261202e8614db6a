//! muxrpc Transport Layer
//!
//! This module provides body codecs and length-prefixed framing for sending
//! and receiving RPC messages over any byte stream.
//!
//! # Architecture
//!
//! - **Codec**: [`BodyCodec`] encodes and decodes headers and bodies;
//!   MessagePack is the default, JSON is also registered
//! - **Framing**: every frame is `[4-byte length prefix as u32 big-endian] +
//!   [data]`; one RPC message is a header frame immediately followed by a
//!   body frame
//!
//! # Message Size Limits
//!
//! Frames are capped at 100 MB. The cap is checked before any allocation, so
//! a corrupt or hostile length prefix cannot exhaust memory.
//!
//! # Atomicity
//!
//! [`frame::write_message`] emits the header frame, the body frame, and a
//! single flush. Callers serialize writers behind a mutex, which makes each
//! (header, body) pair indivisible on the wire.

pub mod codec;
pub mod frame;

pub use codec::BodyCodec;
pub use frame::{read_frame, read_message, write_frame, write_message, BoxedStream, RpcStream};
