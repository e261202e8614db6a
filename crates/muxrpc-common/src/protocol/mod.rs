//! muxrpc Protocol Definitions
//!
//! This module defines the core protocol types exchanged on the wire:
//!
//! - **[`Options`]**: the first, codec-independent frame of every connection,
//!   negotiating protocol identity, body codec, and timeouts
//! - **[`Header`]**: the per-message header carrying the dotted
//!   `Service.Method` name, the call's sequence number, and an error string
//!   on failed responses
//! - **[`RpcError`]**: the error type used throughout the system
//!
//! # Error Handling
//!
//! Errors reported by the peer travel as plain strings in `Header::error`
//! and are preserved byte-exactly through the codec; they resurface on the
//! caller's side as [`RpcError::Remote`]. Transport and protocol failures
//! never cross the wire — they tear the connection down instead.

pub mod error;
pub mod message;

pub use error::{Result, RpcError};
pub use message::{Header, Options, CONNECTED_STATUS_LINE, DEFAULT_RPC_PATH, MAGIC_NUMBER};
