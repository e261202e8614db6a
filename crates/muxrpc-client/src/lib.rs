//! muxrpc Client
//!
//! This crate provides the client side of muxrpc: a call multiplexer that
//! carries any number of concurrent calls over one connection, plus the dial
//! functions that establish connections.
//!
//! # Overview
//!
//! Every call is assigned a sequence number and parked in a pending table
//! before its request bytes go out; a single receive-loop task demultiplexes
//! responses back to their callers by sequence number. Responses may arrive
//! in any order.
//!
//! # Key Features
//!
//! - **Multiplexing**: unbounded concurrent calls per connection
//! - **Async and sync-style calls**: [`Client::go`] returns a [`Call`]
//!   future; [`Client::call`] awaits it in place
//! - **Deadlines and cancellation**: [`Client::call_timeout`] bounds a call;
//!   dropping an unresolved [`Call`] cancels it and late responses are
//!   discarded
//! - **Transports**: plain TCP and Unix sockets via [`dial`], HTTP CONNECT
//!   tunneling via [`dial_http`], and the `proto@addr` shorthand via
//!   [`xdial`]
//!
//! # Usage
//!
//! ```rust,no_run
//! use muxrpc_client::dial;
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Args { num1: i64, num2: i64 }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = dial("tcp", "127.0.0.1:9999", &[]).await?;
//!
//!     let sum: i64 = client.call("Foo.Sum", &Args { num1: 3, num2: 4 }).await?;
//!     assert_eq!(sum, 7);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod dial;

pub use client::{Call, Client};
pub use dial::{dial, dial_http, xdial};
