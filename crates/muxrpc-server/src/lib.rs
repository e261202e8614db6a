//! muxrpc Server
//!
//! This crate provides the server side of muxrpc: a registry of named
//! services and the dispatch engine that serves them over multiplexed
//! connections.
//!
//! # Architecture
//!
//! The server accepts connections and spawns one task per connection. Each
//! connection negotiates a body codec through the `Options` handshake, then
//! carries any number of concurrent calls: every inbound request is handed
//! to its own handler task, and responses are written back under a
//! per-connection lock so frames from concurrent handlers never interleave.
//! Responses may therefore leave in any order; the client matches them by
//! sequence number.
//!
//! # Main Components
//!
//! - [`Service`] - a named bundle of typed methods built with
//!   [`Service::register`]
//! - [`Server`] - the dispatch engine: [`Server::register`],
//!   [`Server::accept`], [`Server::serve_http`]
//!
//! # Example
//!
//! ```no_run
//! use muxrpc_server::{Server, Service};
//! use serde::Deserialize;
//! use std::sync::Arc;
//!
//! #[derive(Deserialize)]
//! struct Args { num1: i64, num2: i64 }
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = Service::new("Foo")
//!         .register("Sum", |args: Args| async move { Ok(args.num1 + args.num2) });
//!
//!     let server = Arc::new(Server::new());
//!     server.register(service).unwrap();
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:9999").await.unwrap();
//!     server.accept(listener).await.unwrap();
//! }
//! ```

pub mod http;
pub mod server;
pub mod service;

pub use server::Server;
pub use service::{MethodEntry, Service};
