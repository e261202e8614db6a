//! The dispatch engine: accept loop, per-connection serve loop, and handler
//! tasks.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use muxrpc_common::transport::frame;
use muxrpc_common::{BodyCodec, BoxedStream, Header, Options, Result, RpcError, MAGIC_NUMBER};
use tokio::io::{split, ReadHalf, WriteHalf};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;

use crate::service::{MethodEntry, Service};

/// An RPC server: a registry of services plus the machinery to serve them
/// over multiplexed connections.
///
/// The server is shared behind an [`Arc`] so that every connection task can
/// resolve methods against the same registry.
pub struct Server {
    services: RwLock<HashMap<String, Arc<Service>>>,
}

impl Server {
    pub fn new() -> Self {
        Self { services: RwLock::new(HashMap::new()) }
    }

    /// Publishes a service under its name. Registration is first-writer-wins:
    /// a second service with the same name is an error.
    pub fn register(&self, service: Service) -> Result<()> {
        let mut services = self.services.write().unwrap();
        if services.contains_key(service.name()) {
            return Err(RpcError::InvalidRequest(format!(
                "rpc: service already defined: {}",
                service.name()
            )));
        }
        services.insert(service.name().to_string(), Arc::new(service));
        Ok(())
    }

    /// Resolves a dotted `"Service.Method"` name. The error string is what
    /// goes on the wire in the response header.
    fn find_method(&self, service_method: &str) -> std::result::Result<Arc<MethodEntry>, String> {
        let Some(dot) = service_method.rfind('.') else {
            return Err(format!("rpc server: service/method request ill-formed: {service_method}"));
        };
        let (service_name, method_name) = (&service_method[..dot], &service_method[dot + 1..]);

        let service = self
            .services
            .read()
            .unwrap()
            .get(service_name)
            .cloned()
            .ok_or_else(|| format!("rpc server: can't find service {service_name}"))?;

        service
            .method(method_name)
            .ok_or_else(|| format!("rpc server: can't find method {method_name}"))
    }

    /// Accepts connections on the listener and serves requests for each
    /// incoming connection. Returns when accepting fails.
    pub async fn accept(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer_addr) = listener
                .accept()
                .await
                .map_err(|e| RpcError::Connection(format!("rpc server: accept error: {e}")))?;
            tracing::debug!("connection established from {peer_addr}");

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                server.serve_conn(Box::new(stream)).await;
            });
        }
    }

    /// Serves one connection: handshake, then the serve loop.
    ///
    /// Handshake failures (unreadable `Options`, wrong magic, unknown codec)
    /// close the connection without sending anything.
    pub async fn serve_conn(&self, stream: BoxedStream) {
        let (mut reader, writer) = split(stream);

        let opts: Options = match frame::read_frame(&mut reader).await {
            Ok(buf) => match serde_json::from_slice(&buf) {
                Ok(opts) => opts,
                Err(e) => {
                    tracing::warn!("rpc server: options error: {e}");
                    return;
                }
            },
            Err(e) => {
                if !e.is_disconnect() {
                    tracing::warn!("rpc server: options error: {e}");
                }
                return;
            }
        };

        if opts.magic_number != MAGIC_NUMBER {
            tracing::warn!("rpc server: invalid magic number {:#x}", opts.magic_number);
            return;
        }
        let Some(codec) = BodyCodec::from_type(&opts.codec_type) else {
            tracing::warn!("rpc server: invalid codec type {}", opts.codec_type);
            return;
        };

        self.serve_codec(reader, writer, codec, opts.handle_timeout()).await;
    }

    /// The serve loop: reads requests until the stream fails, handing each
    /// one to its own handler task. Responses go out under the `sending`
    /// lock, so concurrent handlers never interleave frames.
    async fn serve_codec(
        &self,
        mut reader: ReadHalf<BoxedStream>,
        writer: WriteHalf<BoxedStream>,
        codec: BodyCodec,
        handle_timeout: Duration,
    ) {
        let sending = Arc::new(Mutex::new(writer));
        let mut handlers = JoinSet::new();

        loop {
            let (header, body) = match frame::read_message(&mut reader, &codec).await {
                Ok(message) => message,
                Err(e) => {
                    // Header-level failures leave the stream position
                    // unknown; nothing can be recovered.
                    if !e.is_disconnect() {
                        tracing::warn!("rpc server: read request error: {e}");
                    }
                    break;
                }
            };

            let method = match self.find_method(&header.service_method) {
                Ok(method) => method,
                Err(error) => {
                    // Dispatch failure is per-call: report it and keep
                    // serving the connection.
                    tracing::debug!("rpc server: {error}");
                    let header = Header { error, ..header };
                    send_response(&sending, codec, &header, &placeholder_body(codec)).await;
                    continue;
                }
            };

            handlers.spawn(handle_request(
                Arc::clone(&sending),
                codec,
                header,
                body,
                method,
                handle_timeout,
            ));
        }

        // In-flight handlers still own responses; closing before they finish
        // would truncate them.
        while handlers.join_next().await.is_some() {}
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// Placeholder body for responses that carry an error header.
fn placeholder_body(codec: BodyCodec) -> Vec<u8> {
    codec.encode(&()).unwrap_or_default()
}

/// Writes one response under the connection's send lock.
async fn send_response(
    sending: &Mutex<WriteHalf<BoxedStream>>,
    codec: BodyCodec,
    header: &Header,
    body: &[u8],
) {
    let mut writer = sending.lock().await;
    if let Err(e) = frame::write_message(&mut *writer, &codec, header, body).await {
        tracing::warn!("rpc server: write response error: {e}");
    }
}

/// Handles one request: invoke the method, then send exactly one response.
///
/// With a nonzero `handle_timeout` the invocation runs in its own task and
/// the deadline races its completion. A deadline win abandons the
/// invocation's result without cancelling the invocation; since this task is
/// the only sender for its seq, a late completion cannot produce a second
/// response frame.
async fn handle_request(
    sending: Arc<Mutex<WriteHalf<BoxedStream>>>,
    codec: BodyCodec,
    mut header: Header,
    body: Vec<u8>,
    method: Arc<MethodEntry>,
    handle_timeout: Duration,
) {
    let invocation = method.call(codec, body);

    let outcome = if handle_timeout.is_zero() {
        invocation.await
    } else {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(invocation.await);
        });
        tokio::select! {
            result = rx => match result {
                Ok(outcome) => outcome,
                Err(_) => Err("rpc server: handler task failed".to_string()),
            },
            _ = tokio::time::sleep(handle_timeout) => {
                tracing::warn!(
                    "rpc server: request handle timeout on {} (seq {})",
                    header.service_method,
                    header.seq
                );
                Err(format!("rpc server: request handle timeout: expect within {handle_timeout:?}"))
            }
        }
    };

    match outcome {
        Ok(reply) => send_response(&sending, codec, &header, &reply).await,
        Err(error) => {
            header.error = error;
            send_response(&sending, codec, &header, &placeholder_body(codec)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Args {
        num1: i64,
        num2: i64,
    }

    fn demo_server() -> Server {
        let server = Server::new();
        let service = Service::new("Foo")
            .register("Sum", |args: Args| async move { Ok(args.num1 + args.num2) });
        server.register(service).unwrap();
        server
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let server = demo_server();
        let duplicate = Service::new("Foo");
        assert!(server.register(duplicate).is_err());
    }

    #[test]
    fn test_find_method() {
        let server = demo_server();
        assert!(server.find_method("Foo.Sum").is_ok());
    }

    #[test]
    fn test_find_method_errors() {
        let server = demo_server();

        let err = server.find_method("no-dot").unwrap_err();
        assert!(err.contains("ill-formed"), "unexpected error: {err}");

        let err = server.find_method("Bar.Sum").unwrap_err();
        assert!(err.contains("can't find service Bar"), "unexpected error: {err}");

        let err = server.find_method("Foo.Sub").unwrap_err();
        assert!(err.contains("can't find method Sub"), "unexpected error: {err}");
    }

    #[test]
    fn test_find_method_splits_on_last_dot() {
        let server = Server::new();
        let service = Service::new("a.b")
            .register("c", |_: ()| async move { Ok(0i64) });
        server.register(service).unwrap();

        assert!(server.find_method("a.b.c").is_ok());
    }
}
