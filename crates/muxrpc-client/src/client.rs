//! The call multiplexer.
//!
//! One connection, many in-flight calls. The send path serializes request
//! frames behind the write lock; a single receive-loop task owns the read
//! half and routes each response to its pending call by sequence number.
//!
//! Locking: `state` (pending table + lifecycle flags) is strictly narrower
//! than `writer` (the send lock) and is never held across an await. The two
//! are held together only in `terminate_calls`, writer first.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use muxrpc_common::transport::frame;
use muxrpc_common::{BodyCodec, BoxedStream, Header, Options, Result, RpcError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{split, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{oneshot, Notify};

/// A muxrpc client bound to one connection.
///
/// Cheap to clone; clones share the connection and its pending-call table.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

struct ClientInner {
    codec: BodyCodec,
    /// Send lock: request frames are atomic on the wire because every writer
    /// goes through here.
    writer: tokio::sync::Mutex<WriteHalf<BoxedStream>>,
    /// Pending table and lifecycle flags.
    state: Mutex<ClientState>,
    /// Wakes the receive loop when the user closes the client.
    close_notify: Notify,
}

struct ClientState {
    /// Next sequence number; strictly monotonically increasing, never 0.
    seq: u64,
    pending: HashMap<u64, PendingCall>,
    /// User-initiated close.
    closing: bool,
    /// Fatal protocol or transport error.
    shutdown: bool,
}

struct PendingCall {
    service_method: String,
    tx: oneshot::Sender<Result<Vec<u8>>>,
}

/// One in-flight call, resolving to the decoded reply.
///
/// Dropping an unresolved `Call` cancels it: the pending entry is removed
/// (idempotently), and if the response arrives later the receive loop reads
/// its body and discards it. The pending table is the single point of truth
/// for whether a sequence number is still live.
pub struct Call<R> {
    client: Arc<ClientInner>,
    seq: u64,
    rx: oneshot::Receiver<Result<Vec<u8>>>,
    codec: BodyCodec,
    finished: bool,
    _reply: PhantomData<fn() -> R>,
}

impl<R> Call<R> {
    fn new(client: &Arc<ClientInner>, seq: u64, rx: oneshot::Receiver<Result<Vec<u8>>>) -> Self {
        Self {
            client: Arc::clone(client),
            seq,
            rx,
            codec: client.codec,
            finished: false,
            _reply: PhantomData,
        }
    }
}

impl<R: DeserializeOwned> Future for Call<R> {
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(completed) => {
                this.finished = true;
                let outcome = match completed {
                    Ok(Ok(body)) => this.codec.decode(&body),
                    Ok(Err(e)) => Err(e),
                    // The completion slot vanished without firing: the
                    // client went away underneath us.
                    Err(_) => Err(RpcError::Shutdown),
                };
                Poll::Ready(outcome)
            }
        }
    }
}

impl<R> Drop for Call<R> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.client.state.lock().unwrap().pending.remove(&self.seq);
    }
}

impl Client {
    /// Builds a client on an established stream: sends the `Options` frame
    /// and spawns the receive loop.
    ///
    /// Most callers want [`dial`](crate::dial::dial) instead; this is the
    /// entry point for custom transports.
    pub async fn new(stream: BoxedStream, opts: &Options) -> Result<Client> {
        let codec = BodyCodec::from_type(&opts.codec_type).ok_or_else(|| {
            RpcError::InvalidRequest(format!("rpc client: invalid codec type {}", opts.codec_type))
        })?;

        let (reader, mut writer) = split(stream);

        // The Options frame is always JSON, before any codec traffic.
        let options_frame = serde_json::to_vec(opts)?;
        frame::write_frame(&mut writer, &options_frame).await?;
        writer.flush().await?;

        let inner = Arc::new(ClientInner {
            codec,
            writer: tokio::sync::Mutex::new(writer),
            state: Mutex::new(ClientState {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
            close_notify: Notify::new(),
        });

        tokio::spawn(receive_loop(reader, Arc::clone(&inner)));

        Ok(Client { inner })
    }

    /// Starts a call without waiting for its response.
    ///
    /// The call is registered in the pending table before any request byte
    /// is written, so the receive loop can match the response the moment the
    /// peer can produce one. Failures to enqueue or send complete the
    /// returned [`Call`] immediately with the error.
    pub async fn go<A, R>(&self, service_method: &str, args: &A) -> Call<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let (tx, rx) = oneshot::channel();

        let body = match self.inner.codec.encode(args) {
            Ok(body) => body,
            Err(e) => {
                let _ = tx.send(Err(e));
                return Call::new(&self.inner, 0, rx);
            }
        };

        let seq = {
            let mut state = self.inner.state.lock().unwrap();
            if state.closing || state.shutdown {
                let _ = tx.send(Err(RpcError::Shutdown));
                return Call::new(&self.inner, 0, rx);
            }
            let seq = state.seq;
            state.seq += 1;
            state
                .pending
                .insert(seq, PendingCall { service_method: service_method.to_string(), tx });
            seq
        };

        let header = Header::request(service_method, seq);
        let mut writer = self.inner.writer.lock().await;
        if let Err(e) = frame::write_message(&mut *writer, &self.inner.codec, &header, &body).await
        {
            drop(writer);
            // The entry may already be gone: a concurrent response or a
            // termination won the race and owns completion.
            if let Some(call) = self.inner.state.lock().unwrap().pending.remove(&seq) {
                let _ = call.tx.send(Err(e));
            }
            // A stream that failed a write is done for; stop the receive
            // loop so the remaining pending calls fail instead of hanging.
            self.inner.close_notify.notify_one();
        }

        Call::new(&self.inner, seq, rx)
    }

    /// Makes a call and waits for its reply.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        self.go(service_method, args).await.await
    }

    /// Makes a call bounded by a deadline.
    ///
    /// A deadline hit cancels the call: its pending entry is removed, a late
    /// response is discarded on arrival, and [`RpcError::Timeout`] is
    /// returned. The request itself cannot be recalled once written.
    pub async fn call_timeout<A, R>(
        &self,
        service_method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let call = self.go(service_method, args).await;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Closes the client. Outstanding calls complete with an error; further
    /// enqueues are refused. A second close returns [`RpcError::Shutdown`].
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.closing {
                return Err(RpcError::Shutdown);
            }
            state.closing = true;
        }

        // Stop the receive loop first, then let the peer see EOF.
        self.inner.close_notify.notify_one();
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;
        Ok(())
    }

    /// True while the client can still enqueue calls: neither closed by the
    /// user nor shut down by a fatal error.
    pub fn is_available(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        !state.closing && !state.shutdown
    }
}

/// The receive loop: the single reader of this connection.
///
/// Each response removes its pending entry before the completion fires, so a
/// completion is delivered exactly once. A response whose seq has no entry
/// belongs to a cancelled call; its body has already been consumed by the
/// message read, keeping the stream in sync.
async fn receive_loop(mut reader: ReadHalf<BoxedStream>, inner: Arc<ClientInner>) {
    let err = loop {
        let message = tokio::select! {
            message = frame::read_message(&mut reader, &inner.codec) => message,
            _ = inner.close_notify.notified() => break RpcError::Shutdown,
        };
        let (header, body) = match message {
            Ok(message) => message,
            Err(e) => break e,
        };

        let call = inner.state.lock().unwrap().pending.remove(&header.seq);
        match call {
            None => {
                tracing::debug!("rpc client: dropping response for unknown seq {}", header.seq);
            }
            Some(call) if !header.error.is_empty() => {
                let _ = call.tx.send(Err(RpcError::Remote(header.error)));
            }
            Some(call) => {
                let _ = call.tx.send(Ok(body));
            }
        }
    };

    terminate_calls(&inner, err).await;
}

/// Fails every pending call after the connection dies. Takes the send lock
/// before the state lock so no new call can slip its request out while the
/// table drains.
async fn terminate_calls(inner: &ClientInner, err: RpcError) {
    let _writer = inner.writer.lock().await;
    let mut state = inner.state.lock().unwrap();
    state.shutdown = true;

    let user_closed = state.closing;
    if !user_closed && !err.is_disconnect() {
        tracing::warn!("rpc client: receive loop terminated: {err}");
    }

    for (_, call) in state.pending.drain() {
        let completion = if user_closed && err.is_disconnect() {
            RpcError::Shutdown
        } else {
            RpcError::Connection(format!(
                "rpc client: call {} aborted: {err}",
                call.service_method
            ))
        };
        let _ = call.tx.send(Err(completion));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxrpc_common::transport::frame::{read_frame, read_message, write_message};

    /// A client talking to an in-memory peer.
    async fn duplex_client() -> (Client, tokio::io::DuplexStream) {
        let (local, remote) = tokio::io::duplex(4096);
        let client =
            Client::new(Box::new(local) as BoxedStream, &Options::default()).await.unwrap();
        (client, remote)
    }

    #[tokio::test]
    async fn test_response_for_unknown_seq_is_dropped() {
        let (client, mut remote) = duplex_client().await;
        let codec = client.inner.codec;

        let peer = tokio::spawn(async move {
            read_frame(&mut remote).await.unwrap(); // options
            let (header, _) = read_message(&mut remote, &codec).await.unwrap();

            // A response nobody asked for: the loop must read its body and
            // move on, or the real response below would never line up.
            let stray = Header::request(&header.service_method, header.seq + 100);
            let stray_body = codec.encode(&0i64).unwrap();
            write_message(&mut remote, &codec, &stray, &stray_body).await.unwrap();

            let reply = codec.encode(&99i64).unwrap();
            write_message(&mut remote, &codec, &header, &reply).await.unwrap();
        });

        let value: i64 = client.call("Echo.Value", &1i64).await.unwrap();
        assert_eq!(value, 99);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_error_header_completes_call() {
        let (client, mut remote) = duplex_client().await;
        let codec = client.inner.codec;

        let peer = tokio::spawn(async move {
            read_frame(&mut remote).await.unwrap();
            let (mut header, _) = read_message(&mut remote, &codec).await.unwrap();
            header.error = "rpc server: can't find service Echo".to_string();
            let placeholder = codec.encode(&()).unwrap();
            write_message(&mut remote, &codec, &header, &placeholder).await.unwrap();
            remote
        });

        let err = client.call::<_, i64>("Echo.Value", &1i64).await.unwrap_err();
        match err {
            RpcError::Remote(message) => {
                assert_eq!(message, "rpc server: can't find service Echo")
            }
            other => panic!("expected Remote, got {other:?}"),
        }

        // A per-call failure does not poison the client. The peer's stream
        // is still alive here, so this is not racing an EOF.
        let _remote = peer.await.unwrap();
        assert!(client.is_available());
    }

    #[tokio::test]
    async fn test_eof_terminates_pending_calls() {
        let (client, remote) = duplex_client().await;

        let call = client.go::<_, i64>("Echo.Value", &1i64).await;
        drop(remote);

        let err = call.await.unwrap_err();
        assert!(matches!(err, RpcError::Connection(_)), "unexpected error: {err}");
        assert!(!client.is_available());
    }

    #[tokio::test]
    async fn test_seq_is_strictly_monotonic() {
        let (client, mut remote) = duplex_client().await;
        let codec = client.inner.codec;

        let reader = tokio::spawn(async move {
            read_frame(&mut remote).await.unwrap();
            let mut seqs = Vec::new();
            for _ in 0..3 {
                let (header, _) = read_message(&mut remote, &codec).await.unwrap();
                seqs.push(header.seq);
            }
            seqs
        });

        let a = client.go::<_, i64>("Echo.Value", &1i64).await;
        let b = client.go::<_, i64>("Echo.Value", &2i64).await;
        let c = client.go::<_, i64>("Echo.Value", &3i64).await;

        let seqs = reader.await.unwrap();
        assert_eq!(seqs, vec![1, 2, 3]);
        drop((a, b, c));
    }
}
