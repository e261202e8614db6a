//! Typed method registry.
//!
//! A [`Service`] is a named bundle of methods. Each method is registered as
//! an async closure from a deserializable argument type to a serializable
//! reply type; the registration adapter owns decoding a fresh argument value
//! from the request body and encoding the reply, so the dispatch engine only
//! ever sees raw bytes.
//!
//! Application failures are `Err(String)`: the string travels to the caller
//! in the response header, byte for byte.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use muxrpc_common::BodyCodec;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Future returned by a method invocation: the encoded reply on success, or
/// the error string to surface in the response header.
pub type MethodFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, String>> + Send>>;

type Handler = Box<dyn Fn(BodyCodec, Vec<u8>) -> MethodFuture + Send + Sync>;

/// One registered method: the type-erased handler plus its invocation
/// counter.
pub struct MethodEntry {
    name: String,
    handler: Handler,
    num_calls: AtomicU64,
}

impl std::fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodEntry")
            .field("name", &self.name)
            .field("num_calls", &self.num_calls)
            .finish_non_exhaustive()
    }
}

impl MethodEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How many times this method has been invoked.
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }

    /// Decodes a fresh argument value from `body`, invokes the method, and
    /// encodes the reply. Counts the invocation.
    pub fn call(&self, codec: BodyCodec, body: Vec<u8>) -> MethodFuture {
        self.num_calls.fetch_add(1, Ordering::Relaxed);
        (self.handler)(codec, body)
    }
}

/// A named service: what the first half of a `"Service.Method"` string
/// resolves to.
///
/// # Example
///
/// ```
/// use muxrpc_server::Service;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Args { num1: i64, num2: i64 }
///
/// let service = Service::new("Foo")
///     .register("Sum", |args: Args| async move { Ok(args.num1 + args.num2) })
///     .register("Div", |args: Args| async move {
///         if args.num2 == 0 {
///             Err("division by zero".to_string())
///         } else {
///             Ok(args.num1 / args.num2)
///         }
///     });
///
/// assert_eq!(service.name(), "Foo");
/// assert!(service.method("Sum").is_some());
/// assert!(service.method("Mul").is_none());
/// ```
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<MethodEntry>>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), methods: HashMap::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a method under `name`.
    ///
    /// `f` takes the decoded argument value and resolves to
    /// `Result<Reply, String>`; the `Err` string becomes the response
    /// header's error field. A failure to decode the argument or encode the
    /// reply fails this one call the same way.
    pub fn register<Args, Reply, F, Fut>(mut self, name: &str, f: F) -> Self
    where
        Args: DeserializeOwned + Send + 'static,
        Reply: Serialize + Send + 'static,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, String>> + Send + 'static,
    {
        let handler: Handler = Box::new(move |codec, body| {
            let args: Args = match codec.decode(&body) {
                Ok(args) => args,
                Err(e) => {
                    let msg = format!("rpc server: read argv error: {e}");
                    return Box::pin(async move { Err(msg) });
                }
            };
            let invocation = f(args);
            Box::pin(async move {
                let reply = invocation.await?;
                codec.encode(&reply).map_err(|e| format!("rpc server: write reply error: {e}"))
            })
        });

        let entry = MethodEntry {
            name: name.to_string(),
            handler,
            num_calls: AtomicU64::new(0),
        };
        self.methods.insert(name.to_string(), Arc::new(entry));
        self
    }

    /// Looks up a method by name.
    pub fn method(&self, name: &str) -> Option<Arc<MethodEntry>> {
        self.methods.get(name).cloned()
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

    fn sum_service() -> Service {
        Service::new("Foo").register("Sum", |args: Args| async move { Ok(args.num1 + args.num2) })
    }

    #[tokio::test]
    async fn test_method_invocation() {
        let codec = BodyCodec::default();
        let service = sum_service();
        let method = service.method("Sum").unwrap();

        let body = codec.encode(&serde_json::json!({"num1": 3, "num2": 4})).unwrap();
        let reply = method.call(codec, body).await.unwrap();
        let sum: i64 = codec.decode(&reply).unwrap();

        assert_eq!(sum, 7);
        assert_eq!(method.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_application_error_becomes_string() {
        let codec = BodyCodec::default();
        let service = Service::new("Foo").register("Fail", |_: Args| async move {
            Err::<i64, _>("it broke".to_string())
        });

        let body = codec.encode(&serde_json::json!({"num1": 1, "num2": 2})).unwrap();
        let err = service.method("Fail").unwrap().call(codec, body).await.unwrap_err();
        assert_eq!(err, "it broke");
    }

    #[tokio::test]
    async fn test_argv_decode_failure_fails_the_call() {
        let codec = BodyCodec::default();
        let service = sum_service();

        // A string body where a struct is expected.
        let body = codec.encode(&"not args").unwrap();
        let err = service.method("Sum").unwrap().call(codec, body).await.unwrap_err();
        assert!(err.contains("read argv error"), "unexpected error: {err}");
    }

    #[test]
    fn test_unknown_method_lookup() {
        let service = sum_service();
        assert!(service.method("Sub").is_none());
    }
}
