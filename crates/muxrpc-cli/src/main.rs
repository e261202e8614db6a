//! # muxrpc CLI Entry Point
//!
//! Main binary for the muxrpc RPC system. Provides a demo server and a
//! unix-friendly one-shot caller.
//!
//! ## Usage
//!
//! ```bash
//! # Start a server with the built-in Echo service
//! muxrpc serve -b 127.0.0.1:9999
//!
//! # The same server behind an HTTP CONNECT endpoint
//! muxrpc serve -b 127.0.0.1:9999 --http
//!
//! # Make an RPC call (outputs raw JSON)
//! muxrpc call tcp@127.0.0.1:9999 Echo.Echo '{"hello": "world"}'
//! muxrpc call http@127.0.0.1:9999 Echo.Ping null
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use muxrpc_common::Options;
use muxrpc_server::{Server, Service};
use serde_json::Value;
use tokio::net::TcpListener;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// muxrpc - a small multiplexed RPC system
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Arguments for starting a muxrpc server.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a muxrpc server with the built-in Echo service
struct ServeArgs {
    /// address to bind to
    ///
    /// Defaults to "127.0.0.1:0" which assigns a random available port.
    /// The actual bound address is logged at startup.
    #[argh(option, short = 'b', default = "\"127.0.0.1:0\".into()")]
    bind: String,

    /// serve behind an HTTP CONNECT endpoint instead of plain TCP
    #[argh(switch)]
    http: bool,
}

/// Arguments for making a single RPC call.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// make one RPC call and print the JSON reply
struct CallArgs {
    /// server address in protocol@addr form, e.g. tcp@127.0.0.1:9999
    #[argh(positional)]
    addr: String,

    /// dotted Service.Method name
    #[argh(positional)]
    service_method: String,

    /// call arguments as a JSON value
    #[argh(positional, default = "\"null\".into()")]
    args: String,

    /// per-call deadline in milliseconds
    #[argh(option, default = "10000")]
    timeout_ms: u64,
}

/// The demo service registered by `muxrpc serve`.
fn echo_service() -> Service {
    Service::new("Echo")
        .register("Echo", |value: Value| async move { Ok(value) })
        .register("Ping", |_: Value| async move { Ok("pong".to_string()) })
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let server = Arc::new(Server::new());
    server.register(echo_service())?;

    let listener = TcpListener::bind(&args.bind).await?;
    tracing::info!("muxrpc server listening on {}", listener.local_addr()?);

    if args.http {
        tracing::info!("serving behind HTTP CONNECT");
        server.serve_http(listener).await?;
    } else {
        server.accept(listener).await?;
    }
    Ok(())
}

async fn run_call(args: CallArgs) -> Result<()> {
    let call_args: Value = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("invalid JSON arguments: {e}"))?;

    let client = muxrpc_client::xdial(&args.addr, &[Options::default()]).await?;
    let reply: Value = client
        .call_timeout(&args.service_method, &call_args, Duration::from_millis(args.timeout_ms))
        .await?;
    client.close().await?;

    println!("{reply}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Initialize tracing for the server; `call` keeps stdout clean for
    // piping.
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}
