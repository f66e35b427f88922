//! TCP Chat Server
//!
//! Usage:
//!   tcpchat            # listen on port 8989
//!   tcpchat 2525       # listen on port 2525
//!
//! Set `RUST_LOG=tcpchat=debug` for per-connection logs and `NO_COLOR` to
//! disable ANSI highlighting.

use std::env;
use std::process;

use tcpchat::protocol::messages::{COLOR_RED, paint};
use tcpchat::{ChatConfig, ChatError, ChatServer, DEFAULT_PORT, ShutdownHandle};
use tracing::{error, info};

/// Exit status for a bad command line
const EXIT_USAGE: i32 = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let port = match parse_port(&args) {
        Ok(port) => port,
        Err(e) => {
            eprintln!("{}", e.message());
            print_usage();
            process::exit(EXIT_USAGE);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tcpchat=info")),
        )
        .init();

    let config = ChatConfig {
        colored: env::var_os("NO_COLOR").is_none(),
        ..Default::default()
    }
    .with_port(port);
    let colored = config.colored;

    let server = match ChatServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Startup failed: {}", e);
            eprintln!("ERROR -> main: {}", e);
            process::exit(1);
        }
    };

    println!("Listening on port :{}", port);

    let handle = server.shutdown_handle();
    tokio::spawn(async move {
        wait_for_signal().await;
        close_server(handle, colored).await;
    });

    server.run().await?;
    println!("{}", paint("Server has been closed...", COLOR_RED, colored));
    Ok(())
}

fn print_usage() {
    println!("[USAGE]: ./TCPChat $port");
}

/// At most one argument, the port
fn parse_port(args: &[String]) -> Result<u16, ChatError> {
    match args {
        [] | [_] => Ok(DEFAULT_PORT),
        [_, port] => port
            .parse()
            .map_err(|_| ChatError::usage(format!("Invalid port: {}", port))),
        _ => Err(ChatError::usage("Expected at most one argument")),
    }
}

async fn close_server(handle: ShutdownHandle, colored: bool) {
    println!();
    println!("{}", paint("Shutting down server...", COLOR_RED, colored));
    let notified = handle.shutdown().await;
    info!("Notified {} clients of shutdown", notified);
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let installed = (
        signal(SignalKind::hangup()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::quit()),
    );
    match installed {
        (Ok(mut hangup), Ok(mut interrupt), Ok(mut terminate), Ok(mut quit)) => {
            tokio::select! {
                _ = hangup.recv() => {}
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
                _ = quit.recv() => {}
            }
        }
        _ => {
            error!("Failed to install signal handlers, only Ctrl-C stops the server");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
