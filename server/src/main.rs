use clap::error::ErrorKind;
use clap::Parser;
use log::{debug, error, info};
use server::network::{ChatServer, ServerConfig};
use shared::OUTBOUND_CAPACITY;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

const USAGE: &str = "Usage: server authfile [port]";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File whose first line is the secret clients must present
    authfile: PathBuf,

    /// Port to listen on, 0 picks a free one
    #[arg(default_value = "0")]
    port: u16,

    /// Address to bind to
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,

    /// Pause after each chat command a session sends, in milliseconds
    #[arg(long, default_value = "100")]
    throttle_ms: u64,

    /// Lines queued for a client before it is disconnected as not reading
    #[arg(long, default_value_t = OUTBOUND_CAPACITY)]
    queue_lines: usize,
}

/// Parses arguments, binds the listener and serves until Ctrl+C.
///
/// Exit status is 1 for bad arguments or an unreadable auth file and 2 if
/// the port cannot be bound.
#[tokio::main]
async fn main() {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            debug!("Argument error: {}", e);
            eprintln!("{}", USAGE);
            process::exit(1);
        }
    };

    let secret = match shared::read_secret(&args.authfile).await {
        Ok(secret) => secret,
        Err(e) => {
            debug!("Cannot read {}: {}", args.authfile.display(), e);
            eprintln!("{}", USAGE);
            process::exit(1);
        }
    };

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        secret,
        throttle: Duration::from_millis(args.throttle_ms),
        outbound_capacity: args.queue_lines,
    };

    let server = match ChatServer::bind(config).await {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!("{}", e);
            eprintln!("Communications error");
            process::exit(2);
        }
    };

    match server.local_addr() {
        Ok(addr) => eprintln!("{}", addr.port()),
        Err(e) => {
            error!("Listener has no local address: {}", e);
            eprintln!("Communications error");
            process::exit(2);
        }
    }

    #[cfg(unix)]
    spawn_stats_dumper(Arc::clone(&server));

    tokio::select! {
        _ = Arc::clone(&server).run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }
}

/// Writes the stats report to stderr every time the process gets SIGHUP.
#[cfg(unix)]
fn spawn_stats_dumper(server: Arc<ChatServer>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Cannot listen for SIGHUP, stats dumps disabled: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            let report = server.dump_stats().await;
            eprint!("{}", report);
        }
    });
}
