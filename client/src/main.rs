use clap::error::ErrorKind;
use clap::Parser;
use client::error::ClientError;
use client::network::{Client, ClientConfig};
use log::{debug, info};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Preferred display name
    name: String,

    /// File whose first line is the server's secret
    authfile: PathBuf,

    /// Server port
    port: u16,

    /// Server host
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    };

    // Exit directly: a pending read on stdin would otherwise keep the
    // runtime from shutting down.
    process::exit(code);
}

async fn run() -> Result<(), ClientError> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            debug!("Argument error: {}", e);
            return Err(ClientError::Usage);
        }
    };

    let secret = shared::read_secret(&args.authfile).await.map_err(|e| {
        debug!("Cannot read {}: {}", args.authfile.display(), e);
        ClientError::Usage
    })?;

    info!("Connecting to {}:{} as {}", args.host, args.port, args.name);
    let client = Client::connect(ClientConfig {
        name: args.name,
        secret,
        host: args.host,
        port: args.port,
    })
    .await?;

    client
        .run(tokio::io::stdin(), &mut tokio::io::stdout())
        .await
}
