use clap::Parser;
use std::net::SocketAddr;
use tokio::io::BufReader;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use resmon::ServerError;
use resmon::client::{self, ClientExit};

/// Interactive client for the resmon server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, env = "RESMON_SERVER", default_value = "127.0.0.1:5000")]
    server: SocketAddr,
}

#[tokio::main]
async fn main() {
    // stdout carries the session; logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    println!("Connecting to {}...", args.server);

    let input = BufReader::new(tokio::io::stdin());
    let code = match client::run(args.server, input, tokio::io::stdout()).await {
        Ok(exit) => {
            debug!(?exit, "session ended");
            match exit {
                ClientExit::Refused => 1,
                _ => 0,
            }
        }
        Err(ServerError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            eprintln!("Could not connect to {}", args.server);
            1
        }
        Err(e) => {
            error!(error = %e, "client failed");
            1
        }
    };

    println!("Client stopped.");

    // a pending stdin read sits on a blocking thread and would hold the runtime open
    std::process::exit(code);
}
