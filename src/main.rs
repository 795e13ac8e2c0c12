use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use resmon::{Server, ServerConfig, SystemMetrics, shutdown};

/// Streams host CPU and memory utilization to TCP clients.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "RESMON_BIND", default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    /// Maximum number of simultaneous clients
    #[arg(short = 'n', long, env = "RESMON_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: usize,

    /// Interval between samples while monitoring, in milliseconds
    #[arg(long, env = "RESMON_SAMPLE_PERIOD_MS", default_value_t = 1500)]
    sample_period_ms: u64,

    /// Grace interval during connection teardown, in milliseconds
    #[arg(long, env = "RESMON_GRACE_MS", default_value_t = 100)]
    grace_ms: u64,

    /// Upper bound on a single accept wait, in milliseconds
    #[arg(long, env = "RESMON_ACCEPT_POLL_MS", default_value_t = 1000)]
    accept_poll_ms: u64,

    /// Time given to open sessions after the listener stops, in milliseconds
    #[arg(long, env = "RESMON_DRAIN_TIMEOUT_MS", default_value_t = 5000)]
    drain_timeout_ms: u64,

    /// A client that blocks a single write this long is dropped, in milliseconds
    #[arg(long, env = "RESMON_WRITE_TIMEOUT_MS", default_value_t = 10000)]
    write_timeout_ms: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig::new(self.bind)
            .with_max_connections(self.max_connections)
            .with_sample_period(Duration::from_millis(self.sample_period_ms))
            .with_grace_interval(Duration::from_millis(self.grace_ms))
            .with_accept_poll(Duration::from_millis(self.accept_poll_ms))
            .with_drain_timeout(Duration::from_millis(self.drain_timeout_ms))
            .with_write_timeout(Duration::from_millis(self.write_timeout_ms))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Args::parse().into_config();

    let server = Server::bind(config, Arc::new(SystemMetrics::new())).await?;

    let state = server.state();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            state.stop();
            shutdown::close_all(&state).await;
        }
    });

    server.run().await?;

    info!("server stopped");
    Ok(())
}
