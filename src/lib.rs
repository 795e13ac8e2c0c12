//! Multi-client TCP server that streams host CPU and memory utilization.
//!
//! Each admitted connection gets a receiver task, which turns incoming lines
//! into commands, and a dispatcher task, which executes them in order and
//! streams metric samples. All teardown goes through [`shutdown::close`].
//! [`client`] is the matching interactive line client.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod provider;
pub mod receiver;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod state;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use protocol::{Command, Metric};
pub use provider::{MetricProvider, SystemMetrics};
pub use server::Server;
pub use state::ServerState;
