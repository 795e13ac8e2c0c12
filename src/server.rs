use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::protocol;
use crate::provider::MetricProvider;
use crate::shutdown;
use crate::state::ServerState;

pub struct Server {
    listener: TcpListener,
    state: ServerState,
    sessions: TaskTracker,
}

impl Server {
    pub async fn bind(config: ServerConfig, provider: Arc<dyn MetricProvider>) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address).await?;

        Ok(Self {
            listener,
            state: ServerState::new(config, provider),
            sessions: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for stopping the server from outside the accept loop.
    pub fn state(&self) -> ServerState {
        self.state.clone()
    }

    /// Accepts connections until the running flag is cleared, then drains.
    pub async fn run(self) -> Result<()> {
        let poll = self.state.config.accept_poll;

        info!(
            addr = %self.local_addr()?,
            limit = self.state.registry.capacity(),
            "listening"
        );

        while self.state.is_running() {
            let accepted = match tokio::time::timeout(poll, self.listener.accept()).await {
                Ok(accepted) => accepted,
                // re-check the running flag
                Err(_) => continue,
            };

            match accepted {
                Ok((socket, peer)) => {
                    if !self.state.is_running() {
                        debug!(%peer, "dropping connection accepted during shutdown");
                        break;
                    }
                    self.admit(socket, peer).await;
                }
                Err(e) => {
                    if self.state.is_running() {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        }

        info!("listener stopped");
        self.drain().await;

        Ok(())
    }

    async fn admit(&self, socket: TcpStream, peer: SocketAddr) {
        let (reader, writer) = socket.into_split();
        let conn = Connection::with_write_timeout(peer, writer, self.state.config.write_timeout);

        if !self.state.registry.try_admit(conn.clone()) {
            warn!(
                %peer,
                limit = self.state.registry.capacity(),
                "connection refused: limit reached"
            );
            drop(reader);
            refuse(&conn).await;
            return;
        }

        info!(%peer, active = self.state.registry.count(), "connection established");

        self.sessions.spawn(
            crate::session::handle(self.state.clone(), conn, reader)
                .instrument(info_span!("session", %peer)),
        );
    }

    /// Gives sessions the drain timeout to finish on their own, then closes
    /// whatever is left.
    async fn drain(&self) {
        self.sessions.close();

        let timeout = self.state.config.drain_timeout;
        if tokio::time::timeout(timeout, self.sessions.wait()).await.is_ok() {
            info!("all sessions ended");
            return;
        }

        warn!(
            remaining = self.state.registry.count(),
            ?timeout,
            "drain timed out, closing remaining connections"
        );
        shutdown::close_all(&self.state).await;
        self.sessions.wait().await;
    }
}

/// Sends the refusal line and closes a connection that never got a session.
async fn refuse(conn: &Connection) {
    if let Err(e) = conn.send(protocol::REFUSED).await {
        debug!(peer = %conn.id(), error = %e, "could not deliver refusal");
    }

    if conn.begin_close() {
        conn.release().await;
    }
}
