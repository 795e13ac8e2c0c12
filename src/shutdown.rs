//! Connection teardown.
//!
//! Every close goes through [`close`]: mark Closing, drop the registry entry,
//! give the receiver up to the grace interval to let go of the read half, then
//! shut the socket down once and mark Closed. The receiver never calls in here.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::state::ServerState;

/// Idempotent. A caller that loses the race waits until the winner has
/// finished, so on return nothing touches the socket any more.
pub async fn close(state: &ServerState, conn: &Connection) {
    if !conn.begin_close() {
        conn.wait_closed().await;
        return;
    }

    state.registry.remove(&conn.id());

    let grace = state.config.grace_interval;
    if tokio::time::timeout(grace, conn.reader_finished()).await.is_err() {
        debug!(peer = %conn.id(), ?grace, "receiver still running after grace interval");
    }

    conn.release().await;

    info!(peer = %conn.id(), active = state.registry.count(), "connection closed");
}

/// Closes every admitted connection.
pub async fn close_all(state: &ServerState) {
    let conns: Vec<Arc<Connection>> = state.registry.snapshot();
    if conns.is_empty() {
        return;
    }

    info!(count = conns.len(), "closing all connections");
    join_all(conns.iter().map(|conn| close(state, conn))).await;
}
