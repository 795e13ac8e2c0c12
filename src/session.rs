use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{Instrument, debug, error, info_span};

use crate::connection::Connection;
use crate::state::ServerState;
use crate::{dispatcher, receiver};

/// Runs the receiver/dispatcher pair of one admitted connection until both
/// are done. The dispatcher runs on this task, the receiver on its own.
pub async fn handle<R>(state: ServerState, conn: Arc<Connection>, reader: R)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let peer = conn.id();
    let (commands, inbox) = dispatcher::channel();

    let receiver = tokio::spawn(
        receiver::run(conn.clone(), reader, commands).instrument(info_span!("receiver", %peer)),
    );

    dispatcher::run(state, conn, inbox)
        .instrument(info_span!("dispatcher", %peer))
        .await;

    match receiver.await {
        Ok(exit) => debug!(%peer, ?exit, "receiver finished"),
        Err(e) if e.is_panic() => error!(%peer, "receiver panicked"),
        Err(_) => {}
    }
}
