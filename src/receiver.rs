use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::ServerError;
use crate::protocol::{Command, parse_command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverExit {
    /// Peer closed or reset the connection.
    Disconnected,
    /// The connection started closing.
    Closing,
    /// The dispatcher dropped its end of the command channel.
    DispatcherGone,
    /// Unexpected read error.
    Failed,
}

/// Reads lines from `reader` and queues them as commands, in arrival order.
///
/// Never closes the connection. It only stops reading once it sees the
/// closing signal, a disconnect or an error, and drops the read half on return.
pub async fn run<R>(
    conn: Arc<Connection>,
    reader: R,
    commands: UnboundedSender<Command>,
) -> ReceiverExit
where
    R: AsyncRead + Unpin,
{
    let _done = conn.reader_guard();
    let mut lines = BufReader::new(reader).lines();

    loop {
        if !conn.is_active() {
            return ReceiverExit::Closing;
        }

        let next = tokio::select! {
            biased;
            _ = conn.closing().cancelled() => return ReceiverExit::Closing,
            next = lines.next_line() => next,
        };

        match next {
            Ok(None) => {
                debug!(peer = %conn.id(), "peer closed the connection");
                return ReceiverExit::Disconnected;
            }

            Ok(Some(line)) => {
                let Some(cmd) = parse_command(&line) else {
                    continue;
                };

                debug!(peer = %conn.id(), command = ?cmd, "command received");

                if commands.send(cmd).is_err() {
                    return ReceiverExit::DispatcherGone;
                }
            }

            Err(e) => {
                let err = ServerError::from(e);

                if err.is_disconnect() {
                    debug!(peer = %conn.id(), "connection reset by peer");
                    return ReceiverExit::Disconnected;
                }

                if conn.is_active() {
                    warn!(peer = %conn.id(), error = %err, "read failed");
                }
                return ReceiverExit::Failed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Metric;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    fn conn() -> (Arc<Connection>, tokio::io::DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(64);
        let addr: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        (Connection::new(addr, ours), theirs)
    }

    #[tokio::test]
    async fn queues_normalized_commands_in_order() {
        let (conn, _w) = conn();
        let (mut client, server_side) = tokio::io::duplex(256);
        let (tx, mut rx) = mpsc::unbounded_channel();

        client.write_all(b"cpu\n\n  x \nfoo\r\n/exit\n").await.unwrap();
        drop(client);

        let exit = run(conn, server_side, tx).await;
        assert_eq!(exit, ReceiverExit::Disconnected);

        assert_eq!(rx.recv().await, Some(Command::Monitor(Metric::Cpu)));
        assert_eq!(rx.recv().await, Some(Command::Stop));
        assert_eq!(rx.recv().await, Some(Command::Unknown("FOO".into())));
        assert_eq!(rx.recv().await, Some(Command::Exit));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn exits_when_connection_starts_closing() {
        let (conn, _w) = conn();
        let (_client, server_side) = tokio::io::duplex(256);
        let (tx, _rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(conn.clone(), server_side, tx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(conn.begin_close());

        let exit = tokio::time::timeout(Duration::from_millis(200), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, ReceiverExit::Closing);

        tokio::time::timeout(Duration::from_millis(100), conn.reader_finished())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_utf8_ends_the_receiver() {
        let (conn, _w) = conn();
        let (mut client, server_side) = tokio::io::duplex(256);
        let (tx, mut rx) = mpsc::unbounded_channel();

        client.write_all(b"memory\n\xff\xfe\n").await.unwrap();

        let exit = run(conn, server_side, tx).await;
        assert_eq!(exit, ReceiverExit::Failed);
        assert_eq!(rx.recv().await, Some(Command::Monitor(Metric::Memory)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn stops_when_dispatcher_is_gone() {
        let (conn, _w) = conn();
        let (mut client, server_side) = tokio::io::duplex(256);
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        client.write_all(b"cpu\n").await.unwrap();

        let exit = run(conn, server_side, tx).await;
        assert_eq!(exit, ReceiverExit::DispatcherGone);
    }
}
