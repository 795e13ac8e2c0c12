//! Interactive client.
//!
//! Prints every server line with a local timestamp and forwards input lines,
//! uppercased, as commands. The session ends on one of the server's terminal
//! notices, when the server goes away, or when input runs out.

use chrono::Local;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Result, ServerError};
use crate::protocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// The server was at its connection limit.
    Refused,
    /// This or another client sent `/SHUTDOWN`.
    ServerShutdown,
    /// The server confirmed `/EXIT`.
    Closed,
    /// The connection ended without a notice.
    Disconnected,
    /// Input reached EOF.
    InputClosed,
}

fn terminal_notice(line: &str) -> Option<ClientExit> {
    if line == protocol::REFUSED.trim_end() {
        Some(ClientExit::Refused)
    } else if line == protocol::SHUTTING_DOWN.trim_end() {
        Some(ClientExit::ServerShutdown)
    } else if line == protocol::CLOSED.trim_end() {
        Some(ClientExit::Closed)
    } else {
        None
    }
}

/// `[2026-01-31 12:00:00] line`
pub fn stamp(line: &str) -> String {
    format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), line)
}

/// Runs one session against `addr`, reading commands from `input` and
/// writing stamped server lines to `output`.
pub async fn run<I, O>(addr: SocketAddr, input: I, mut output: O) -> Result<ClientExit>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();

    let mut server = BufReader::new(reader).lines();
    let mut input = input.lines();

    loop {
        tokio::select! {
            line = server.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    output.write_all(stamp(line).as_bytes()).await?;
                    output.flush().await?;

                    if let Some(exit) = terminal_notice(line) {
                        return Ok(exit);
                    }
                }
                Ok(None) => return Ok(ClientExit::Disconnected),
                Err(e) => return quiet_disconnect(e),
            },

            cmd = input.next_line() => match cmd? {
                Some(cmd) => {
                    let cmd = cmd.trim().to_uppercase();
                    if cmd.is_empty() {
                        continue;
                    }

                    debug!(command = %cmd, "sending");
                    if let Err(e) = writer.write_all(format!("{}\n", cmd).as_bytes()).await {
                        return quiet_disconnect(e);
                    }
                }
                None => return Ok(ClientExit::InputClosed),
            },
        }
    }
}

/// Resets and broken pipes end the session silently; anything else is an error.
fn quiet_disconnect(e: std::io::Error) -> Result<ClientExit> {
    let err = ServerError::from(e);
    if err.is_disconnect() {
        Ok(ClientExit::Disconnected)
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_end_the_session() {
        assert_eq!(terminal_notice(protocol::REFUSED.trim_end()), Some(ClientExit::Refused));
        assert_eq!(
            terminal_notice(protocol::SHUTTING_DOWN.trim_end()),
            Some(ClientExit::ServerShutdown)
        );
        assert_eq!(terminal_notice(protocol::CLOSED.trim_end()), Some(ClientExit::Closed));
        assert_eq!(terminal_notice("CPU: 12.5%"), None);
    }

    #[test]
    fn stamp_prefixes_local_time() {
        let line = stamp("CPU: 12.5%");
        assert!(line.ends_with("] CPU: 12.5%\n"));
        assert!(
            chrono::NaiveDateTime::parse_from_str(&line[1..20], "%Y-%m-%d %H:%M:%S").is_ok(),
            "bad stamp in {:?}",
            line
        );
    }

    #[test]
    fn reset_is_a_quiet_disconnect() {
        let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert_eq!(quiet_disconnect(reset).unwrap(), ClientExit::Disconnected);

        let other = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(quiet_disconnect(other).is_err());
    }
}
