use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{Result, ServerError};

type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Monotonic: Active -> Closing -> Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    Closing,
    Closed,
}

/// One admitted client session.
///
/// The write half lives here so that only the shutdown path can close it.
/// The read half is owned by the receiver task, which drops it as soon as it
/// observes `closing`.
pub struct Connection {
    id: SocketAddr,
    state: Mutex<LifecycleState>,
    writer: tokio::sync::Mutex<Option<BoxWriter>>,
    write_timeout: Duration,
    closing: CancellationToken,
    closed: CancellationToken,
    reader_done: CancellationToken,
}

impl Connection {
    pub fn new<W>(id: SocketAddr, writer: W) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_write_timeout(id, writer, DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_write_timeout<W>(id: SocketAddr, writer: W, write_timeout: Duration) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Arc::new(Self {
            id,
            state: Mutex::new(LifecycleState::Active),
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            write_timeout,
            closing: CancellationToken::new(),
            closed: CancellationToken::new(),
            reader_done: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> SocketAddr {
        self.id
    }

    pub fn state(&self) -> LifecycleState {
        *self.lock_state()
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    /// Fires once the connection leaves Active.
    pub fn closing(&self) -> &CancellationToken {
        &self.closing
    }

    /// Writes `msg` unless the connection is already shutting down.
    ///
    /// The writer lock is held for the duration of one write. That write is
    /// bounded twice: it races the closing signal, so teardown never waits on
    /// a stalled peer, and it fails with [`ServerError::WriteTimeout`] once
    /// `write_timeout` passes, so a client that stops reading cannot pin the
    /// dispatcher.
    pub async fn send(&self, msg: &str) -> Result<()> {
        if !self.is_active() {
            return Err(ServerError::ConnectionClosed);
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ServerError::ConnectionClosed)?;

        tokio::select! {
            biased;
            _ = self.closing.cancelled() => Err(ServerError::ConnectionClosed),
            res = tokio::time::timeout(self.write_timeout, writer.write_all(msg.as_bytes())) => {
                match res {
                    Ok(written) => written.map_err(ServerError::from),
                    Err(_) => Err(ServerError::WriteTimeout),
                }
            }
        }
    }

    /// Held by the receiver for as long as it owns the read half.
    pub fn reader_guard(&self) -> DropGuard {
        self.reader_done.clone().drop_guard()
    }

    pub async fn reader_finished(&self) {
        self.reader_done.cancelled().await
    }

    /// Active -> Closing. Only the caller that gets `true` may go on to
    /// `release` the socket.
    pub(crate) fn begin_close(&self) -> bool {
        let mut state = self.lock_state();
        if *state != LifecycleState::Active {
            return false;
        }
        *state = LifecycleState::Closing;
        self.closing.cancel();
        true
    }

    /// Shuts down and drops the write half, then marks the connection Closed.
    pub(crate) async fn release(&self) {
        let writer = self.writer.lock().await.take();

        if let Some(mut writer) = writer {
            // peer may already be gone
            let _ = writer.shutdown().await;
        }

        *self.lock_state() = LifecycleState::Closed;
        self.closed.cancel();
    }

    pub async fn wait_closed(&self) {
        self.closed.cancelled().await
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        // the guarded value is a plain enum; a poisoned lock still holds a valid state
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
