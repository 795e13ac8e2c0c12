//! Per-connection command execution.
//!
//! The dispatcher owns the reply stream of one connection. It is either idle,
//! waiting on the command channel, or monitoring a metric, in which case it
//! samples once per period and looks at the head of the channel after every
//! sample to decide whether the stream should stop or switch.

use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{Result, ServerError};
use crate::protocol::{self, Command, Metric};
use crate::provider::MetricProvider;
use crate::shutdown;
use crate::state::ServerState;

/// Creates the command channel of one connection.
pub fn channel() -> (UnboundedSender<Command>, CommandInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, CommandInbox { rx, pending: None })
}

/// Consumer end of the command channel, with room to look at the next
/// command without taking it.
pub struct CommandInbox {
    rx: UnboundedReceiver<Command>,
    pending: Option<Command>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Peeked<'a> {
    Ready(&'a Command),
    Empty,
    /// Nothing queued and the receiver is gone.
    Disconnected,
}

impl CommandInbox {
    /// Next command in arrival order; `None` once the receiver is gone and
    /// everything it queued has been handed out.
    pub async fn next(&mut self) -> Option<Command> {
        if let Some(cmd) = self.pending.take() {
            return Some(cmd);
        }
        self.rx.recv().await
    }

    pub fn peek(&mut self) -> Peeked<'_> {
        if self.pending.is_none() {
            match self.rx.try_recv() {
                Ok(cmd) => self.pending = Some(cmd),
                Err(TryRecvError::Empty) => return Peeked::Empty,
                Err(TryRecvError::Disconnected) => return Peeked::Disconnected,
            }
        }

        match &self.pending {
            Some(cmd) => Peeked::Ready(cmd),
            None => Peeked::Empty,
        }
    }

    /// Takes the command last returned by [`peek`](Self::peek).
    pub fn take_peeked(&mut self) -> Option<Command> {
        self.pending.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// `X` was consumed.
    Stopped,
    /// Another command is at the head of the channel and must be run next.
    Interrupted,
    Disconnected,
    Closing,
}

/// Runs the dispatcher until the session ends, then hands the connection to
/// the shutdown path.
pub async fn run(state: ServerState, conn: Arc<Connection>, inbox: CommandInbox) {
    match drive(&state, &conn, inbox).await {
        Ok(()) => {}
        Err(e) if e.is_disconnect() => {
            debug!(peer = %conn.id(), "peer went away mid-write");
        }
        Err(e) => {
            warn!(peer = %conn.id(), error = %e, "dispatcher failed");
        }
    }

    shutdown::close(&state, &conn).await;
}

async fn drive(state: &ServerState, conn: &Connection, mut inbox: CommandInbox) -> Result<()> {
    conn.send(protocol::ESTABLISHED).await?;
    conn.send(protocol::WELCOME).await?;
    conn.send(protocol::MENU).await?;

    loop {
        let next = tokio::select! {
            biased;
            _ = conn.closing().cancelled() => return Ok(()),
            next = inbox.next() => next,
        };

        let Some(cmd) = next else {
            debug!(peer = %conn.id(), "receiver finished");
            return Ok(());
        };

        match cmd {
            Command::Monitor(metric) => {
                conn.send(metric.ack()).await?;
                debug!(peer = %conn.id(), %metric, "monitoring started");

                let end = stream(state, conn, &mut inbox, metric).await?;
                debug!(peer = %conn.id(), %metric, ?end, "monitoring ended");

                if matches!(end, StreamEnd::Disconnected | StreamEnd::Closing) {
                    return Ok(());
                }
            }

            // nothing to stop while idle
            Command::Stop => {}

            Command::Exit => {
                conn.send(protocol::CLOSED).await?;
                info!(peer = %conn.id(), "client requested exit");
                return Ok(());
            }

            Command::Shutdown => {
                if state.stop() {
                    info!(peer = %conn.id(), "server shutdown requested");
                }
                conn.send(protocol::SHUTTING_DOWN).await?;
                return Ok(());
            }

            Command::Unknown(text) => {
                debug!(peer = %conn.id(), command = %text, "invalid command");
                conn.send(protocol::INVALID).await?;
            }
        }
    }
}

async fn stream(
    state: &ServerState,
    conn: &Connection,
    inbox: &mut CommandInbox,
    metric: Metric,
) -> Result<StreamEnd> {
    let mut ticker = tokio::time::interval(state.config.sample_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = conn.closing().cancelled() => return Ok(StreamEnd::Closing),
            _ = ticker.tick() => {}
        }

        match sample(&state.provider, metric).await {
            Ok(value) => conn.send(&metric.reading(value)).await?,
            Err(e) => warn!(peer = %conn.id(), %metric, error = %e, "sampling failed"),
        }

        // act on everything queued since the last tick, up to the first interrupt
        loop {
            match inbox.peek() {
                Peeked::Empty => break,
                Peeked::Disconnected => return Ok(StreamEnd::Disconnected),
                Peeked::Ready(cmd) if cmd.interrupts(metric) => {
                    if *cmd != Command::Stop {
                        return Ok(StreamEnd::Interrupted);
                    }
                }
                Peeked::Ready(_) => {}
            }

            match inbox.take_peeked() {
                Some(Command::Stop) => {
                    conn.send(protocol::STOPPED).await?;
                    return Ok(StreamEnd::Stopped);
                }
                Some(Command::Unknown(text)) => {
                    debug!(peer = %conn.id(), command = %text, "invalid command while monitoring");
                    conn.send(protocol::INVALID).await?;
                }
                // repeat of the current metric
                _ => {}
            }
        }
    }
}

async fn sample(provider: &Arc<dyn MetricProvider>, metric: Metric) -> Result<f64> {
    let provider = provider.clone();

    tokio::task::spawn_blocking(move || provider.sample(metric))
        .await
        .map_err(|e| ServerError::Provider(e.to_string()))?
}
