//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, ServerError};

/// Fixed for the lifetime of the server.
///
/// ```
/// use resmon::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::default()
///     .with_max_connections(2)
///     .with_sample_period(Duration::from_millis(500));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_address: SocketAddr,

    /// Maximum number of simultaneously admitted connections
    pub max_connections: usize,

    /// Interval between two metric samples sent while monitoring
    pub sample_period: Duration,

    /// Upper bound on how long teardown waits for the receiver to let go of
    /// the read half before the socket is closed
    pub grace_interval: Duration,

    /// Bounded wait on accept; the running flag is re-checked at least this often
    pub accept_poll: Duration,

    /// How long a stopped server waits for sessions to end on their own
    pub drain_timeout: Duration,

    /// Timeout for a single write to a client
    ///
    /// A client that stops reading is treated as disconnected once a write
    /// has been pending this long.
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 5000)),
            max_connections: 5,
            sample_period: Duration::from_millis(1500),
            grace_interval: Duration::from_millis(100),
            accept_poll: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    pub fn with_grace_interval(mut self, grace: Duration) -> Self {
        self.grace_interval = grace;
        self
    }

    pub fn with_accept_poll(mut self, poll: Duration) -> Self {
        self.accept_poll = poll;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(ServerError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        let durations = [
            ("sample_period", self.sample_period),
            ("grace_interval", self.grace_interval),
            ("accept_poll", self.accept_poll),
            ("drain_timeout", self.drain_timeout),
            ("write_timeout", self.write_timeout),
        ];

        for (name, value) in durations {
            if value.is_zero() {
                return Err(ServerError::InvalidConfig(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.sample_period, Duration::from_millis(1500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = ServerConfig::default()
            .with_max_connections(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig(msg) if msg.contains("max_connections")));
    }

    #[test]
    fn zero_write_timeout_is_rejected() {
        let err = ServerConfig::default()
            .with_write_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig(msg) if msg.contains("write_timeout")));
    }

    #[test]
    fn zero_period_is_rejected() {
        let err = ServerConfig::default()
            .with_sample_period(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig(msg) if msg.contains("sample_period")));
    }
}
