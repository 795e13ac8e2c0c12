use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::ServerConfig;
use crate::provider::MetricProvider;
use crate::registry::Registry;

/// Everything shared across connections. Cheap to clone.
#[derive(Clone)]
pub struct ServerState {
    pub registry: Arc<Registry>,
    pub provider: Arc<dyn MetricProvider>,
    pub config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
}

impl ServerState {
    pub fn new(config: ServerConfig, provider: Arc<dyn MetricProvider>) -> Self {
        Self {
            registry: Arc::new(Registry::new(config.max_connections)),
            provider,
            config: Arc::new(config),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Clears the running flag. Returns whether this call was the one to clear it.
    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }
}
