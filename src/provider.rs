use std::sync::Mutex;

use sysinfo::{CpuExt, System, SystemExt};

use crate::error::{Result, ServerError};
use crate::protocol::Metric;

/// Source of host readings. Called from the blocking pool, so it may block.
pub trait MetricProvider: Send + Sync + 'static {
    /// Current utilization of `metric`, in percent.
    fn sample(&self, metric: Metric) -> Result<f64>;
}

/// Host metrics read through `sysinfo`.
pub struct SystemMetrics {
    sys: Mutex<System>,
}

impl SystemMetrics {
    pub fn new() -> Self {
        let mut sys = System::new();
        // cpu usage is a delta between two refreshes; take the baseline now
        sys.refresh_cpu();
        sys.refresh_memory();

        Self {
            sys: Mutex::new(sys),
        }
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricProvider for SystemMetrics {
    fn sample(&self, metric: Metric) -> Result<f64> {
        let mut sys = self
            .sys
            .lock()
            .map_err(|_| ServerError::Provider("system handle poisoned".into()))?;

        let value = match metric {
            Metric::Cpu => {
                sys.refresh_cpu();
                sys.global_cpu_info().cpu_usage() as f64
            }
            Metric::Memory => {
                sys.refresh_memory();
                let total = sys.total_memory();
                if total == 0 {
                    return Err(ServerError::Provider("total memory reported as 0".into()));
                }
                sys.used_memory() as f64 / total as f64 * 100.0
            }
        };

        Ok(round_tenths(value))
    }
}

/// Host readings are reported to one decimal place.
fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_reading_is_a_percentage() {
        let provider = SystemMetrics::new();
        let value = provider.sample(Metric::Memory).unwrap();
        assert!((0.0..=100.0).contains(&value), "got {}", value);
    }

    #[test]
    fn readings_are_rounded_to_tenths() {
        assert_eq!(round_tenths(45.67), 45.7);
        assert_eq!(round_tenths(12.04), 12.0);
        assert_eq!(round_tenths(0.0), 0.0);

        let value = SystemMetrics::new().sample(Metric::Memory).unwrap();
        assert_eq!(value, round_tenths(value));
    }

    #[test]
    fn cpu_reading_is_non_negative() {
        let provider = SystemMetrics::new();
        let value = provider.sample(Metric::Cpu).unwrap();
        assert!(value >= 0.0, "got {}", value);
    }
}
