//! Threshold ceilings for alert evaluation

use serde::{Deserialize, Serialize};

const GIB: u64 = 1024 * 1024 * 1024;

fn default_cpu_percent() -> f64 {
    80.0
}

fn default_memory_percent() -> f64 {
    85.0
}

fn default_process_count() -> u64 {
    1000
}

fn default_system_memory_bytes() -> u64 {
    16 * GIB
}

/// Ceilings a record is tested against; a reading strictly above one breaches it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: f64,

    #[serde(default = "default_memory_percent")]
    pub memory_percent: f64,

    #[serde(default = "default_process_count")]
    pub process_count: u64,

    /// Total memory the memory percentage is derived against
    #[serde(default = "default_system_memory_bytes")]
    pub system_memory_bytes: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: default_cpu_percent(),
            memory_percent: default_memory_percent(),
            process_count: default_process_count(),
            system_memory_bytes: default_system_memory_bytes(),
        }
    }
}

impl AlertThresholds {
    /// Memory used as a percentage of the configured system memory
    pub fn memory_percent_of(&self, used_bytes: u64) -> f64 {
        if self.system_memory_bytes == 0 {
            return 0.0;
        }
        used_bytes as f64 / self.system_memory_bytes as f64 * 100.0
    }
}
