//! Timeout Hierarchy
//!
//! Every timeout is derived from one base value so that a slow environment can
//! be accommodated by changing a single knob. Quick mode shrinks all of them
//! uniformly for fast feedback during development.

use crate::config::TimeoutConfig;
use crate::model::Workload;
use std::time::Duration;

/// Operation whose duration is bounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationCategory {
    /// Runner connection handshake
    Connection,
    /// One standard trial
    Execution,
    /// Waiting for a runner context, and each cleanup step
    ResourceWait,
    /// One heavy-workload trial
    HeavyWorkload,
}

/// Resolves the timeout for each operation category
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    config: TimeoutConfig,
}

impl TimeoutPolicy {
    /// Create a policy from validated settings
    pub fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }

    /// Timeout for an operation category
    pub fn timeout_for(&self, category: OperationCategory) -> Duration {
        let m = &self.config.multipliers;
        let multiplier = match category {
            OperationCategory::Connection => m.connection,
            OperationCategory::Execution => m.execution,
            OperationCategory::ResourceWait => m.resource_wait,
            OperationCategory::HeavyWorkload => m.heavy_workload,
        };
        let scale = if self.config.quick_mode {
            self.config.quick_mode_factor
        } else {
            1.0
        };
        self.config.base_timeout.mul_f64(multiplier * scale)
    }

    /// Timeout for one trial of a task with the given workload
    pub fn trial_timeout(&self, workload: Workload) -> Duration {
        match workload {
            Workload::Standard => self.timeout_for(OperationCategory::Execution),
            Workload::Heavy => self.timeout_for(OperationCategory::HeavyWorkload),
        }
    }

    /// Whether quick mode is active
    pub fn is_quick(&self) -> bool {
        self.config.quick_mode
    }
}
