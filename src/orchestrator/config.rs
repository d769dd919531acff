//! Orchestrator configuration

use std::time::Duration;

/// Steps of the ensemble and learning-curve strategies
pub const STEP_COUNT: usize = 20;
/// Iterative epochs when the user gives no `max_iter`
pub const DEFAULT_EPOCHS: usize = 50;
/// Smallest learning-curve training subset
pub const MIN_SUBSET: usize = 10;

/// Pacing between steps, so live dashboards see staggered updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Pause after each iterative epoch
    pub iterative_delay: Duration,
    /// Pause after each ensemble or learning-curve step
    pub step_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            iterative_delay: Duration::from_millis(200),
            step_delay: Duration::from_millis(500),
        }
    }
}

impl OrchestratorConfig {
    /// Defaults overridden by `RUNBOARD_ITERATIVE_DELAY_MS` and
    /// `RUNBOARD_STEP_DELAY_MS`
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            iterative_delay: env_millis("RUNBOARD_ITERATIVE_DELAY_MS").unwrap_or(d.iterative_delay),
            step_delay: env_millis("RUNBOARD_STEP_DELAY_MS").unwrap_or(d.step_delay),
        }
    }

    /// No pacing at all
    pub fn immediate() -> Self {
        Self {
            iterative_delay: Duration::ZERO,
            step_delay: Duration::ZERO,
        }
    }

    pub fn with_iterative_delay(mut self, delay: Duration) -> Self {
        self.iterative_delay = delay;
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pacing() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.iterative_delay, Duration::from_millis(200));
        assert_eq!(config.step_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_immediate_has_no_delay() {
        let config = OrchestratorConfig::immediate().with_step_delay(Duration::from_millis(5));
        assert!(config.iterative_delay.is_zero());
        assert_eq!(config.step_delay, Duration::from_millis(5));
    }
}
