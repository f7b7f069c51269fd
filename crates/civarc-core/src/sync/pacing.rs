//! Delays between remote operations.

use crate::config::PacingConfig;
use rand::Rng;
use std::time::Duration;

/// Decides how long to wait between remote operations.
pub trait Pacer: Send + Sync {
    /// Pause before the next model, after one that used the network.
    fn between_models(&self) -> Duration;

    /// Pause between two asset downloads of the same model.
    fn between_assets(&self) -> Duration;
}

/// Uniformly random delays within fixed bounds.
#[derive(Debug, Clone)]
pub struct RandomPacing {
    pub model_delay: (Duration, Duration),
    pub asset_delay: (Duration, Duration),
}

impl Default for RandomPacing {
    fn default() -> Self {
        Self {
            model_delay: (PacingConfig::MODEL_DELAY_MIN, PacingConfig::MODEL_DELAY_MAX),
            asset_delay: (PacingConfig::ASSET_DELAY_MIN, PacingConfig::ASSET_DELAY_MAX),
        }
    }
}

impl RandomPacing {
    fn pick((min, max): (Duration, Duration)) -> Duration {
        if max <= min {
            return min;
        }
        let secs = rand::rng().random_range(min.as_secs_f64()..=max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

impl Pacer for RandomPacing {
    fn between_models(&self) -> Duration {
        Self::pick(self.model_delay)
    }

    fn between_assets(&self) -> Duration {
        Self::pick(self.asset_delay)
    }
}

/// No delays at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

impl Pacer for NoPacing {
    fn between_models(&self) -> Duration {
        Duration::ZERO
    }

    fn between_assets(&self) -> Duration {
        Duration::ZERO
    }
}

/// Pacing policy for a run, honoring `--notimeout`.
pub fn pacer_for(no_timeout: bool) -> Box<dyn Pacer> {
    if no_timeout {
        Box::new(NoPacing)
    } else {
        Box::new(RandomPacing::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_pacing_in_bounds() {
        let pacer = RandomPacing::default();
        for _ in 0..50 {
            let model = pacer.between_models();
            assert!(model >= Duration::from_secs(3) && model <= Duration::from_secs(6));
            let asset = pacer.between_assets();
            assert!(asset >= Duration::from_millis(500) && asset <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_no_timeout_is_zero() {
        let pacer = pacer_for(true);
        assert_eq!(pacer.between_models(), Duration::ZERO);
        assert_eq!(pacer.between_assets(), Duration::ZERO);
    }

    #[test]
    fn test_degenerate_bounds() {
        let pacer = RandomPacing {
            model_delay: (Duration::from_secs(1), Duration::from_secs(1)),
            asset_delay: (Duration::ZERO, Duration::ZERO),
        };
        assert_eq!(pacer.between_models(), Duration::from_secs(1));
        assert_eq!(pacer.between_assets(), Duration::ZERO);
    }
}
