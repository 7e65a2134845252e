use serde::{Deserialize, Serialize};

use crate::error::AbrError;

/// Which decision rule drives quality selection.
///
/// `None` at the orchestrator level means no rule is active and decisions
/// fall back to the conservative bandwidth/buffer search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    /// Self-organizing-map classifier with dynamic weight selection
    LoLp,
    /// Online-learning rule driven by a Lagrangian multiplier
    L2A,
    /// Mean-minus-k-sigma throughput with a latency safety band
    Stallion,
    /// Harmonic-mean throughput heuristic with hysteresis
    Llama,
}

impl RuleKind {
    /// Parse a wire-level rule tag. Unknown tags yield `None`, which the
    /// orchestrator treats as "use the conservative fallback".
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "LoLp" => Some(RuleKind::LoLp),
            "L2ARule" => Some(RuleKind::L2A),
            "StallionRule" => Some(RuleKind::Stallion),
            "Llama" => Some(RuleKind::Llama),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            RuleKind::LoLp => "LoLp",
            RuleKind::L2A => "L2ARule",
            RuleKind::Stallion => "StallionRule",
            RuleKind::Llama => "Llama",
        }
    }
}

/// How LoL+ chooses the SOM distance weights each round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightSelectionMode {
    /// Fixed 0.4 on every axis
    Manual,
    /// Xavier-style draw, uniform on `[0, sqrt(2/4))` per axis
    Random,
    /// Exhaustive QoE-driven search
    #[default]
    Dynamic,
}

/// EWMA half-life profile, seconds of sample weight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EwmaConfig {
    pub slow_vod: f64,
    pub fast_vod: f64,
    pub slow_live: f64,
    pub fast_live: f64,
    /// Estimate returned before the first sample, bits per second
    pub default_estimate: f64,
}

impl Default for EwmaConfig {
    fn default() -> Self {
        Self {
            slow_vod: 9.0,
            fast_vod: 3.0,
            slow_live: 9.0,
            fast_live: 3.0,
            default_estimate: 5e5,
        }
    }
}

/// Live catch-up playback-rate controller options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CatchupConfig {
    /// Master switch for rate corrections
    pub enabled: bool,
    /// Catch-up is suppressed entirely above this latency, seconds
    pub latency_threshold: f64,
    /// Maximum rate deviation from 1.0 in either direction
    pub playback_rate: f64,
    /// Minimum latency drift before a correction is considered, seconds
    pub min_drift: f64,
    /// Buffer level below which the buffer term drives the correction
    pub playback_buffer_min: f64,
    /// Rate changes smaller than this are suppressed; Safari hosts should
    /// raise it to 0.25
    pub min_rate_change: f64,
}

impl Default for CatchupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            latency_threshold: 60.0,
            playback_rate: 0.3,
            min_drift: 0.05,
            playback_buffer_min: 0.5,
            min_rate_change: 0.02,
        }
    }
}

/// Engine configuration.
///
/// Factors and delays mirror their conventional player semantics: decisions
/// discount the bandwidth estimate by `bandwidth_factor` when staying at or
/// below the current level and by `bandwidth_up_factor` when switching up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbrConfig {
    /// Active decision rule; `None` selects the conservative fallback
    pub rule: Option<RuleKind>,
    pub ewma: EwmaConfig,
    pub bandwidth_factor: f64,
    pub bandwidth_up_factor: f64,
    /// Cap level selection with measured (real) bitrates instead of
    /// manifest-declared ones
    pub max_with_real_bitrate: bool,
    /// Buffer hole tolerance, seconds
    pub max_buffer_hole: f64,
    /// Extra starvation budget granted when rebuffering is unavoidable,
    /// seconds
    pub max_starvation_delay: f64,
    /// Loading budget used right after a bitrate test, seconds
    pub max_loading_delay: f64,
    /// Derive throughput samples from `moof`/`mdat` chunk boundaries instead
    /// of request timing
    pub box_throughput_sampling: bool,
    /// Seed for the pseudorandom stream consumed by LoL+ (k-means++ seeding
    /// and Xavier weight initialization)
    pub seed: u64,
    /// Weight selection strategy for the LoL+ rule
    pub lolp_weight_mode: WeightSelectionMode,
    pub catchup: CatchupConfig,
}

impl Default for AbrConfig {
    fn default() -> Self {
        Self {
            rule: None,
            ewma: EwmaConfig::default(),
            bandwidth_factor: 0.8,
            bandwidth_up_factor: 0.7,
            max_with_real_bitrate: false,
            max_buffer_hole: 0.1,
            max_starvation_delay: 4.0,
            max_loading_delay: 4.0,
            box_throughput_sampling: false,
            seed: 0,
            lolp_weight_mode: WeightSelectionMode::default(),
            catchup: CatchupConfig::default(),
        }
    }
}

impl AbrConfig {
    pub fn validate(&self) -> Result<(), AbrError> {
        fn positive(name: &str, value: f64) -> Result<(), AbrError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(AbrError::InvalidConfig {
                    reason: format!("{name} must be positive, got {value}"),
                })
            }
        }

        positive("ewma.slow_vod", self.ewma.slow_vod)?;
        positive("ewma.fast_vod", self.ewma.fast_vod)?;
        positive("ewma.slow_live", self.ewma.slow_live)?;
        positive("ewma.fast_live", self.ewma.fast_live)?;
        positive("ewma.default_estimate", self.ewma.default_estimate)?;
        positive("bandwidth_factor", self.bandwidth_factor)?;
        positive("bandwidth_up_factor", self.bandwidth_up_factor)?;
        if self.bandwidth_factor > 1.0 || self.bandwidth_up_factor > 1.0 {
            return Err(AbrError::InvalidConfig {
                reason: "bandwidth factors must not exceed 1.0".to_string(),
            });
        }
        if self.max_buffer_hole < 0.0 {
            return Err(AbrError::InvalidConfig {
                reason: "max_buffer_hole must not be negative".to_string(),
            });
        }
        positive("catchup.playback_rate", self.catchup.playback_rate)?;
        if self.catchup.playback_rate >= 1.0 {
            return Err(AbrError::InvalidConfig {
                reason: "catchup.playback_rate must be below 1.0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AbrConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rule_tags_round_trip() {
        for kind in [
            RuleKind::LoLp,
            RuleKind::L2A,
            RuleKind::Stallion,
            RuleKind::Llama,
        ] {
            assert_eq!(RuleKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(RuleKind::from_tag("Bola"), None);
    }

    #[test]
    fn test_invalid_factor_rejected() {
        let config = AbrConfig {
            bandwidth_factor: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_half_life_rejected() {
        let mut config = AbrConfig::default();
        config.ewma.slow_live = 0.0;
        assert!(config.validate().is_err());
    }
}
