//! Live catch-up playback-rate controller.
//!
//! When playback drifts from the live-edge target, the rate is eased along a
//! sigmoid toward the target instead of being snapped, keeping pitch
//! correction inaudible. A starving buffer drives the correction downward
//! regardless of latency.

use abr_types::{LiveEdge, MediaState};
use tracing::trace;

use crate::config::CatchupConfig;

#[derive(Debug, Clone)]
pub(crate) struct CatchupController {
    config: CatchupConfig,
}

impl CatchupController {
    pub fn new(config: CatchupConfig) -> Self {
        Self { config }
    }

    /// New playback rate to apply, or `None` when no correction is wanted
    /// (inactive, out of range, or below the change threshold).
    pub fn playback_rate(&self, media: &MediaState, live: Option<LiveEdge>) -> Option<f64> {
        let cfg = &self.config;
        if !cfg.enabled || media.paused {
            return None;
        }
        let edge = live?;

        let drift = edge.drift();
        let buffer = media.buffer.len;
        let triggered = edge.latency <= cfg.latency_threshold
            && (drift > cfg.min_drift || buffer < cfg.playback_buffer_min);
        if !triggered {
            return None;
        }

        let cpr = cfg.playback_rate;
        let rate = if buffer < cfg.playback_buffer_min {
            sigmoid_rate(cpr, 5.0 * (buffer - cfg.playback_buffer_min))
        } else if drift <= 0.02 * edge.target_latency {
            1.0
        } else {
            sigmoid_rate(cpr, 5.0 * (edge.latency - edge.target_latency))
        };
        let rate = rate.clamp(1.0 - cpr, 1.0 + cpr);

        if (rate - media.playback_rate).abs() < cfg.min_rate_change {
            return None;
        }
        trace!(rate, drift, buffer, "catch-up rate correction");
        Some(rate)
    }
}

/// `1 - cpr + 2*cpr / (1 + e^(-d))`: maps drift onto `(1-cpr, 1+cpr)`.
fn sigmoid_rate(cpr: f64, d: f64) -> f64 {
    1.0 - cpr + (2.0 * cpr) / (1.0 + (-d).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use abr_types::BufferInfo;

    fn media(buffer_len: f64, rate: f64) -> MediaState {
        MediaState {
            position: 10.0,
            playback_rate: rate,
            paused: false,
            buffer: BufferInfo {
                len: buffer_len,
                end: 10.0 + buffer_len,
            },
        }
    }

    fn controller() -> CatchupController {
        CatchupController::new(CatchupConfig::default())
    }

    #[test]
    fn test_latency_drift_speeds_up() {
        let edge = LiveEdge {
            latency: 2.5,
            target_latency: 1.5,
        };
        let rate = controller()
            .playback_rate(&media(2.0, 1.0), Some(edge))
            .unwrap();
        let expected = 1.0 - 0.3 + 0.6 / (1.0 + (-5.0f64).exp());
        assert!((rate - expected).abs() < 1e-9);
        assert!((rate - 1.2960).abs() < 1e-3);
    }

    #[test]
    fn test_starving_buffer_slows_down() {
        let edge = LiveEdge {
            latency: 1.5,
            target_latency: 1.5,
        };
        let rate = controller()
            .playback_rate(&media(0.2, 1.0), Some(edge))
            .unwrap();
        assert!(rate < 1.0);
        assert!(rate >= 0.7);
    }

    #[test]
    fn test_within_target_band_resets_to_unity() {
        let edge = LiveEdge {
            latency: 1.52,
            target_latency: 1.5,
        };
        // drift 0.02 <= 2% of target is treated as on-target, but it is also
        // below min_drift with a healthy buffer, so nothing triggers
        assert_eq!(controller().playback_rate(&media(2.0, 1.2), Some(edge)), None);

        // a drift above min_drift but inside the 2% band resets the rate
        let edge = LiveEdge {
            latency: 3.56,
            target_latency: 3.5,
        };
        let rate = controller()
            .playback_rate(&media(2.0, 1.2), Some(edge))
            .unwrap();
        assert_eq!(rate, 1.0);
    }

    #[test]
    fn test_high_latency_suppresses_catchup() {
        let edge = LiveEdge {
            latency: 90.0,
            target_latency: 1.5,
        };
        assert_eq!(controller().playback_rate(&media(2.0, 1.0), Some(edge)), None);
    }

    #[test]
    fn test_small_change_suppressed() {
        let edge = LiveEdge {
            latency: 2.5,
            target_latency: 1.5,
        };
        // already playing at the corrected rate
        let corrected = 1.0 - 0.3 + 0.6 / (1.0 + (-5.0f64).exp());
        assert_eq!(
            controller().playback_rate(&media(2.0, corrected), Some(edge)),
            None
        );
    }

    #[test]
    fn test_rate_bounded_by_cpr() {
        let edge = LiveEdge {
            latency: 40.0,
            target_latency: 1.5,
        };
        let rate = controller()
            .playback_rate(&media(2.0, 1.0), Some(edge))
            .unwrap();
        assert!(rate <= 1.3 + 1e-12);
    }

    #[test]
    fn test_paused_and_vod_inactive() {
        let edge = LiveEdge {
            latency: 2.5,
            target_latency: 1.5,
        };
        let mut paused = media(2.0, 1.0);
        paused.paused = true;
        assert_eq!(controller().playback_rate(&paused, Some(edge)), None);
        assert_eq!(controller().playback_rate(&media(2.0, 1.0), None), None);
    }
}
