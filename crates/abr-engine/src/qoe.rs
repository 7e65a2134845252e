//! Per-segment Quality-of-Experience scoring.
//!
//! The evaluator accumulates a scalar reward per buffered segment: bitrate
//! earns, switches/rebuffering/latency/rate-deviation cost. LoL+ consults it
//! both as a running observable and as a throwaway scorer inside the weight
//! search.

/// One bucket of the piecewise-linear latency penalty schedule. The first
/// bucket whose threshold is at or above the current latency applies.
#[derive(Debug, Clone, Copy)]
struct LatencyBucket {
    threshold: f64,
    penalty_per_s: f64,
}

/// QoE bookkeeping for one playback session segment window.
#[derive(Debug, Clone)]
pub struct QoeInfo {
    segment_duration: f64,
    min_bitrate_kbps: f64,
    max_bitrate_kbps: f64,

    bitrate_reward: f64,
    bitrate_switch_penalty: f64,
    rebuffer_penalty: f64,
    latency_schedule: [LatencyBucket; 2],
    playback_speed_penalty: f64,

    last_bitrate_kbps: Option<f64>,
    bitrate_wsum: f64,
    switch_wsum: f64,
    rebuffer_wsum: f64,
    latency_wsum: f64,
    speed_wsum: f64,
    total_qoe: f64,
}

impl QoeInfo {
    fn new(segment_duration: f64, max_bitrate_kbps: f64, min_bitrate_kbps: f64) -> Self {
        Self {
            segment_duration,
            min_bitrate_kbps,
            max_bitrate_kbps,
            bitrate_reward: segment_duration,
            bitrate_switch_penalty: 1.0,
            rebuffer_penalty: max_bitrate_kbps,
            latency_schedule: [
                LatencyBucket {
                    threshold: 1.1,
                    penalty_per_s: min_bitrate_kbps * 0.05,
                },
                LatencyBucket {
                    threshold: f64::INFINITY,
                    penalty_per_s: max_bitrate_kbps * 0.1,
                },
            ],
            playback_speed_penalty: min_bitrate_kbps,
            last_bitrate_kbps: None,
            bitrate_wsum: 0.0,
            switch_wsum: 0.0,
            rebuffer_wsum: 0.0,
            latency_wsum: 0.0,
            speed_wsum: 0.0,
            total_qoe: 0.0,
        }
    }

    fn log_segment(&mut self, bitrate_kbps: f64, rebuffer_s: f64, latency_s: f64, speed: f64) {
        self.bitrate_wsum += self.bitrate_reward * bitrate_kbps;
        if let Some(last) = self.last_bitrate_kbps {
            self.switch_wsum += self.bitrate_switch_penalty * (bitrate_kbps - last).abs();
        }
        self.last_bitrate_kbps = Some(bitrate_kbps);
        self.rebuffer_wsum += self.rebuffer_penalty * rebuffer_s;
        for bucket in &self.latency_schedule {
            if latency_s <= bucket.threshold {
                self.latency_wsum += bucket.penalty_per_s * latency_s;
                break;
            }
        }
        self.speed_wsum += self.playback_speed_penalty * (1.0 - speed).abs();
        self.total_qoe = self.bitrate_wsum
            - self.switch_wsum
            - self.rebuffer_wsum
            - self.latency_wsum
            - self.speed_wsum;
    }

    #[inline]
    pub fn total(&self) -> f64 {
        self.total_qoe
    }
}

/// Session-long QoE evaluator.
#[derive(Debug, Clone, Default)]
pub struct QoeEvaluator {
    info: Option<QoeInfo>,
}

impl QoeEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh per-segment window with the ladder bounds in kbit/s.
    pub fn setup_per_segment(&mut self, segment_duration: f64, max_kbps: f64, min_kbps: f64) {
        self.info = Some(QoeInfo::new(segment_duration, max_kbps, min_kbps));
    }

    /// Fold one played segment into the current window.
    pub fn log_segment_metrics(
        &mut self,
        bitrate_kbps: f64,
        rebuffer_s: f64,
        latency_s: f64,
        playback_speed: f64,
    ) {
        if let Some(info) = self.info.as_mut() {
            info.log_segment(bitrate_kbps, rebuffer_s, latency_s, playback_speed);
        }
    }

    /// Current per-segment QoE, `None` before the first setup.
    pub fn per_segment_qoe(&self) -> Option<f64> {
        self.info.as_ref().map(QoeInfo::total)
    }

    /// Score one hypothetical segment with the stored ladder bounds, without
    /// touching the running window.
    pub fn calculate_single_use_qoe(
        &self,
        bitrate_kbps: f64,
        rebuffer_s: f64,
        latency_s: f64,
        playback_speed: f64,
    ) -> f64 {
        let Some(info) = self.info.as_ref() else {
            return 0.0;
        };
        let mut scratch = QoeInfo::new(
            info.segment_duration,
            info.max_bitrate_kbps,
            info.min_bitrate_kbps,
        );
        scratch.log_segment(bitrate_kbps, rebuffer_s, latency_s, playback_speed);
        scratch.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> QoeEvaluator {
        let mut qoe = QoeEvaluator::new();
        // 2 s segments, ladder 300..3000 kbps
        qoe.setup_per_segment(2.0, 3000.0, 300.0);
        qoe
    }

    #[test]
    fn test_bitrate_reward_scales_with_duration() {
        let mut qoe = evaluator();
        qoe.log_segment_metrics(1500.0, 0.0, 0.0, 1.0);
        // reward = duration * bitrate, no penalties apply
        assert!((qoe.per_segment_qoe().unwrap() - 3000.0).abs() < 1e-9);
    }

    #[test]
    fn test_switch_penalty_applies_from_second_segment() {
        let mut qoe = evaluator();
        qoe.log_segment_metrics(1500.0, 0.0, 0.0, 1.0);
        qoe.log_segment_metrics(750.0, 0.0, 0.0, 1.0);
        // 3000 + 1500 - |750 - 1500|
        assert!((qoe.per_segment_qoe().unwrap() - 3750.0).abs() < 1e-9);
    }

    #[test]
    fn test_rebuffer_penalty_uses_max_bitrate() {
        let mut qoe = evaluator();
        qoe.log_segment_metrics(1500.0, 0.5, 0.0, 1.0);
        assert!((qoe.per_segment_qoe().unwrap() - (3000.0 - 1500.0)).abs() < 1e-9);
    }

    #[test]
    fn test_latency_schedule_two_tiers() {
        let mut low = evaluator();
        low.log_segment_metrics(1500.0, 0.0, 1.0, 1.0);
        // first bucket: 300 * 0.05 = 15 per second
        assert!((low.per_segment_qoe().unwrap() - (3000.0 - 15.0)).abs() < 1e-9);

        let mut high = evaluator();
        high.log_segment_metrics(1500.0, 0.0, 2.0, 1.0);
        // second bucket: 3000 * 0.1 = 300 per second
        assert!((high.per_segment_qoe().unwrap() - (3000.0 - 600.0)).abs() < 1e-9);
    }

    #[test]
    fn test_playback_speed_penalty() {
        let mut qoe = evaluator();
        qoe.log_segment_metrics(1500.0, 0.0, 0.0, 1.2);
        let expected = 3000.0 - 300.0 * 0.2;
        assert!((qoe.per_segment_qoe().unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_single_use_does_not_mutate_window() {
        let mut qoe = evaluator();
        qoe.log_segment_metrics(1500.0, 0.0, 0.0, 1.0);
        let before = qoe.per_segment_qoe().unwrap();
        let single = qoe.calculate_single_use_qoe(750.0, 0.2, 1.5, 1.1);
        assert!(single < before);
        assert_eq!(qoe.per_segment_qoe().unwrap(), before);
    }

    #[test]
    fn test_single_use_before_setup_is_zero() {
        let qoe = QoeEvaluator::new();
        assert_eq!(qoe.calculate_single_use_qoe(1500.0, 0.0, 0.0, 1.0), 0.0);
        assert!(qoe.per_segment_qoe().is_none());
    }
}
