//! EWMA bandwidth estimation.
//!
//! Two half-life-decayed averages of per-fragment throughput run side by
//! side: a fast one that reacts to recent samples and a slow one that smooths
//! over them. The estimator answers with the slow value once enough sample
//! weight has accumulated, and with a configured default before that.

use abr_types::LoaderStats;
use tracing::trace;

/// Exponentially weighted moving average with half-life decay.
///
/// Sample weight is expressed in seconds of download time; a sample aged one
/// half-life contributes half as much as a fresh one. Decay follows
/// cumulative sample weight, not wall clock.
#[derive(Debug, Clone)]
pub struct Ewma {
    half_life: f64,
    alpha: f64,
    estimate: f64,
    total_weight: f64,
}

impl Ewma {
    pub fn new(half_life: f64) -> Self {
        Self::with_state(half_life, 0.0, 0.0)
    }

    /// Rebuild an average around existing state, used when half-lives are
    /// reprofiled without discarding history.
    pub fn with_state(half_life: f64, estimate: f64, total_weight: f64) -> Self {
        let alpha = if half_life > 0.0 {
            (0.5f64).powf(1.0 / half_life)
        } else {
            0.0
        };
        Self {
            half_life,
            alpha,
            estimate,
            total_weight,
        }
    }

    #[inline]
    pub fn half_life(&self) -> f64 {
        self.half_life
    }

    #[inline]
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn sample(&mut self, weight: f64, value: f64) {
        let adj_alpha = self.alpha.powf(weight);
        self.estimate = adj_alpha * self.estimate + (1.0 - adj_alpha) * value;
        self.total_weight += weight;
    }

    /// Current estimate, corrected for the startup bias toward zero.
    pub fn estimate(&self) -> f64 {
        let zero_factor = 1.0 - self.alpha.powf(self.total_weight);
        if zero_factor > 0.0 {
            self.estimate / zero_factor
        } else {
            self.estimate
        }
    }
}

/// Fast/slow EWMA pair over per-fragment bandwidth samples, bits per second.
#[derive(Debug, Clone)]
pub struct BandwidthEstimator {
    default_estimate: f64,
    min_weight: f64,
    min_delay_ms: f64,
    slow: Ewma,
    fast: Ewma,
}

impl BandwidthEstimator {
    pub fn new(slow_half_life: f64, fast_half_life: f64, default_estimate: f64) -> Self {
        Self {
            default_estimate,
            min_weight: 0.001,
            min_delay_ms: 50.0,
            slow: Ewma::new(slow_half_life),
            fast: Ewma::new(fast_half_life),
        }
    }

    /// Reprofile the half-lives (live/VoD transitions) keeping accumulated
    /// history.
    pub fn update(&mut self, slow_half_life: f64, fast_half_life: f64) {
        if self.slow.half_life() != slow_half_life {
            self.slow = Ewma::with_state(slow_half_life, self.slow.estimate(), self.slow.total_weight());
        }
        if self.fast.half_life() != fast_half_life {
            self.fast = Ewma::with_state(fast_half_life, self.fast.estimate(), self.fast.total_weight());
        }
    }

    /// Feed one download sample. Non-positive (or NaN) durations are
    /// rejected silently; very short ones are clamped so a single burst
    /// cannot dominate the average.
    pub fn sample(&mut self, duration_ms: f64, bytes: u64) {
        if !(duration_ms > 0.0) {
            return;
        }
        let duration_ms = duration_ms.max(self.min_delay_ms);
        let bandwidth = (8000.0 * bytes as f64) / duration_ms;
        let weight = duration_ms / 1000.0;
        self.slow.sample(weight, bandwidth);
        self.fast.sample(weight, bandwidth);
        trace!(
            duration_ms,
            bytes,
            bandwidth_bps = bandwidth,
            estimate_bps = self.estimate(),
            "bandwidth sample"
        );
    }

    /// Whether at least one sample has been applied.
    #[inline]
    pub fn can_estimate(&self) -> bool {
        self.fast.total_weight() >= self.min_weight
    }

    /// Smoothed bandwidth estimate in bits per second, or the configured
    /// default before the first sample.
    pub fn estimate(&self) -> f64 {
        if self.can_estimate() {
            self.slow.estimate()
        } else {
            self.default_estimate
        }
    }
}

/// Derive a box-level throughput sample from `moof`/`mdat` chunk arrival
/// records.
///
/// The first and last entries on both sides are discarded: the leading chunk
/// carries connection setup time and the trailing one is routinely truncated
/// by the request ending. Returns `(duration_ms, bytes)` or `None` when the
/// trimmed records cannot support a sample, in which case the caller falls
/// back to request timing.
pub fn box_throughput_sample(stats: &LoaderStats) -> Option<(f64, u64)> {
    if stats.start_time_data.len() < 3 || stats.end_time_data.len() < 3 {
        return None;
    }
    let starts = &stats.start_time_data[1..stats.start_time_data.len() - 1];
    let ends = &stats.end_time_data[1..stats.end_time_data.len() - 1];
    let first = starts.first()?;
    let last = ends.last()?;
    let duration_ms = last.timestamp - first.timestamp;
    let bytes = stats.box_loaded.saturating_sub(last.len);
    if duration_ms > 0.0 && bytes > 0 {
        Some((duration_ms, bytes))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_before_first_sample() {
        let bwe = BandwidthEstimator::new(9.0, 3.0, 5e5);
        assert!(!bwe.can_estimate());
        assert_eq!(bwe.estimate(), 5e5);
    }

    #[test]
    fn test_single_sample_dominates() {
        let mut bwe = BandwidthEstimator::new(9.0, 3.0, 5e5);
        // 1 MB in 1 s = 8 Mbps
        bwe.sample(1_000.0, 1_000_000);
        assert!(bwe.can_estimate());
        assert!((bwe.estimate() - 8e6).abs() < 1.0);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let mut bwe = BandwidthEstimator::new(9.0, 3.0, 5e5);
        bwe.sample(0.0, 1_000_000);
        bwe.sample(-5.0, 1_000_000);
        bwe.sample(f64::NAN, 1_000_000);
        assert!(!bwe.can_estimate());
        assert_eq!(bwe.estimate(), 5e5);
    }

    #[test]
    fn test_update_keeps_history() {
        let mut bwe = BandwidthEstimator::new(9.0, 3.0, 5e5);
        bwe.sample(1_000.0, 1_000_000);
        bwe.update(3.0, 3.0);
        // history survives the reprofile and further samples re-converge
        assert!(bwe.can_estimate());
        for _ in 0..20 {
            bwe.sample(1_000.0, 1_000_000);
        }
        assert!((bwe.estimate() - 8e6).abs() < 8e6 * 0.05);
    }

    #[test]
    fn test_update_same_half_lives_is_noop() {
        let mut bwe = BandwidthEstimator::new(9.0, 3.0, 5e5);
        bwe.sample(1_000.0, 1_000_000);
        let before = bwe.estimate();
        bwe.update(9.0, 3.0);
        assert_eq!(bwe.estimate(), before);
    }

    #[test]
    fn test_fast_half_life_reacts_quicker() {
        let mut slow = Ewma::new(9.0);
        let mut fast = Ewma::new(3.0);
        for _ in 0..5 {
            slow.sample(1.0, 1e6);
            fast.sample(1.0, 1e6);
        }
        slow.sample(1.0, 2e6);
        fast.sample(1.0, 2e6);
        assert!(fast.estimate() > slow.estimate());
    }

    fn chunked_stats(chunks: usize, chunk_ms: f64, chunk_len: u64) -> LoaderStats {
        let mut stats = LoaderStats::default();
        for i in 0..chunks {
            let at = i as f64 * chunk_ms;
            stats.record_moof(at, 100);
            stats.record_mdat(at + 1.0, chunk_len);
        }
        stats
    }

    #[test]
    fn test_box_sample_trims_edges() {
        let stats = chunked_stats(5, 100.0, 10_000);
        let (duration_ms, bytes) = box_throughput_sample(&stats).unwrap();
        // trimmed to chunks 1..=3: first moof at 100ms, last mdat at 301ms
        assert!((duration_ms - 201.0).abs() < 1e-9);
        assert_eq!(bytes, 5 * 10_000 - 10_000);
    }

    #[test]
    fn test_box_sample_too_few_chunks() {
        let stats = chunked_stats(2, 100.0, 10_000);
        assert!(box_throughput_sample(&stats).is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A stationary stream of identical samples converges monotonically
        /// to the true bandwidth.
        #[test]
        fn prop_converges_to_stationary_mean(
            bytes in 10_000u64..10_000_000,
            duration_ms in 100.0f64..10_000.0,
            samples in 2usize..40
        ) {
            let mut bwe = BandwidthEstimator::new(9.0, 3.0, 5e5);
            let truth = 8000.0 * bytes as f64 / duration_ms;
            let mut last_error = f64::INFINITY;
            for _ in 0..samples {
                bwe.sample(duration_ms, bytes);
                let error = (bwe.estimate() - truth).abs();
                prop_assert!(error <= last_error + 1e-6);
                last_error = error;
            }
            prop_assert!(last_error < truth * 0.5);
        }

        /// Rejected samples leave the estimator untouched.
        #[test]
        fn prop_zero_duration_idempotent(bytes in 0u64..10_000_000) {
            let mut bwe = BandwidthEstimator::new(9.0, 3.0, 5e5);
            bwe.sample(1_000.0, 500_000);
            let before = bwe.estimate();
            bwe.sample(0.0, bytes);
            prop_assert_eq!(bwe.estimate(), before);
        }
    }
}
