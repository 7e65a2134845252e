//! L2A-LL: online learning over the probability simplex.
//!
//! A Lagrangian multiplier `q` tracks the running buffer constraint while a
//! probability vector `w` over the ladder is nudged each segment and
//! projected back onto the simplex. The chosen rung is the one whose bitrate
//! is closest to the expectation under `w`.

use tracing::{debug, trace};

use super::{RuleInputs, quality_for_bitrate};

/// Optimization horizon, segments.
const HORIZON: f64 = 4.0;
/// Re-calibration multiplier applied to `q` when the pick is unaffordable.
const REACT: f64 = 2.0;
/// Buffer level that gates the startup-to-steady transition, seconds.
const BUFFER_TARGET_S: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum L2AState {
    /// Degenerate single-rung ladder; always answer the current quality
    OneBitrate,
    /// Throughput-affordability picks until the buffer fills
    Startup,
    /// Regret-minimizing updates
    Steady,
}

#[derive(Debug)]
pub(crate) struct L2ARule {
    pub(crate) state: L2AState,
    /// Lagrangian multiplier
    pub(crate) q: f64,
    pub(crate) w: Vec<f64>,
    pub(crate) prev_w: Vec<f64>,
    pub(crate) last_quality: usize,
    pub(crate) last_segment_duration_s: Option<f64>,
    pub(crate) last_segment_throughput_kbps: f64,
    vl: f64,
    alpha: f64,
}

impl L2ARule {
    pub fn new(ladder_size: usize) -> Self {
        let vl = HORIZON.powf(0.99);
        Self {
            state: if ladder_size <= 1 {
                L2AState::OneBitrate
            } else {
                L2AState::Startup
            },
            q: 0.0,
            w: vec![0.0; ladder_size],
            prev_w: vec![0.0; ladder_size],
            last_quality: 0,
            last_segment_duration_s: None,
            last_segment_throughput_kbps: 0.0,
            vl,
            alpha: HORIZON.max(vl * HORIZON.sqrt()),
        }
    }

    pub fn on_fragment_complete(&mut self, duration_s: f64, throughput_kbps: f64) {
        if duration_s > 0.0 {
            self.last_segment_duration_s = Some(duration_s);
        }
        if throughput_kbps > 0.0 {
            self.last_segment_throughput_kbps = throughput_kbps;
        }
    }

    pub fn on_stall(&mut self) {
        if self.state != L2AState::OneBitrate {
            debug!("buffer stalled, returning to startup");
            self.state = L2AState::Startup;
        }
        self.last_segment_duration_s = None;
        self.last_segment_throughput_kbps = 0.0;
    }

    pub fn next_quality(&mut self, inputs: &RuleInputs<'_>) -> Option<usize> {
        match self.state {
            L2AState::OneBitrate => Some(inputs.current_level),
            L2AState::Startup => self.startup(inputs),
            L2AState::Steady => Some(self.steady(inputs)),
        }
    }

    fn startup(&mut self, inputs: &RuleInputs<'_>) -> Option<usize> {
        if !inputs.throughput_kbps.is_finite() || inputs.throughput_kbps <= 0.0 {
            return None;
        }
        // within the live dead band decisions would churn; wait it out
        if let Some(edge) = inputs.live {
            if inputs.frag_duration > 0.0 && edge.drift() >= inputs.frag_duration {
                return None;
            }
        }
        let quality = quality_for_bitrate(
            inputs.levels,
            inputs.throughput_kbps,
            inputs.live,
            inputs.frag_duration,
        );
        self.last_quality = quality;

        if self.last_segment_duration_s.is_some() && inputs.media.buffer.len >= BUFFER_TARGET_S {
            self.state = L2AState::Steady;
            self.q = self.vl;
            self.prev_w.fill(0.0);
            self.prev_w[self.last_quality] = 1.0;
            debug!(quality, q = self.q, "startup complete, entering steady state");
        }
        Some(quality)
    }

    fn steady(&mut self, inputs: &RuleInputs<'_>) -> usize {
        let v = self.last_segment_duration_s.unwrap_or(inputs.frag_duration);
        let t = self.last_segment_throughput_kbps.max(1.0);
        let r = inputs.media.effective_rate();
        let bitrates_kbps: Vec<f64> = inputs
            .levels
            .iter()
            .map(|level| f64::from(level.bitrate) / 1000.0)
            .collect();

        for (i, &b) in bitrates_kbps.iter().enumerate() {
            let sign = if r * b > t { -1.0 } else { 1.0 };
            self.w[i] = self.prev_w[i] + sign * (v / (2.0 * self.alpha)) * (self.q + self.vl) * (r * b / t);
        }
        self.w = project_simplex(&self.w);

        let diff: Vec<f64> = self
            .w
            .iter()
            .zip(&self.prev_w)
            .map(|(w, p)| w - p)
            .collect();
        self.prev_w.copy_from_slice(&self.w);
        let expected = dot(&bitrates_kbps, &self.prev_w) + dot(&bitrates_kbps, &diff);
        self.q = (self.q - v + v * r * (expected / t)).max(0.0);

        let target = dot(&bitrates_kbps, &self.w);
        let mut quality = 0;
        let mut best = f64::INFINITY;
        for (i, &b) in bitrates_kbps.iter().enumerate() {
            let distance = (b - target).abs();
            if distance < best {
                best = distance;
                quality = i;
            }
        }

        // one-step ascent: climbing is allowed a single rung at a time when
        // the next rung is already affordable
        if quality > self.last_quality && bitrates_kbps[self.last_quality + 1] <= t {
            quality = self.last_quality + 1;
        }
        if bitrates_kbps[quality] >= t {
            self.q = REACT * self.vl.max(self.q);
            trace!(q = self.q, "recalibrated lagrangian");
        }
        self.last_quality = quality;
        trace!(quality, target_kbps = target, q = self.q, "l2a decision");
        quality
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).fold(0.0, |acc, (x, y)| acc + x * y)
}

/// Euclidean projection onto the probability simplex (Duchi et al.),
/// O(n log n) in the ladder size.
pub(crate) fn project_simplex(v: &[f64]) -> Vec<f64> {
    let n = v.len();
    let mut sorted = v.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut prefix = 0.0;
    let mut theta = None;
    for i in 0..n - 1 {
        prefix += sorted[i];
        let candidate = (prefix - 1.0) / (i + 1) as f64;
        if candidate >= sorted[i + 1] {
            theta = Some(candidate);
            break;
        }
    }
    let theta = theta.unwrap_or((prefix + sorted[n - 1] - 1.0) / n as f64);
    v.iter().map(|x| (x - theta).max(0.0)).collect()
}
