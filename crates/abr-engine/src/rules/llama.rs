//! Llama: harmonic-mean throughput heuristic with hysteresis.
//!
//! Down-switches react to the latest raw throughput alone; up-switches
//! additionally require the harmonic mean of recent samples to clear the
//! next rung, which damps oscillation around a noisy estimate.

use std::collections::VecDeque;

use abr_types::MediaKind;
use tracing::trace;

use super::RuleInputs;

/// Samples kept for the harmonic mean.
const WINDOW: usize = 10;
/// Decisions are withheld this many fragments after session start.
const WARMUP_FRAGMENTS: u64 = 5;
/// Multiplier applied to the harmonic mean before comparing against rungs.
const SAFETY_FACTOR: f64 = 1.0;

#[derive(Debug, Default)]
pub(crate) struct LlamaRule {
    /// Reciprocals of recent throughput samples, bits/s
    reciprocals: VecDeque<f64>,
    /// First sequence number seen this session
    first_sn: Option<u64>,
}

impl LlamaRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_stall(&mut self) {
        self.first_sn = None;
    }

    pub fn next_quality(&mut self, inputs: &RuleInputs<'_>) -> Option<usize> {
        let current = inputs.current_level.min(inputs.levels.len() - 1);
        if inputs.kind == MediaKind::Audio {
            return Some(current);
        }

        let throughput_bps = inputs.last_throughput_kbps * 1000.0;
        if throughput_bps > 0.0 {
            self.reciprocals.push_back(1.0 / throughput_bps);
            if self.reciprocals.len() > WINDOW {
                self.reciprocals.pop_front();
            }
        }

        let sn = inputs.frag_sn?;
        let first_sn = *self.first_sn.get_or_insert(sn);
        if sn.abs_diff(first_sn) < WARMUP_FRAGMENTS {
            return Some(current);
        }
        if self.reciprocals.is_empty() {
            return Some(current);
        }

        let harmonic_mean =
            self.reciprocals.len() as f64 / self.reciprocals.iter().sum::<f64>() * SAFETY_FACTOR;

        let mut quality = current;
        if throughput_bps < f64::from(inputs.levels[current].bitrate) {
            quality = current.saturating_sub(1);
        } else if current + 1 < inputs.levels.len() {
            let next_bitrate = f64::from(inputs.levels[current + 1].bitrate);
            // The buffer gate compares against -1 s and therefore always
            // passes; kept for parity with the published rule.
            if harmonic_mean > next_bitrate
                && throughput_bps > next_bitrate
                && inputs.media.buffer.len >= -1.0
            {
                quality = current + 1;
            }
        }

        trace!(
            harmonic_mean_bps = harmonic_mean,
            throughput_bps, quality, "llama decision"
        );
        Some(quality.min(inputs.levels.len() - 1))
    }
}
