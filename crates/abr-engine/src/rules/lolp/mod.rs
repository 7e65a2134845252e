//! LoL+: SOM classifier with dynamic weight selection and per-segment QoE.

pub(crate) mod som;
pub(crate) mod weights;

use abr_types::Level;
use rand::{RngExt, SeedableRng, rngs::StdRng};
use tracing::trace;

use super::RuleInputs;
use crate::config::WeightSelectionMode;
use crate::qoe::QoeEvaluator;
use som::SomLearner;
use weights::WeightSelector;

#[derive(Debug)]
pub(crate) struct LolpRule {
    som: SomLearner,
    selector: WeightSelector,
    qoe: QoeEvaluator,
    mode: WeightSelectionMode,
    rng: StdRng,
    last_qoe: Option<f64>,
}

impl LolpRule {
    pub fn new(levels: &[Level], seed: u64, mode: WeightSelectionMode) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let bitrates: Vec<f64> = levels.iter().map(|l| f64::from(l.bitrate)).collect();
        let som = SomLearner::new(&bitrates, &mut rng);
        Self {
            som,
            selector: WeightSelector::new(),
            qoe: QoeEvaluator::new(),
            mode,
            rng,
            last_qoe: None,
        }
    }

    pub fn last_qoe(&self) -> Option<f64> {
        self.last_qoe
    }

    pub fn next_quality(&mut self, inputs: &RuleInputs<'_>) -> Option<usize> {
        let throughput_bps = inputs.throughput_kbps * 1000.0;
        if !throughput_bps.is_finite() || throughput_bps <= 0.0 {
            return None;
        }
        let segment_duration = inputs.frag_duration;
        if segment_duration <= 0.0 {
            return None;
        }

        let latency = inputs.live.map_or(0.0, |edge| edge.latency);
        let buffer = inputs.media.buffer.len;
        let playback_rate = inputs.media.playback_rate;
        let current = inputs.current_level.min(inputs.levels.len() - 1);

        let (min_kbps, max_kbps) = ladder_bounds_kbps(inputs.levels);
        self.qoe.setup_per_segment(segment_duration, max_kbps, min_kbps);
        self.qoe.log_segment_metrics(
            f64::from(inputs.levels[current].bitrate) / 1000.0,
            inputs.rebuffer_s,
            latency,
            playback_rate,
        );
        self.last_qoe = self.qoe.per_segment_qoe();

        // a download that would drain the buffer below the floor leaves no
        // room to learn; drop straight to the best affordable rung
        let current_bitrate = self.som.neurons()[current].bitrate;
        let download_time = current_bitrate * segment_duration / throughput_bps;
        if buffer - download_time < self.selector.min_buffer() {
            let down = self.som.down_shift(current, throughput_bps);
            trace!(down, "buffer too low for current rung, downshifting");
            return Some(down);
        }

        match self.mode {
            WeightSelectionMode::Manual => self.som.weights = [0.4; 4],
            WeightSelectionMode::Random => self.som.weights = xavier_weights(&mut self.rng),
            WeightSelectionMode::Dynamic => {
                if let Some(weights) = self.selector.find_weight_vector(
                    self.som.neurons(),
                    latency,
                    buffer,
                    throughput_bps,
                    playback_rate,
                    segment_duration,
                    &self.qoe,
                ) {
                    self.som.weights = weights;
                }
                // infeasible: keep the previous weights
            }
        }

        let min_buffer = self.selector.min_buffer();
        let selector = &self.selector;
        let winner = self.som.best_matching_unit(
            throughput_bps,
            latency,
            buffer,
            segment_duration,
            current,
            min_buffer,
            |bitrate| selector.next_buffer(bitrate, buffer, throughput_bps, segment_duration),
        );
        Some(winner)
    }
}

fn ladder_bounds_kbps(levels: &[Level]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = 0.0f64;
    for level in levels {
        let kbps = f64::from(level.bitrate) / 1000.0;
        min = min.min(kbps);
        max = max.max(kbps);
    }
    (min, max)
}

fn xavier_weights(rng: &mut StdRng) -> [f64; 4] {
    let upper_bound = (2.0f64 / 4.0).sqrt();
    std::array::from_fn(|_| rng.random_range(0.0..upper_bound))
}
