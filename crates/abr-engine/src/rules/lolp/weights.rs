//! Dynamic weight selection for the SOM distance metric.
//!
//! The candidate space is the Cartesian product of five values over the four
//! distance axes (throughput, latency, buffer, switch). Each decision round
//! scores every feasible (neuron, weight-vector) pair with a single-use QoE
//! and adopts the winning vector; an infeasible round keeps the previous one.

use tracing::trace;

use super::som::Neuron;
use crate::qoe::QoeEvaluator;

const WEIGHT_VALUES: [f64; 5] = [0.2, 0.4, 0.6, 0.8, 1.0];
/// Latency ceiling for candidate neurons, seconds above target.
const TARGET_LATENCY: f64 = 1.5;
/// Buffer floor for candidate neurons, seconds.
const BUFFER_MIN: f64 = 0.3;

#[derive(Debug)]
pub(crate) struct WeightSelector {
    options: Vec<[f64; 4]>,
    previous_latency: f64,
}

impl WeightSelector {
    pub fn new() -> Self {
        let mut options = Vec::with_capacity(WEIGHT_VALUES.len().pow(4));
        for &throughput in &WEIGHT_VALUES {
            for &latency in &WEIGHT_VALUES {
                for &buffer in &WEIGHT_VALUES {
                    for &switch in &WEIGHT_VALUES {
                        options.push([throughput, latency, buffer, switch]);
                    }
                }
            }
        }
        Self {
            options,
            previous_latency: 0.0,
        }
    }

    #[cfg(test)]
    pub fn options(&self) -> &[[f64; 4]] {
        &self.options
    }

    #[inline]
    pub fn min_buffer(&self) -> f64 {
        BUFFER_MIN
    }

    /// Buffer level after downloading one segment at `bitrate_bps`.
    pub fn next_buffer(
        &self,
        bitrate_bps: f64,
        current_buffer: f64,
        throughput_bps: f64,
        segment_duration: f64,
    ) -> f64 {
        let download_time = bitrate_bps * segment_duration / throughput_bps;
        if download_time > segment_duration {
            current_buffer - segment_duration
        } else {
            current_buffer + segment_duration - download_time
        }
    }

    /// The weight vector maximizing single-use QoE over all feasible
    /// neurons, or `None` when no (neuron, vector) pair satisfies the
    /// buffer/latency constraints.
    #[allow(clippy::too_many_arguments)]
    pub fn find_weight_vector(
        &mut self,
        neurons: &[Neuron],
        current_latency: f64,
        current_buffer: f64,
        current_throughput_bps: f64,
        playback_rate: f64,
        segment_duration: f64,
        qoe: &QoeEvaluator,
    ) -> Option<[f64; 4]> {
        let delta_latency = (current_latency - self.previous_latency).abs();
        let mut max_qoe = f64::NEG_INFINITY;
        let mut winner: Option<[f64; 4]> = None;

        for neuron in neurons {
            let download_time = neuron.bitrate * segment_duration / current_throughput_bps;
            let next_buffer = self.next_buffer(
                neuron.bitrate,
                current_buffer,
                current_throughput_bps,
                segment_duration,
            );
            let rebuffer = (download_time - next_buffer).max(1e-5);
            if next_buffer < BUFFER_MIN {
                continue;
            }
            if neuron.state.latency > TARGET_LATENCY + delta_latency {
                continue;
            }
            for vector in &self.options {
                let inverse = |weight: f64| if weight > 0.0 { 1.0 / weight } else { 10.0 };
                let value = qoe.calculate_single_use_qoe(
                    neuron.bitrate,
                    inverse(vector[2]) * rebuffer,
                    inverse(vector[1]) * neuron.state.latency,
                    playback_rate,
                );
                if value > max_qoe {
                    max_qoe = value;
                    winner = Some(*vector);
                }
            }
        }

        self.previous_latency = current_latency;
        trace!(feasible = winner.is_some(), max_qoe, "weight selection");
        winner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::lolp::som::SomLearner;
    use rand::{SeedableRng, rngs::StdRng};

    fn neurons() -> Vec<Neuron> {
        let mut rng = StdRng::seed_from_u64(1);
        let som = SomLearner::new(&[300e3, 750e3, 1500e3, 3000e3], &mut rng);
        som.neurons().to_vec()
    }

    fn qoe() -> QoeEvaluator {
        let mut qoe = QoeEvaluator::new();
        qoe.setup_per_segment(2.0, 3000.0, 300.0);
        qoe
    }

    #[test]
    fn test_exactly_625_options() {
        let selector = WeightSelector::new();
        assert_eq!(selector.options().len(), 625);
        for vector in selector.options() {
            for &weight in vector {
                assert!(WEIGHT_VALUES.contains(&weight));
            }
        }
    }

    #[test]
    fn test_winner_is_an_enumerated_option() {
        let mut selector = WeightSelector::new();
        let winner = selector
            .find_weight_vector(&neurons(), 1.0, 4.0, 4_000_000.0, 1.0, 2.0, &qoe())
            .expect("feasible conditions");
        assert!(selector.options().contains(&winner));
    }

    #[test]
    fn test_infeasible_returns_none() {
        let mut selector = WeightSelector::new();
        // throughput so low every rung drains the buffer below the floor
        let winner =
            selector.find_weight_vector(&neurons(), 1.0, 0.2, 50_000.0, 1.0, 2.0, &qoe());
        assert_eq!(winner, None);
    }

    #[test]
    fn test_next_buffer_fast_and_slow_downloads() {
        let selector = WeightSelector::new();
        // download in half a segment duration: buffer grows by the other half
        let grown = selector.next_buffer(1_000_000.0, 4.0, 2_000_000.0, 2.0);
        assert!((grown - 5.0).abs() < 1e-12);
        // download slower than realtime: buffer shrinks by a full segment
        let shrunk = selector.next_buffer(3_000_000.0, 4.0, 1_000_000.0, 2.0);
        assert!((shrunk - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_previous_latency_tracks_calls() {
        let mut selector = WeightSelector::new();
        selector.find_weight_vector(&neurons(), 2.0, 4.0, 4_000_000.0, 1.0, 2.0, &qoe());
        assert_eq!(selector.previous_latency, 2.0);
    }
}
