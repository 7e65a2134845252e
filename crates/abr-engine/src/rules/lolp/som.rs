//! Self-organizing map over per-bitrate neurons.
//!
//! One neuron per ladder rung, its state a point in the normalized
//! (throughput, latency, rebuffer, switch) space. Each decision picks the
//! best-matching unit against an ideal target and drags the neighborhood of
//! the current and winning neurons toward what was actually observed.

use rand::{RngExt, rngs::StdRng};
use tracing::trace;

/// Neurons whose bitrate comes within this margin of the available
/// throughput are steered away from, bits per second.
const THROUGHPUT_DELTA: f64 = 10_000.0;
/// Gaussian neighborhood width.
const SIGMA: f64 = 0.1;
/// Per-axis learning rate.
const LEARNING_RATE: [f64; 4] = [0.01, 0.01, 0.01, 0.01];
/// Latency values are normalized by this factor before entering the map.
const LATENCY_NORMALIZATION: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NeuronState {
    pub throughput: f64,
    pub latency: f64,
    pub rebuffer: f64,
    pub switch: f64,
}

impl NeuronState {
    #[inline]
    fn as_array(&self) -> [f64; 4] {
        [self.throughput, self.latency, self.rebuffer, self.switch]
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Neuron {
    pub quality_index: usize,
    /// Rung bitrate, bits per second
    pub bitrate: f64,
    pub state: NeuronState,
}

/// Weighted Euclidean distance with the upstream sign convention: the
/// magnitude is square-rooted and the sign of the weighted sum survives.
pub(crate) fn weighted_distance(a: &[f64; 4], b: &[f64; 4], weights: &[f64; 4]) -> f64 {
    let sum: f64 = (0..4).fold(0.0, |acc, i| {
        acc + weights[i] * (a[i] - b[i]) * (a[i] - b[i])
    });
    sum.signum() * sum.abs().sqrt()
}

#[derive(Debug)]
pub(crate) struct SomLearner {
    neurons: Vec<Neuron>,
    /// L2 norm of the ladder bitrate vector
    bitrate_norm: f64,
    min_bitrate: f64,
    pub(crate) weights: [f64; 4],
}

impl SomLearner {
    pub fn new(bitrates_bps: &[f64], rng: &mut StdRng) -> Self {
        let bitrate_norm = bitrates_bps.iter().map(|b| b * b).sum::<f64>().sqrt().max(1.0);
        let min_bitrate = bitrates_bps.iter().copied().fold(f64::INFINITY, f64::min);
        let neurons: Vec<Neuron> = bitrates_bps
            .iter()
            .enumerate()
            .map(|(quality_index, &bitrate)| Neuron {
                quality_index,
                bitrate,
                state: NeuronState {
                    throughput: bitrate / bitrate_norm,
                    ..Default::default()
                },
            })
            .collect();
        let max_throughput = neurons
            .iter()
            .map(|n| n.state.throughput)
            .fold(0.0, f64::max);
        let centers = kmeans_pp_centers(neurons.len(), max_throughput, rng);
        // weights start from the most central cluster seed
        let weights = *centers.last().expect("at least one center");
        Self {
            neurons,
            bitrate_norm,
            min_bitrate,
            weights,
        }
    }

    #[inline]
    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    pub fn max_throughput(&self) -> f64 {
        self.neurons
            .iter()
            .map(|n| n.state.throughput)
            .fold(0.0, f64::max)
    }

    /// Highest-bitrate neuron strictly below the current one that the
    /// available throughput still affords; the current one when no such
    /// neuron exists.
    pub fn down_shift(&self, current: usize, throughput_bps: f64) -> usize {
        let current_bitrate = self.neurons[current].bitrate;
        let mut best: Option<&Neuron> = None;
        for neuron in &self.neurons {
            if neuron.bitrate < current_bitrate
                && throughput_bps > neuron.bitrate
                && best.is_none_or(|b| neuron.bitrate > b.bitrate)
            {
                best = Some(neuron);
            }
        }
        best.map_or(current, |n| n.quality_index)
    }

    /// One decision step. `weights` must already be set for this round.
    #[allow(clippy::too_many_arguments)]
    pub fn best_matching_unit(
        &mut self,
        throughput_bps: f64,
        latency_s: f64,
        buffer_s: f64,
        segment_duration: f64,
        current: usize,
        min_buffer: f64,
        next_buffer: impl Fn(f64) -> f64,
    ) -> usize {
        let mut throughput_norm = throughput_bps / self.bitrate_norm;
        if throughput_norm > 1.0 {
            throughput_norm = self.max_throughput();
        }
        let latency_norm = latency_s / LATENCY_NORMALIZATION;

        let current_neuron_bitrate = self.neurons[current].bitrate;
        let download_time = current_neuron_bitrate * segment_duration / throughput_bps;
        let rebuffer = (download_time - buffer_s).max(0.0);

        let target = [throughput_norm, 0.0, 0.0, 0.0];
        let mut min_distance = f64::INFINITY;
        let mut winner = current;
        for neuron in &self.neurons {
            let mut distance_weights = self.weights;
            let buffer_low = next_buffer(neuron.bitrate) < min_buffer;
            if (neuron.bitrate > throughput_bps - THROUGHPUT_DELTA || buffer_low)
                && neuron.bitrate != self.min_bitrate
            {
                // steer hard away from unaffordable rungs
                distance_weights[0] = 100.0;
            }
            let distance = weighted_distance(&neuron.state.as_array(), &target, &distance_weights);
            if distance < min_distance {
                min_distance = distance;
                winner = neuron.quality_index;
            }
        }

        let bitrate_switch =
            (current_neuron_bitrate - self.neurons[winner].bitrate).abs() / self.bitrate_norm;
        // punish the current neuron with what actually happened, reward the
        // winner with the ideal it was picked for
        self.update_neurons(current, [throughput_norm, latency_norm, rebuffer, bitrate_switch]);
        self.update_neurons(winner, [throughput_norm, 0.0, 0.0, bitrate_switch]);

        trace!(winner, min_distance, "som best matching unit");
        winner
    }

    fn update_neurons(&mut self, center: usize, x: [f64; 4]) {
        let center_state = self.neurons[center].state.as_array();
        for neuron in &mut self.neurons {
            let neuron_distance = weighted_distance(
                &neuron.state.as_array(),
                &center_state,
                &[1.0, 1.0, 1.0, 1.0],
            );
            let neighborhood = (-neuron_distance * neuron_distance / (2.0 * SIGMA * SIGMA)).exp();
            let state = &mut neuron.state;
            state.throughput += (x[0] - state.throughput) * LEARNING_RATE[0] * neighborhood;
            state.latency += (x[1] - state.latency) * LEARNING_RATE[1] * neighborhood;
            state.rebuffer += (x[2] - state.rebuffer) * LEARNING_RATE[2] * neighborhood;
            state.switch += (x[3] - state.switch) * LEARNING_RATE[3] * neighborhood;
        }
    }
}

/// k-means++-style seeding over synthetic points in
/// `[0, max_throughput] x [0, 1]^3`, re-sorted into a nearest-neighbor chain
/// starting from the least similar center.
fn kmeans_pp_centers(count: usize, max_throughput: f64, rng: &mut StdRng) -> Vec<[f64; 4]> {
    let unit = [1.0, 1.0, 1.0, 1.0];
    let sample_count = count * count;
    let data: Vec<[f64; 4]> = (0..sample_count)
        .map(|_| {
            [
                rng.random_range(0.0..max_throughput.max(f64::MIN_POSITIVE)),
                rng.random::<f64>(),
                rng.random::<f64>(),
                rng.random::<f64>(),
            ]
        })
        .collect();

    let mut centers: Vec<[f64; 4]> = vec![data[0]];
    for _ in 1..count {
        let mut next = data[0];
        let mut max_distance = f64::NEG_INFINITY;
        for point in &data {
            let distance: f64 = centers
                .iter()
                .map(|c| weighted_distance(point, c, &unit))
                .sum();
            if distance > max_distance {
                max_distance = distance;
                next = *point;
            }
        }
        centers.push(next);
    }

    let mut least_similar = 0;
    let mut max_total = f64::NEG_INFINITY;
    for i in 0..centers.len() {
        let total: f64 = centers
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, c)| weighted_distance(&centers[i], c, &unit))
            .sum();
        if total > max_total {
            max_total = total;
            least_similar = i;
        }
    }

    let mut sorted = vec![centers.remove(least_similar)];
    while !centers.is_empty() {
        let last = *sorted.last().expect("non-empty");
        let mut min_index = 0;
        let mut min_distance = f64::INFINITY;
        for (i, center) in centers.iter().enumerate() {
            let distance = weighted_distance(&last, center, &unit);
            if distance < min_distance {
                min_distance = distance;
                min_index = i;
            }
        }
        sorted.push(centers.remove(min_index));
    }
    sorted
}
