//! Stallion: mean-minus-k-sigma throughput with a latency safety band.
//!
//! Throughput is discounted by one standard deviation and latency inflated
//! by 1.25 standard deviations before the affordability search runs, so a
//! jittery connection is treated as slower and laggier than its averages
//! suggest.

use std::collections::VecDeque;

use abr_types::LiveEdge;
use tracing::trace;

use super::{RuleInputs, quality_for_bitrate};

const THROUGHPUT_SAMPLE_AMOUNT: usize = 3;
const LATENCY_SAMPLE_AMOUNT: usize = 4;
const THROUGHPUT_SAFETY_SIGMA: f64 = 1.0;
const LATENCY_SAFETY_SIGMA: f64 = 1.25;

#[derive(Debug, Default)]
pub(crate) struct StallionRule {
    throughput_kbps: VecDeque<f64>,
    latency_s: VecDeque<f64>,
}

fn mean(samples: &VecDeque<f64>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn stdev(samples: &VecDeque<f64>, mean: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let variance = samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / samples.len() as f64;
    variance.sqrt()
}

impl StallionRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_quality(&mut self, inputs: &RuleInputs<'_>) -> Option<usize> {
        let throughput = if inputs.last_throughput_kbps > 0.0 {
            inputs.last_throughput_kbps
        } else {
            inputs.throughput_kbps
        };
        if !throughput.is_finite() || throughput <= 0.0 {
            return None;
        }

        self.throughput_kbps.push_back(throughput);
        if self.throughput_kbps.len() > THROUGHPUT_SAMPLE_AMOUNT {
            self.throughput_kbps.pop_front();
        }
        self.latency_s
            .push_back(inputs.live.map_or(0.0, |edge| edge.latency));
        if self.latency_s.len() > LATENCY_SAMPLE_AMOUNT {
            self.latency_s.pop_front();
        }

        let tp_mean = mean(&self.throughput_kbps);
        let bitrate_safe = tp_mean - THROUGHPUT_SAFETY_SIGMA * stdev(&self.throughput_kbps, tp_mean);
        let lat_mean = mean(&self.latency_s);
        let latency_safe = lat_mean + LATENCY_SAFETY_SIGMA * stdev(&self.latency_s, lat_mean);

        if inputs.live.is_none() {
            // On-demand playback is stateless per call; the windows stay
            // empty on pure VoD paths.
            self.throughput_kbps.pop_back();
            self.latency_s.pop_back();
            return Some(quality_for_bitrate(
                inputs.levels,
                bitrate_safe,
                None,
                inputs.frag_duration,
            ));
        }

        let edge = inputs.live?;
        let safe_edge = LiveEdge {
            latency: latency_safe,
            target_latency: edge.target_latency,
        };
        trace!(bitrate_safe, latency_safe, "stallion safety bands");
        if safe_edge.drift() < inputs.frag_duration && inputs.media.buffer.len > 0.0 {
            return Some(quality_for_bitrate(
                inputs.levels,
                bitrate_safe,
                Some(safe_edge),
                inputs.frag_duration,
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_ladder;
    use abr_types::{BufferInfo, MediaKind, MediaState};

    fn live_inputs<'a>(
        levels: &'a [abr_types::Level],
        media: &'a MediaState,
        tp_kbps: f64,
        latency: f64,
    ) -> RuleInputs<'a> {
        RuleInputs {
            levels,
            current_level: 0,
            throughput_kbps: tp_kbps,
            last_throughput_kbps: tp_kbps,
            media,
            live: Some(LiveEdge {
                latency,
                target_latency: 1.5,
            }),
            frag_duration: 2.0,
            frag_sn: Some(1),
            kind: MediaKind::Main,
            rebuffer_s: 0.0,
        }
    }

    fn buffered_media() -> MediaState {
        MediaState {
            position: 10.0,
            buffer: BufferInfo { len: 4.0, end: 14.0 },
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_variance_degenerates_to_mean() {
        let levels = test_ladder(&[300, 750, 1500, 3000]);
        let media = buffered_media();
        let mut rule = StallionRule::new();
        let mut pick = None;
        for _ in 0..4 {
            pick = rule.next_quality(&live_inputs(&levels, &media, 2000.0, 1.5));
        }
        // zero spread: bitrate_safe == 2000, latency_safe == target
        assert_eq!(pick, Some(2));
    }

    #[test]
    fn test_variance_discounts_throughput() {
        let levels = test_ladder(&[300, 750, 1500, 3000]);
        let media = buffered_media();
        let mut rule = StallionRule::new();
        rule.next_quality(&live_inputs(&levels, &media, 1000.0, 1.5));
        rule.next_quality(&live_inputs(&levels, &media, 2200.0, 1.5));
        let pick = rule.next_quality(&live_inputs(&levels, &media, 1600.0, 1.5));
        // mean 1600, sigma ~490: safe bitrate ~1110 affords level 1 only
        assert_eq!(pick, Some(1));
    }

    #[test]
    fn test_excess_latency_band_abstains() {
        let levels = test_ladder(&[300, 750, 1500, 3000]);
        let media = buffered_media();
        let mut rule = StallionRule::new();
        // latency safety band lands 4s from target, beyond the 2s fragment
        let pick = rule.next_quality(&live_inputs(&levels, &media, 2000.0, 5.5));
        assert_eq!(pick, None);
    }

    #[test]
    fn test_empty_buffer_abstains() {
        let levels = test_ladder(&[300, 750, 1500, 3000]);
        let media = MediaState::default();
        let mut rule = StallionRule::new();
        let pick = rule.next_quality(&live_inputs(&levels, &media, 2000.0, 1.5));
        assert_eq!(pick, None);
    }

    #[test]
    fn test_vod_windows_stay_empty() {
        let levels = test_ladder(&[300, 750, 1500, 3000]);
        let media = buffered_media();
        let mut rule = StallionRule::new();
        let mut vod = live_inputs(&levels, &media, 2000.0, 0.0);
        vod.live = None;
        for _ in 0..5 {
            assert_eq!(rule.next_quality(&vod), Some(2));
        }
        assert!(rule.throughput_kbps.is_empty());
        assert!(rule.latency_s.is_empty());
    }

    #[test]
    fn test_window_sizes_bounded() {
        let levels = test_ladder(&[300, 750, 1500, 3000]);
        let media = buffered_media();
        let mut rule = StallionRule::new();
        for i in 0..10 {
            rule.next_quality(&live_inputs(&levels, &media, 1000.0 + i as f64, 1.5));
        }
        assert_eq!(rule.throughput_kbps.len(), THROUGHPUT_SAMPLE_AMOUNT);
        assert_eq!(rule.latency_s.len(), LATENCY_SAMPLE_AMOUNT);
    }
}
