//! The four interchangeable decision rules.
//!
//! Every rule consumes the same input record and answers with a ladder index
//! or abstains (`None`), in which case the orchestrator keeps the current
//! quality. Dispatch happens once per decision through a tagged variant so
//! the hot path stays monomorphic.

pub mod l2a;
pub mod llama;
pub mod lolp;
pub mod stallion;

use abr_types::{Level, LiveEdge, MediaKind, MediaState};
use tracing::debug;

use crate::config::{AbrConfig, RuleKind};
use l2a::L2ARule;
use llama::LlamaRule;
use lolp::LolpRule;
use stallion::StallionRule;

/// Immutable inputs for one decision, assembled by the orchestrator.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RuleInputs<'a> {
    pub levels: &'a [Level],
    /// Ladder index currently playing (last loaded fragment level)
    pub current_level: usize,
    /// Smoothed safe throughput from the bandwidth estimator, kbit/s
    pub throughput_kbps: f64,
    /// Measured throughput of the most recent fragment, kbit/s (0 before the
    /// first fragment completes)
    pub last_throughput_kbps: f64,
    pub media: &'a MediaState,
    pub live: Option<LiveEdge>,
    /// Duration of the fragment or part being decided for, seconds
    pub frag_duration: f64,
    /// Sequence number of the fragment currently in flight, if any
    pub frag_sn: Option<u64>,
    pub kind: MediaKind,
    /// Stall time accrued since the previous decision, seconds
    pub rebuffer_s: f64,
}

/// Active rule instance. Created lazily on first use of a tag, dropped when
/// the tag changes.
#[derive(Debug)]
pub(crate) enum RuleEngine {
    LoLp(LolpRule),
    L2A(L2ARule),
    Stallion(StallionRule),
    Llama(LlamaRule),
}

impl RuleEngine {
    pub fn create(kind: RuleKind, levels: &[Level], config: &AbrConfig) -> Self {
        debug!(rule = kind.tag(), "creating ABR rule");
        match kind {
            RuleKind::LoLp => {
                RuleEngine::LoLp(LolpRule::new(levels, config.seed, config.lolp_weight_mode))
            }
            RuleKind::L2A => RuleEngine::L2A(L2ARule::new(levels.len())),
            RuleKind::Stallion => RuleEngine::Stallion(StallionRule::new()),
            RuleKind::Llama => RuleEngine::Llama(LlamaRule::new()),
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            RuleEngine::LoLp(_) => RuleKind::LoLp,
            RuleEngine::L2A(_) => RuleKind::L2A,
            RuleEngine::Stallion(_) => RuleKind::Stallion,
            RuleEngine::Llama(_) => RuleKind::Llama,
        }
    }

    /// Next quality index, or `None` to keep the current one.
    pub fn next_quality(&mut self, inputs: &RuleInputs<'_>) -> Option<usize> {
        if inputs.levels.is_empty() {
            return None;
        }
        if inputs.levels.len() == 1 {
            return Some(0);
        }
        match self {
            RuleEngine::LoLp(rule) => rule.next_quality(inputs),
            RuleEngine::L2A(rule) => rule.next_quality(inputs),
            RuleEngine::Stallion(rule) => rule.next_quality(inputs),
            RuleEngine::Llama(rule) => rule.next_quality(inputs),
        }
    }

    /// Per-segment accounting once a fragment has fully parsed.
    pub fn on_fragment_complete(&mut self, duration_s: f64, throughput_kbps: f64) {
        if let RuleEngine::L2A(rule) = self {
            rule.on_fragment_complete(duration_s, throughput_kbps);
        }
    }

    /// Playback stalled; rules fall back to their startup behavior.
    pub fn on_stall(&mut self) {
        match self {
            RuleEngine::L2A(rule) => rule.on_stall(),
            RuleEngine::Llama(rule) => rule.on_stall(),
            _ => {}
        }
    }

    /// Most recent per-segment QoE, surfaced as an observability output.
    pub fn last_qoe(&self) -> Option<f64> {
        match self {
            RuleEngine::LoLp(rule) => rule.last_qoe(),
            _ => None,
        }
    }
}

/// Highest ladder index affordable at `throughput_kbps`, with the
/// live-latency dead-time adjustment.
///
/// When the latency drift consumes the whole fragment duration there is no
/// effective download window left and the floor rendition is returned;
/// smaller drifts shrink the usable throughput proportionally.
pub(crate) fn quality_for_bitrate(
    levels: &[Level],
    throughput_kbps: f64,
    live: Option<LiveEdge>,
    frag_duration: f64,
) -> usize {
    let mut throughput = throughput_kbps;
    if let Some(edge) = live {
        if frag_duration > 0.0 {
            let drift = edge.drift();
            if drift >= frag_duration {
                return 0;
            }
            throughput *= 1.0 - drift / frag_duration;
        }
    }
    let budget_bps = throughput * 1000.0;
    let mut quality = 0;
    for (index, level) in levels.iter().enumerate() {
        if f64::from(level.bitrate) <= budget_bps {
            quality = index;
        }
    }
    quality
}

#[cfg(test)]
pub(crate) fn test_ladder(bitrates_kbps: &[u32]) -> Vec<Level> {
    bitrates_kbps
        .iter()
        .map(|kbps| Level::new(kbps * 1000, "avc1"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_for_bitrate_plain() {
        let levels = test_ladder(&[300, 750, 1500, 3000]);
        assert_eq!(quality_for_bitrate(&levels, 200.0, None, 2.0), 0);
        assert_eq!(quality_for_bitrate(&levels, 800.0, None, 2.0), 1);
        assert_eq!(quality_for_bitrate(&levels, 2000.0, None, 2.0), 2);
        assert_eq!(quality_for_bitrate(&levels, 9000.0, None, 2.0), 3);
    }

    #[test]
    fn test_dead_time_shrinks_throughput() {
        let levels = test_ladder(&[300, 750, 1500, 3000]);
        let edge = LiveEdge {
            latency: 2.5,
            target_latency: 1.5,
        };
        // drift 1.0 of a 2.0 s fragment halves effective throughput
        assert_eq!(quality_for_bitrate(&levels, 2000.0, Some(edge), 2.0), 1);
    }

    #[test]
    fn test_dead_time_exhausted_returns_floor() {
        let levels = test_ladder(&[300, 750, 1500, 3000]);
        let edge = LiveEdge {
            latency: 4.0,
            target_latency: 1.5,
        };
        assert_eq!(quality_for_bitrate(&levels, 9000.0, Some(edge), 2.0), 0);
    }

    #[test]
    fn test_one_bitrate_ladder_short_circuits() {
        let levels = test_ladder(&[800]);
        let media = MediaState::default();
        let inputs = RuleInputs {
            levels: &levels,
            current_level: 0,
            throughput_kbps: f64::NAN,
            last_throughput_kbps: 0.0,
            media: &media,
            live: None,
            frag_duration: 2.0,
            frag_sn: None,
            kind: MediaKind::Main,
            rebuffer_s: 0.0,
        };
        let config = AbrConfig {
            seed: 7,
            ..Default::default()
        };
        for kind in [
            RuleKind::LoLp,
            RuleKind::L2A,
            RuleKind::Stallion,
            RuleKind::Llama,
        ] {
            let mut rule = RuleEngine::create(kind, &levels, &config);
            assert_eq!(rule.next_quality(&inputs), Some(0));
        }
    }
}
