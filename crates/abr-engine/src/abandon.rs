//! Emergency download abandonment.
//!
//! While a main-type fragment is in flight, a periodic check projects
//! whether the download can finish before the playback buffer starves. When
//! it cannot, and a lower rung can, the fragment is worth aborting mid-air:
//! the caller receives the level to force and raises the abort.

use abr_types::{Fragment, Level, LoaderStats, MediaState, Part, SegmentId};
use tracing::{debug, warn};

/// Outcome of one abandonment check.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AbandonCheck {
    /// Keep monitoring
    Continue,
    /// Monitoring is no longer needed (request finished, was aborted, or is
    /// already at the floor)
    Disarm,
    /// Abort the in-flight request and force a lower level
    Abort(EmergencyAbort),
}

/// Report raised when an in-flight fragment is abandoned.
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyAbort {
    pub frag_sn: SegmentId,
    pub frag_level: usize,
    pub part_index: Option<u32>,
    /// Level the next load is forced down to
    pub next_load_level: usize,
    /// Loader statistics at the moment of the abort
    pub stats: LoaderStats,
}

/// Project completion of the in-flight request against buffer starvation.
///
/// `stats` is the live progress snapshot of the request (fragment- or
/// part-scoped); `now_ms` the host's monotonic clock.
#[allow(clippy::too_many_arguments)]
pub(crate) fn abandon_rules_check(
    frag: &Fragment,
    part: Option<&Part>,
    stats: &LoaderStats,
    media: &MediaState,
    levels: &[Level],
    min_auto_level: usize,
    bandwidth_factor: f64,
    now_ms: f64,
) -> AbandonCheck {
    let duration = part.map_or(frag.duration, |p| p.duration);
    if stats.aborted || stats.is_complete() || frag.level <= min_auto_level {
        return AbandonCheck::Disarm;
    }
    let Some(level) = levels.get(frag.level) else {
        return AbandonCheck::Disarm;
    };

    let playback_rate = media.effective_rate();
    let request_delay_ms = stats.request_ms(now_ms);
    // leave young requests alone: monitoring starts half a fragment in
    if request_delay_ms <= 500.0 * duration / playback_rate {
        return AbandonCheck::Continue;
    }

    let starvation_delay = (media.buffer.end - media.position) / playback_rate;
    if starvation_delay >= 2.0 * duration / playback_rate {
        return AbandonCheck::Continue;
    }

    let expected_len = stats.total.unwrap_or_else(|| {
        stats
            .loaded
            .max((duration * f64::from(level.max_bitrate()) / 8.0).ceil() as u64)
    });
    let load_rate = stats
        .bw_estimate
        .map(|bw| bw / 8.0)
        .unwrap_or_else(|| stats.loaded as f64 * 1000.0 / request_delay_ms)
        .max(1.0);
    let frag_loaded_delay = expected_len.saturating_sub(stats.loaded) as f64 / load_rate;
    if frag_loaded_delay <= starvation_delay {
        return AbandonCheck::Continue;
    }

    debug!(
        request_delay_ms,
        starvation_delay, frag_loaded_delay, "fragment will not finish before starvation"
    );

    // walk down the ladder for the best rung that still fits the budget
    let mut candidate = None;
    for next_level in (min_auto_level..frag.level).rev() {
        let next_bitrate = f64::from(levels[next_level].max_bitrate());
        let next_delay = duration * next_bitrate / (8.0 * bandwidth_factor * load_rate);
        candidate = Some((next_level, next_delay));
        if next_delay < starvation_delay {
            break;
        }
    }
    let Some((next_load_level, next_delay)) = candidate else {
        return AbandonCheck::Continue;
    };
    if next_delay >= frag_loaded_delay {
        return AbandonCheck::Continue;
    }

    warn!(
        from_level = frag.level,
        to_level = next_load_level,
        next_delay,
        frag_loaded_delay,
        "abandoning in-flight fragment"
    );
    AbandonCheck::Abort(EmergencyAbort {
        frag_sn: frag.sn,
        frag_level: frag.level,
        part_index: part.map(|p| p.index),
        next_load_level,
        stats: stats.clone(),
    })
}
