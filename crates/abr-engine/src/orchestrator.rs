//! Orchestration of the decision engine.
//!
//! The orchestrator owns the bandwidth estimator, at most one active rule,
//! and the per-fragment monitoring state. Hosts forward lifecycle events
//! (`LEVEL_LOADED`, `FRAG_LOADING`, `FRAG_LOADED`, `FRAG_PARSED`,
//! `FRAG_BUFFERED`, errors) and ask for [`AbrOrchestrator::next_auto_level`]
//! at each segment or part boundary. All methods are synchronous; every
//! failure mode resolves to a valid ladder index.

use abr_types::{
    BufferInfo, Fragment, Level, LevelDetails, LiveEdge, LoaderStats, MediaKind, MediaState, Part,
};
use tracing::{debug, trace};

use crate::abandon::{AbandonCheck, EmergencyAbort, abandon_rules_check};
use crate::bandwidth::{BandwidthEstimator, box_throughput_sample};
use crate::catchup::CatchupController;
use crate::config::{AbrConfig, RuleKind};
use crate::error::AbrError;
use crate::rules::{RuleEngine, RuleInputs};

/// Host-observed error conditions the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorEvent {
    FragLoadError,
    FragLoadTimeout,
    BufferStalled,
}

/// Per-decision inputs snapshotted by the host.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs {
    pub media: MediaState,
    /// Live-edge state, `None` for on-demand playback
    pub live: Option<LiveEdge>,
    pub min_auto_level: usize,
    pub max_auto_level: usize,
    /// Stall time accrued since the previous decision, seconds
    pub rebuffer_s: f64,
}

/// One decision: the level to load next, an optional playback-rate
/// correction, and the observability-only LoL+ QoE value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbrDecision {
    pub level: usize,
    /// Rate the host should write to the media element, when a catch-up
    /// correction is wanted
    pub playback_rate: Option<f64>,
    /// Per-segment QoE of the active rule, when it computes one
    pub qoe: Option<f64>,
}

#[derive(Debug)]
pub struct AbrOrchestrator {
    config: AbrConfig,
    levels: Vec<Level>,
    bwe: BandwidthEstimator,
    catchup: CatchupController,
    rule_tag: Option<RuleKind>,
    rule: Option<RuleEngine>,
    frag_current: Option<Fragment>,
    part_current: Option<Part>,
    last_loaded_frag_level: Option<usize>,
    /// Measured throughput of the most recent buffered fragment, kbit/s
    last_throughput_kbps: f64,
    /// Processing time of the last bitrate-test fragment, seconds
    bitrate_test_delay: f64,
    /// Externally or emergency-forced cap on the next decision
    forced_level: Option<usize>,
    timer_armed: bool,
    destroyed: bool,
}

impl AbrOrchestrator {
    pub fn new(config: AbrConfig, levels: Vec<Level>) -> Result<Self, AbrError> {
        config.validate()?;
        if levels.is_empty() {
            return Err(AbrError::EmptyLadder);
        }
        let ewma = &config.ewma;
        let bwe = BandwidthEstimator::new(ewma.slow_vod, ewma.fast_vod, ewma.default_estimate);
        let catchup = CatchupController::new(config.catchup);
        let rule_tag = config.rule;
        Ok(Self {
            config,
            levels,
            bwe,
            catchup,
            rule_tag,
            rule: None,
            frag_current: None,
            part_current: None,
            last_loaded_frag_level: None,
            last_throughput_kbps: 0.0,
            bitrate_test_delay: 0.0,
            forced_level: None,
            timer_armed: false,
            destroyed: false,
        })
    }

    #[inline]
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Replace the ladder; the active rule restarts from scratch since its
    /// learned state is tied to the rung layout.
    pub fn set_levels(&mut self, levels: Vec<Level>) -> Result<(), AbrError> {
        if levels.is_empty() {
            return Err(AbrError::EmptyLadder);
        }
        self.levels = levels;
        self.rule = None;
        self.last_loaded_frag_level = None;
        Ok(())
    }

    /// Switch the active rule tag. The old rule is torn down immediately;
    /// the new one is instantiated lazily on the next decision.
    pub fn set_rule(&mut self, rule: Option<RuleKind>) {
        if rule != self.rule_tag {
            debug!(
                old = self.rule_tag.map(|r| r.tag()),
                new = rule.map(|r| r.tag()),
                "switching ABR rule"
            );
            self.rule = None;
            self.rule_tag = rule;
        }
    }

    #[inline]
    pub fn active_rule(&self) -> Option<RuleKind> {
        self.rule_tag
    }

    /// Current bandwidth estimate, bits per second.
    #[inline]
    pub fn bw_estimate(&self) -> f64 {
        self.bwe.estimate()
    }

    /// Forward-buffer snapshot from the media element's buffered ranges,
    /// using the configured hole tolerance.
    pub fn buffer_info(&self, position: f64, ranges: &[(f64, f64)]) -> BufferInfo {
        BufferInfo::from_ranges(position, ranges, self.config.max_buffer_hole)
    }

    #[inline]
    pub fn can_estimate(&self) -> bool {
        self.bwe.can_estimate()
    }

    /// Externally force (or clear) the cap on upcoming decisions. This is
    /// the writable side of `nextLoadLevel`.
    pub fn force_next_level(&mut self, level: Option<usize>) {
        self.forced_level = level;
    }

    #[inline]
    pub fn forced_level(&self) -> Option<usize> {
        self.forced_level
    }

    #[inline]
    pub fn last_loaded_level(&self) -> Option<usize> {
        self.last_loaded_frag_level
    }

    /// Whether the abandonment check is currently armed.
    #[inline]
    pub fn monitoring(&self) -> bool {
        self.timer_armed
    }

    /// Tear down listeners and timers; all subsequent events are ignored.
    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.clear_timer();
        self.rule = None;
        self.frag_current = None;
        self.part_current = None;
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    // --- Event handlers ---

    /// A level playlist finished loading: record its details and reprofile
    /// the estimator's half-lives for live or on-demand playback.
    pub fn on_level_loaded(&mut self, level: usize, details: LevelDetails) {
        if self.destroyed {
            return;
        }
        if let Some(entry) = self.levels.get_mut(level) {
            entry.details = Some(details);
        }
        let ewma = &self.config.ewma;
        if details.live {
            self.bwe.update(ewma.slow_live, ewma.fast_live);
        } else {
            self.bwe.update(ewma.slow_vod, ewma.fast_vod);
        }
    }

    /// A fragment (or part) request went out; main-type media arms the
    /// abandonment check.
    pub fn on_frag_loading(&mut self, frag: &Fragment, part: Option<&Part>) {
        if self.destroyed {
            return;
        }
        self.frag_current = Some(frag.clone());
        self.part_current = part.cloned();
        if frag.kind == MediaKind::Main && !frag.sn.is_init() {
            self.timer_armed = true;
        }
    }

    /// A fragment finished loading: stop monitoring, record the level, and
    /// fold the bytes into the level accumulator. Bitrate-test fragments are
    /// never buffered, so their buffered handling is synthesized here.
    pub fn on_frag_loaded(&mut self, frag: &Fragment, part: Option<&Part>) {
        if self.destroyed {
            return;
        }
        if frag.kind != MediaKind::Main || frag.sn.is_init() {
            return;
        }
        self.clear_timer();
        self.last_loaded_frag_level = Some(frag.level);
        self.forced_level = None;
        if self.config.max_with_real_bitrate {
            let stats = part.map_or(&frag.stats, |p| &p.stats);
            let duration = part.map_or(frag.duration, |p| p.duration);
            if let Some(level) = self.levels.get_mut(frag.level) {
                level.record_loaded(stats.loaded, duration);
            }
        }
        if frag.bitrate_test {
            self.on_frag_buffered(frag, part);
        }
    }

    /// Per-segment accounting for the active rule once the fragment has
    /// fully parsed.
    pub fn on_frag_parsed(&mut self, frag: &Fragment) {
        if self.destroyed {
            return;
        }
        if frag.kind != MediaKind::Main || frag.sn.is_init() {
            return;
        }
        let throughput_kbps = fragment_throughput_kbps(&frag.stats);
        if let Some(rule) = self.rule.as_mut() {
            rule.on_fragment_complete(frag.duration, throughput_kbps);
        }
    }

    /// A fragment reached the media buffer: the one throughput sample per
    /// fragment happens here.
    pub fn on_frag_buffered(&mut self, frag: &Fragment, part: Option<&Part>) {
        if self.destroyed {
            return;
        }
        let stats = part.map_or(&frag.stats, |p| &p.stats);
        if stats.aborted {
            return;
        }
        if frag.kind != MediaKind::Main || frag.sn.is_init() {
            return;
        }
        // parsing-to-request covers the whole useful transfer; loading end
        // may be amended later by the stream controller
        let processing_ms = stats.processing_ms();
        let (duration_ms, bytes) = if self.config.box_throughput_sampling {
            box_throughput_sample(stats).unwrap_or((processing_ms, stats.loaded))
        } else {
            (processing_ms, stats.loaded)
        };
        self.bwe.sample(duration_ms, bytes);
        self.last_throughput_kbps = fragment_throughput_kbps(stats);
        self.bitrate_test_delay = if frag.bitrate_test {
            processing_ms / 1000.0
        } else {
            0.0
        };
        trace!(
            duration_ms,
            bytes,
            estimate_bps = self.bwe.estimate(),
            "fragment buffered"
        );
    }

    pub fn on_error(&mut self, error: ErrorEvent) {
        if self.destroyed {
            return;
        }
        match error {
            ErrorEvent::FragLoadError | ErrorEvent::FragLoadTimeout => self.clear_timer(),
            ErrorEvent::BufferStalled => {
                if let Some(rule) = self.rule.as_mut() {
                    rule.on_stall();
                }
            }
        }
    }

    /// Periodic abandonment check while a fragment loads. `stats` is the
    /// live progress snapshot of the in-flight request. On abort the
    /// estimator is seeded with the partial transfer and the returned level
    /// caps upcoming decisions.
    pub fn on_abandon_tick(
        &mut self,
        media: &MediaState,
        stats: &LoaderStats,
        min_auto_level: usize,
        now_ms: f64,
    ) -> Option<EmergencyAbort> {
        if self.destroyed || !self.timer_armed {
            return None;
        }
        let frag = self.frag_current.as_ref()?;
        match abandon_rules_check(
            frag,
            self.part_current.as_ref(),
            stats,
            media,
            &self.levels,
            min_auto_level,
            self.config.bandwidth_factor,
            now_ms,
        ) {
            AbandonCheck::Continue => None,
            AbandonCheck::Disarm => {
                self.clear_timer();
                self.forced_level = None;
                None
            }
            AbandonCheck::Abort(abort) => {
                self.bwe.sample(stats.request_ms(now_ms), stats.loaded);
                self.forced_level = Some(abort.next_load_level);
                self.clear_timer();
                Some(abort)
            }
        }
    }

    // --- Decision ---

    /// The next level to load, decided by the active rule or the
    /// conservative fallback, plus the catch-up rate correction.
    pub fn next_auto_level(&mut self, inputs: &DecisionInputs) -> AbrDecision {
        let level = self.compute_next_level(inputs);
        let playback_rate = self.catchup.playback_rate(&inputs.media, inputs.live);
        let qoe = self.rule.as_ref().and_then(RuleEngine::last_qoe);
        trace!(level, ?playback_rate, "abr decision");
        AbrDecision {
            level,
            playback_rate,
            qoe,
        }
    }

    fn compute_next_level(&mut self, inputs: &DecisionInputs) -> usize {
        self.ensure_rule();

        let forced = self.forced_level;
        // a forced level with no reliable bandwidth yet is taken at face
        // value; once samples exist it only caps the computed choice
        if let Some(forced) = forced {
            if !self.bwe.can_estimate() {
                return self.sanitize_level(forced, inputs);
            }
        }

        let current =
            self.last_loaded_frag_level.unwrap_or(0).min(self.levels.len() - 1);
        let computed = if self.rule.is_some() {
            let frag_duration = self.decision_frag_duration();
            let frag_sn = self.frag_current.as_ref().and_then(|f| f.sn.sn());
            let kind = self
                .frag_current
                .as_ref()
                .map_or(MediaKind::Main, |f| f.kind);
            let rule_inputs = RuleInputs {
                levels: &self.levels,
                current_level: current,
                throughput_kbps: self.bwe.estimate() / 1000.0,
                last_throughput_kbps: self.last_throughput_kbps,
                media: &inputs.media,
                live: inputs.live,
                frag_duration,
                frag_sn,
                kind,
                rebuffer_s: inputs.rebuffer_s,
            };
            let rule = self.rule.as_mut().expect("rule checked above");
            rule.next_quality(&rule_inputs).unwrap_or(current)
        } else {
            self.fallback_level(inputs)
        };

        let mut level = self.sanitize_level(computed, inputs);
        if let Some(forced) = forced {
            level = level.min(self.sanitize_level(forced, inputs));
        }
        level
    }

    fn ensure_rule(&mut self) {
        match (self.rule.as_ref(), self.rule_tag) {
            (Some(rule), Some(tag)) if rule.kind() == tag => {}
            (None, None) => {}
            (_, None) => self.rule = None,
            (_, Some(tag)) => {
                self.rule = Some(RuleEngine::create(tag, &self.levels, &self.config));
            }
        }
    }

    /// Clamp into the auto-level window and keep the choice inside the
    /// codec family of the last loaded level.
    fn sanitize_level(&self, level: usize, inputs: &DecisionInputs) -> usize {
        let max = inputs.max_auto_level.min(self.levels.len() - 1);
        let min = inputs.min_auto_level.min(max);
        let mut level = level.clamp(min, max);
        if let Some(current) = self.last_loaded_frag_level {
            if let Some(codec) = self.levels.get(current).map(|l| l.codec_set.as_str()) {
                if self.levels[level].codec_set != codec {
                    let below = (min..=level)
                        .rev()
                        .find(|&i| self.levels[i].codec_set == codec);
                    let above = (level..=max).find(|&i| self.levels[i].codec_set == codec);
                    if let Some(candidate) = below.or(above) {
                        level = candidate;
                    }
                }
            }
        }
        level
    }

    /// Conservative search used when no rule is active: the highest level
    /// whose discounted bandwidth affords it within the starvation budget.
    fn fallback_level(&self, inputs: &DecisionInputs) -> usize {
        let frag_duration = self.current_frag_duration();
        let media = &inputs.media;
        let avg_bw = self.bwe.estimate();
        let starvation_delay = media.starvation_delay();
        let mut bw_factor = self.config.bandwidth_factor;
        let mut bw_up_factor = self.config.bandwidth_up_factor;

        if starvation_delay > 0.0 {
            if let Some(best) =
                self.find_best_level(avg_bw, inputs, starvation_delay, bw_factor, bw_up_factor)
            {
                return best;
            }
        }

        // rebuffering is unavoidable; allow a bounded starvation budget
        let mut max_starvation_delay = if frag_duration > 0.0 {
            frag_duration.min(self.config.max_starvation_delay)
        } else {
            self.config.max_starvation_delay
        };
        if starvation_delay == 0.0 && self.bitrate_test_delay > 0.0 {
            // a bitrate test just measured the link; spend the remaining
            // loading budget without conservative discounts
            let max_loading_delay = if frag_duration > 0.0 {
                frag_duration.min(self.config.max_loading_delay)
            } else {
                self.config.max_loading_delay
            };
            max_starvation_delay = max_loading_delay - self.bitrate_test_delay;
            bw_factor = 1.0;
            bw_up_factor = 1.0;
        }

        self.find_best_level(
            avg_bw,
            inputs,
            starvation_delay + max_starvation_delay,
            bw_factor,
            bw_up_factor,
        )
        .unwrap_or(0)
    }

    fn find_best_level(
        &self,
        current_bw: f64,
        inputs: &DecisionInputs,
        max_fetch_duration: f64,
        bw_factor: f64,
        bw_up_factor: f64,
    ) -> Option<usize> {
        let current_level = self.last_loaded_frag_level;
        let current = current_level.and_then(|i| self.levels.get(i));
        let current_codec = current.map(|l| l.codec_set.as_str());
        let live = current
            .and_then(|l| l.details)
            .is_some_and(|details| details.live);
        let current_frag_duration = self.current_frag_duration();
        let prefer_parts = self.part_current.is_some();

        let max = inputs.max_auto_level.min(self.levels.len() - 1);
        let min = inputs.min_auto_level.min(max);
        for i in (min..=max).rev() {
            let level = &self.levels[i];
            if current_codec.is_some_and(|codec| level.codec_set != codec) {
                continue;
            }
            let avg_duration = level
                .average_duration(prefer_parts)
                .unwrap_or(current_frag_duration);
            let adjusted_bw = if current_level.is_none_or(|c| i <= c) {
                bw_factor * current_bw
            } else {
                bw_up_factor * current_bw
            };
            let bitrate = f64::from(level.max_bitrate());
            let fetch_duration = bitrate * avg_duration / adjusted_bw;
            if adjusted_bw > bitrate
                && (fetch_duration == 0.0
                    || live
                    || level.details.is_none()
                    || fetch_duration < max_fetch_duration)
            {
                return Some(i);
            }
        }
        None
    }

    fn clear_timer(&mut self) {
        self.timer_armed = false;
    }

    /// Duration of the in-flight part or fragment, 0 when idle.
    fn current_frag_duration(&self) -> f64 {
        self.part_current
            .as_ref()
            .map(|p| p.duration)
            .or_else(|| self.frag_current.as_ref().map(|f| f.duration))
            .unwrap_or(0.0)
    }

    /// Like [`Self::current_frag_duration`] with a fallback to the current
    /// level's target duration, for decisions taken before the first load.
    fn decision_frag_duration(&self) -> f64 {
        let duration = self.current_frag_duration();
        if duration > 0.0 {
            return duration;
        }
        self.last_loaded_frag_level
            .and_then(|i| self.levels.get(i))
            .and_then(|level| level.average_duration(false))
            .unwrap_or(0.0)
    }
}

/// Throughput of one transfer in kbit/s, from request start to parse end.
fn fragment_throughput_kbps(stats: &LoaderStats) -> f64 {
    let processing_ms = stats.processing_ms();
    if processing_ms > 0.0 {
        // bits per millisecond == kbit/s
        stats.loaded as f64 * 8.0 / processing_ms
    } else {
        0.0
    }
}
