use crate::buffer::BufferInfo;

/// Read-only snapshot of the media element, taken by the host on its event
/// loop immediately before calling into the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaState {
    /// Playhead position, media-timeline seconds
    pub position: f64,
    /// Signed playback rate as reported by the media element
    pub playback_rate: f64,
    pub paused: bool,
    pub buffer: BufferInfo,
}

impl MediaState {
    /// Absolute playback rate, defaulting to 1.0 when the element reports 0
    /// so fetch budgets are computed as if playing normally.
    #[inline]
    pub fn effective_rate(&self) -> f64 {
        let rate = self.playback_rate.abs();
        if rate == 0.0 { 1.0 } else { rate }
    }

    /// Wall-clock seconds until the forward buffer runs dry.
    #[inline]
    pub fn starvation_delay(&self) -> f64 {
        ((self.buffer.end - self.position) / self.effective_rate()).max(0.0)
    }
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            position: 0.0,
            playback_rate: 1.0,
            paused: false,
            buffer: BufferInfo::default(),
        }
    }
}

/// Live-edge state for low-latency playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveEdge {
    /// Current distance from the live edge, seconds
    pub latency: f64,
    /// Target distance from the live edge, seconds
    pub target_latency: f64,
}

impl LiveEdge {
    /// Absolute drift from the latency target.
    #[inline]
    pub fn drift(&self) -> f64 {
        (self.latency - self.target_latency).abs()
    }
}
