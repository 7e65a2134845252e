//! Loader statistics attached to fragments and parts.
//!
//! All timestamps are milliseconds on the host's monotonic clock; the engine
//! never reads a clock of its own.

/// Start/end pair of a loading phase, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

/// Parsing phase timing, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParseTiming {
    pub end: f64,
}

/// Arrival record of one fragmented-MP4 chunk boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkTiming {
    /// Arrival timestamp in milliseconds
    pub timestamp: f64,
    /// Chunk length in bytes
    pub len: u64,
}

/// Per-request loader statistics.
///
/// `start_time_data` records chunks that begin with a `moof` box and
/// `end_time_data` chunks that begin with an `mdat` box; `box_loaded` is the
/// running sum of `mdat` lengths. These feed box-level throughput sampling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderStats {
    pub loading: TimeRange,
    pub parsing: ParseTiming,
    /// Bytes received so far
    pub loaded: u64,
    /// Total expected bytes, when the loader knows it (Content-Length)
    pub total: Option<u64>,
    /// Bandwidth estimate captured by the loader, bits per second
    pub bw_estimate: Option<f64>,
    pub aborted: bool,
    pub start_time_data: Vec<ChunkTiming>,
    pub end_time_data: Vec<ChunkTiming>,
    pub box_loaded: u64,
}

impl LoaderStats {
    /// Wall-clock time between request start and parse completion, in ms.
    #[inline]
    pub fn processing_ms(&self) -> f64 {
        self.parsing.end - self.loading.start
    }

    /// Time this request has been in flight as of `now_ms`.
    #[inline]
    pub fn request_ms(&self, now_ms: f64) -> f64 {
        now_ms - self.loading.start
    }

    /// Whether every expected byte has arrived.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.total.is_some_and(|total| total > 0 && self.loaded >= total)
    }

    /// Record the arrival of a chunk opening with a `moof` box.
    pub fn record_moof(&mut self, timestamp: f64, len: u64) {
        self.start_time_data.push(ChunkTiming { timestamp, len });
    }

    /// Record the arrival of a chunk opening with an `mdat` box.
    pub fn record_mdat(&mut self, timestamp: f64, len: u64) {
        self.end_time_data.push(ChunkTiming { timestamp, len });
        self.box_loaded += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_time() {
        let stats = LoaderStats {
            loading: TimeRange {
                start: 1_000.0,
                end: 1_400.0,
            },
            parsing: ParseTiming { end: 1_450.0 },
            ..Default::default()
        };
        assert_eq!(stats.processing_ms(), 450.0);
        assert_eq!(stats.request_ms(1_600.0), 600.0);
    }

    #[test]
    fn test_is_complete() {
        let mut stats = LoaderStats {
            loaded: 100,
            total: Some(200),
            ..Default::default()
        };
        assert!(!stats.is_complete());
        stats.loaded = 200;
        assert!(stats.is_complete());
        stats.total = None;
        assert!(!stats.is_complete());
    }

    #[test]
    fn test_box_recording() {
        let mut stats = LoaderStats::default();
        stats.record_moof(10.0, 120);
        stats.record_mdat(12.0, 4_000);
        stats.record_moof(110.0, 120);
        stats.record_mdat(115.0, 4_200);

        assert_eq!(stats.start_time_data.len(), 2);
        assert_eq!(stats.end_time_data.len(), 2);
        assert_eq!(stats.box_loaded, 8_200);
    }
}
