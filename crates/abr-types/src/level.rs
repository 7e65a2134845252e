/// Accumulated load statistics for a level, used to derive its real bitrate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadedStats {
    /// Total bytes loaded for this level
    pub bytes: u64,
    /// Total media duration loaded for this level, in seconds
    pub duration: f64,
}

/// Playlist-level details that only become known once the level playlist has
/// been loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelDetails {
    /// Whether the playlist is a live (sliding-window) playlist
    pub live: bool,
    /// Average segment target duration in seconds
    pub average_target_duration: Option<f64>,
    /// Part target duration in seconds (LL-HLS)
    pub part_target: Option<f64>,
}

/// A single rendition in the encoding ladder.
///
/// Index 0 is the lowest rendition. Switches are only permitted between
/// levels sharing the same `codec_set`.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    /// Nominal bitrate in bits per second
    pub bitrate: u32,
    /// Codec family identifier, e.g. `"avc1"` or `"hvc1"`
    pub codec_set: String,
    /// Playlist details, `None` until the level playlist has been loaded
    pub details: Option<LevelDetails>,
    /// Running load accumulator
    pub loaded: LoadedStats,
    /// Measured bitrate derived from `loaded`, 0 until the first sample
    pub real_bitrate: u32,
}

impl Level {
    pub fn new(bitrate: u32, codec_set: impl Into<String>) -> Self {
        Self {
            bitrate,
            codec_set: codec_set.into(),
            details: None,
            loaded: LoadedStats::default(),
            real_bitrate: 0,
        }
    }

    /// Effective upper-bound bitrate for fetch-budget computations.
    ///
    /// The measured bitrate wins over the nominal one once it exceeds it,
    /// since manifests routinely under-declare peak bandwidth.
    #[inline]
    pub fn max_bitrate(&self) -> u32 {
        self.real_bitrate.max(self.bitrate)
    }

    /// Fold one loaded fragment into the accumulator and refresh
    /// `real_bitrate`.
    pub fn record_loaded(&mut self, bytes: u64, duration: f64) {
        if duration <= 0.0 {
            return;
        }
        self.loaded.bytes += bytes;
        self.loaded.duration += duration;
        self.real_bitrate = ((8.0 * self.loaded.bytes as f64) / self.loaded.duration).round() as u32;
    }

    /// Average target duration for this level, falling back through
    /// part target when `prefer_parts` is set.
    pub fn average_duration(&self, prefer_parts: bool) -> Option<f64> {
        let details = self.details.as_ref()?;
        if prefer_parts {
            details.part_target.or(details.average_target_duration)
        } else {
            details.average_target_duration
        }
    }
}
