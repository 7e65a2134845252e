use crate::stats::LoaderStats;

/// Sequence identity of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentId {
    /// The initialization segment
    Init,
    /// A media segment with its media sequence number
    Sn(u64),
}

impl SegmentId {
    /// Media sequence number, `None` for the init segment.
    #[inline]
    pub fn sn(&self) -> Option<u64> {
        match self {
            SegmentId::Init => None,
            SegmentId::Sn(sn) => Some(*sn),
        }
    }

    #[inline]
    pub fn is_init(&self) -> bool {
        matches!(self, SegmentId::Init)
    }
}

/// Media playlist type a fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Main,
    Audio,
    Subtitle,
}

/// A media fragment as seen by the decision engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub sn: SegmentId,
    /// Ladder index this fragment was loaded from
    pub level: usize,
    pub kind: MediaKind,
    /// Duration in seconds
    pub duration: f64,
    /// Start position on the media timeline, seconds
    pub start: f64,
    /// Fragment loaded solely to probe bandwidth, never buffered for playback
    pub bitrate_test: bool,
    pub stats: LoaderStats,
}

impl Fragment {
    pub fn new(sn: SegmentId, level: usize, kind: MediaKind, duration: f64, start: f64) -> Self {
        Self {
            sn,
            level,
            kind,
            duration,
            start,
            bitrate_test: false,
            stats: LoaderStats::default(),
        }
    }
}

/// An LL-HLS partial segment with its own loader statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Index of this part within its parent fragment
    pub index: u32,
    /// Duration in seconds
    pub duration: f64,
    pub stats: LoaderStats,
}

impl Part {
    pub fn new(index: u32, duration: f64) -> Self {
        Self {
            index,
            duration,
            stats: LoaderStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_id() {
        assert_eq!(SegmentId::Sn(42).sn(), Some(42));
        assert_eq!(SegmentId::Init.sn(), None);
        assert!(SegmentId::Init.is_init());
        assert!(!SegmentId::Sn(0).is_init());
    }

    #[test]
    fn test_fragment_defaults() {
        let frag = Fragment::new(SegmentId::Sn(7), 2, MediaKind::Main, 2.0, 14.0);
        assert!(!frag.bitrate_test);
        assert_eq!(frag.stats, LoaderStats::default());
    }
}
