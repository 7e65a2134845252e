/// Forward buffer state at the current playhead position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BufferInfo {
    /// Seconds of contiguous media buffered ahead of the playhead
    pub len: f64,
    /// End of the contiguous buffered region, media-timeline seconds
    pub end: f64,
}

impl BufferInfo {
    /// Compute the forward buffer from the media element's buffered ranges.
    ///
    /// Ranges separated by a gap smaller than `max_hole` are treated as
    /// contiguous, which mirrors how players tolerate sub-frame holes left by
    /// segment alignment. A playhead slightly before a range (within
    /// `max_hole`) still counts as inside it.
    pub fn from_ranges(position: f64, ranges: &[(f64, f64)], max_hole: f64) -> Self {
        let mut merged: Vec<(f64, f64)> = Vec::with_capacity(ranges.len());
        let mut sorted: Vec<(f64, f64)> = ranges
            .iter()
            .copied()
            .filter(|(start, end)| end > start)
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        for (start, end) in sorted {
            match merged.last_mut() {
                Some(last) if start - last.1 < max_hole => {
                    last.1 = last.1.max(end);
                }
                _ => merged.push((start, end)),
            }
        }

        for (start, end) in merged {
            if position + max_hole >= start && position < end {
                return Self {
                    len: (end - position).max(0.0),
                    end,
                };
            }
        }

        Self {
            len: 0.0,
            end: position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ranges() {
        let info = BufferInfo::from_ranges(10.0, &[], 0.1);
        assert_eq!(info.len, 0.0);
        assert_eq!(info.end, 10.0);
    }

    #[test]
    fn test_playhead_inside_range() {
        let info = BufferInfo::from_ranges(10.0, &[(8.0, 18.0)], 0.1);
        assert_eq!(info.len, 8.0);
        assert_eq!(info.end, 18.0);
    }

    #[test]
    fn test_small_hole_bridged() {
        // 50ms hole at 12s, below the 100ms tolerance
        let info = BufferInfo::from_ranges(10.0, &[(8.0, 12.0), (12.05, 18.0)], 0.1);
        assert_eq!(info.end, 18.0);
        assert_eq!(info.len, 8.0);
    }

    #[test]
    fn test_large_hole_splits() {
        let info = BufferInfo::from_ranges(10.0, &[(8.0, 12.0), (13.0, 18.0)], 0.1);
        assert_eq!(info.end, 12.0);
        assert_eq!(info.len, 2.0);
    }

    #[test]
    fn test_playhead_just_before_range() {
        let info = BufferInfo::from_ranges(7.95, &[(8.0, 18.0)], 0.1);
        assert!(info.len > 10.0);
        assert_eq!(info.end, 18.0);
    }

    #[test]
    fn test_playhead_outside_all_ranges() {
        let info = BufferInfo::from_ranges(20.0, &[(8.0, 18.0)], 0.1);
        assert_eq!(info.len, 0.0);
        assert_eq!(info.end, 20.0);
    }

    #[test]
    fn test_unsorted_ranges() {
        let info = BufferInfo::from_ranges(10.0, &[(13.0, 18.0), (8.0, 12.0)], 0.1);
        assert_eq!(info.end, 12.0);
    }
}
