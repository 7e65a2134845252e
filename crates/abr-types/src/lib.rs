// Shared domain types for the ABR decision engine.
pub mod buffer;
pub mod fragment;
pub mod level;
pub mod media;
pub mod stats;

// Export common types for ease of use
pub use buffer::BufferInfo;
pub use fragment::{Fragment, MediaKind, Part, SegmentId};
pub use level::{Level, LevelDetails, LoadedStats};
pub use media::{LiveEdge, MediaState};
pub use stats::{ChunkTiming, LoaderStats, ParseTiming, TimeRange};
