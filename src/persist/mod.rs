// Segment persistence
// Sealed segments flow capture -> queue -> sink.

pub mod encode;
pub mod queue;
pub mod store;

use std::path::PathBuf;

use crate::error::Result;
use crate::segment::Segment;

pub use queue::PersistQueue;
pub use store::LibraryStore;

/// Encodes a sealed segment into a playable file and records it.
///
/// Called from a persistence queue's drain thread; implementations must not
/// need any extra synchronisation from the caller.
pub trait SegmentSink: Send + Sync {
    fn persist(&self, segment: &Segment, fps: u32) -> Result<PathBuf>;
}
