pub mod analysis;
pub mod commands;
pub mod store;

pub use analysis::{Importance, SegmentAnalysis, TranscriptAnalyses};
pub use store::{TranscriptSegment, TranscriptSnapshot, TranscriptStore};
