//! Derived, per-segment analysis overlay.
//!
//! An overlay is always tied to the snapshot it was computed from;
//! segments appended afterwards simply have no entry until the next
//! analysis run covers them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Importance {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Importance {
    fn default() -> Self {
        Importance::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmentAnalysis {
    /// Category labels, e.g. "new-topic", "example", "definition",
    /// "review", "important".
    pub tags: Vec<String>,
    pub is_test_worthy: bool,
    pub is_confusing: bool,
    pub importance: Importance,
    /// Set when the segment starts a new topic.
    pub topic_label: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptAnalyses {
    /// Generation of the transcript snapshot this overlay was computed
    /// against. A `clear()` invalidates the overlay.
    pub generation: u64,
    /// One slot per segment of the request-time snapshot; `None` where
    /// the model produced nothing usable for that segment.
    pub entries: Vec<Option<SegmentAnalysis>>,
}

impl TranscriptAnalyses {
    pub fn is_stale(&self, store_generation: u64) -> bool {
        self.generation != store_generation
    }

    /// Entry for a segment index. Out-of-range indices (segments
    /// appended after the analysis run) are simply absent.
    pub fn for_segment(&self, index: usize) -> Option<&SegmentAnalysis> {
        self.entries.get(index).and_then(|slot| slot.as_ref())
    }
}
