//! Append-only log of finalized speech segments.
//!
//! The store is the single source of truth for what was heard. Exactly
//! one logical writer exists (the speech controller's final-result
//! path), so a plain mutex around the vector is enough; every reader
//! takes an owned snapshot.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub index: usize,
    pub captured_at: DateTime<Utc>,
    pub text: String,
}

/// An owned copy of the log at one point in time. `generation` changes
/// on every `clear`, letting derived data (analysis overlays) detect
/// that their indices no longer refer to the current log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSnapshot {
    pub generation: u64,
    pub segments: Vec<TranscriptSegment>,
}

struct StoreInner {
    segments: Vec<TranscriptSegment>,
    generation: u64,
}

pub struct TranscriptStore {
    inner: Mutex<StoreInner>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                segments: Vec::new(),
                generation: 0,
            }),
        }
    }

    /// Append a finalized utterance. Infallible by construction; returns
    /// the index assigned to the new segment.
    pub fn append(&self, text: String, captured_at: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let index = inner.segments.len();
        inner.segments.push(TranscriptSegment {
            index,
            captured_at,
            text,
        });
        index
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        let inner = self.inner.lock().unwrap();
        TranscriptSnapshot {
            generation: inner.generation,
            segments: inner.segments.clone(),
        }
    }

    /// Empty the log atomically. Returns the new generation; any
    /// analysis overlay carrying an older generation is stale.
    pub fn clear(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.segments.clear();
        inner.generation += 1;
        inner.generation
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().unwrap().generation
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The flattened form the analysis engine consumes: all segment
    /// texts in order, single-space separated. Segment boundaries are
    /// deliberately not preserved; the model receives prose.
    pub fn joined_text(&self) -> String {
        let inner = self.inner.lock().unwrap();
        inner
            .segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Rebuild the log from persisted rows, oldest first. Used only at
    /// startup recovery, before any writer is running.
    pub fn restore(&self, rows: Vec<(DateTime<Utc>, String)>) {
        let mut inner = self.inner.lock().unwrap();
        inner.segments = rows
            .into_iter()
            .enumerate()
            .map(|(index, (captured_at, text))| TranscriptSegment {
                index,
                captured_at,
                text,
            })
            .collect();
    }
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}
