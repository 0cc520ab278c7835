//! Response parsing, quarantined here because the marker contract is
//! fragile by nature. Parsing never fails: malformed output degrades to
//! the most useful interpretation available.

use serde_json::Value;

use crate::transcript::SegmentAnalysis;

pub const ANSWER_MARKER: &str = "---ANSWER---";
pub const STEPS_MARKER: &str = "---STEPS---";

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerParts {
    pub answer: String,
    pub steps: Option<String>,
}

/// Split a delimited response on the literal markers. A response with
/// no markers is treated as a bare answer with no steps.
pub fn parse_marker_response(raw: &str) -> MarkerParts {
    let (head, steps) = match raw.split_once(STEPS_MARKER) {
        Some((head, tail)) => (head, Some(tail)),
        None => (raw, None),
    };

    let answer = match head.split_once(ANSWER_MARKER) {
        Some((_, tail)) => tail,
        None => head,
    };

    MarkerParts {
        answer: answer.trim().to_string(),
        steps: steps
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    }
}

/// Pull the JSON array out of an extraction response. Models routinely
/// wrap the array in code fences or preamble text, so scan for the
/// outermost brackets instead of parsing the whole body.
pub fn parse_extraction_response(raw: &str) -> Vec<Value> {
    let start = match raw.find('[') {
        Some(pos) => pos,
        None => return Vec::new(),
    };
    let end = match raw.rfind(']') {
        Some(pos) if pos > start => pos,
        _ => return Vec::new(),
    };

    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter(|item| item.is_object())
            .collect(),
        _ => Vec::new(),
    }
}

/// Parse the per-segment tagging reply into one slot per segment of the
/// request-time snapshot. Objects with an explicit `index` land in that
/// slot; others fall back to their array position. Anything malformed
/// or out of range is dropped, never an error.
pub fn parse_segment_analyses(raw: &str, expected: usize) -> Vec<Option<SegmentAnalysis>> {
    let mut entries: Vec<Option<SegmentAnalysis>> = vec![None; expected];

    for (position, item) in parse_extraction_response(raw).into_iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(position);
        if index >= expected {
            continue;
        }

        if let Ok(analysis) = serde_json::from_value::<SegmentAnalysis>(item) {
            entries[index] = Some(analysis);
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Importance;

    #[test]
    fn both_markers_split_answer_and_steps() {
        let parts = parse_marker_response("---ANSWER---\nX\n---STEPS---\nY");
        assert_eq!(parts.answer, "X");
        assert_eq!(parts.steps.as_deref(), Some("Y"));
    }

    #[test]
    fn no_markers_means_whole_text_is_the_answer() {
        let parts = parse_marker_response("just a plain reply");
        assert_eq!(parts.answer, "just a plain reply");
        assert_eq!(parts.steps, None);
    }

    #[test]
    fn answer_marker_alone_strips_the_prefix() {
        let parts = parse_marker_response("preamble ---ANSWER--- 42");
        assert_eq!(parts.answer, "42");
        assert_eq!(parts.steps, None);
    }

    #[test]
    fn empty_steps_section_degrades_to_none() {
        let parts = parse_marker_response("---ANSWER---\n42\n---STEPS---\n   ");
        assert_eq!(parts.answer, "42");
        assert_eq!(parts.steps, None);
    }

    #[test]
    fn parsing_is_idempotent_on_reparse() {
        let first = parse_marker_response("---ANSWER---\nX\n---STEPS---\nY");
        let again = parse_marker_response(&first.answer);
        assert_eq!(again.answer, "X");
        assert_eq!(again.steps, None);
    }

    #[test]
    fn extraction_survives_code_fences_and_preamble() {
        let raw = "Here you go:\n```json\n[{\"concept\": \"entropy\", \"definition\": \"disorder\"}]\n```";
        let items = parse_extraction_response(raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["concept"], "entropy");
    }

    #[test]
    fn extraction_of_garbage_yields_empty() {
        assert!(parse_extraction_response("no json here").is_empty());
        assert!(parse_extraction_response("] backwards [").is_empty());
        assert!(parse_extraction_response("[1, 2, {\"broken\"").is_empty());
    }

    #[test]
    fn extraction_drops_non_object_items() {
        let items = parse_extraction_response("[1, \"two\", {\"event\": \"x\", \"when\": \"y\"}]");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["event"], "x");
    }

    #[test]
    fn segment_analyses_align_by_explicit_index() {
        let raw = r#"[
            {"index": 1, "tags": ["important"], "isTestWorthy": true,
             "isConfusing": false, "importance": "high", "topicLabel": null}
        ]"#;
        let entries = parse_segment_analyses(raw, 3);
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_none());
        assert!(entries[2].is_none());

        let entry = entries[1].as_ref().unwrap();
        assert!(entry.is_test_worthy);
        assert_eq!(entry.importance, Importance::High);
        assert_eq!(entry.tags, vec!["important"]);
    }

    #[test]
    fn segment_analyses_fall_back_to_array_position() {
        let raw = r#"[
            {"tags": ["new-topic"], "topicLabel": "thermo"},
            {"tags": ["example"]}
        ]"#;
        let entries = parse_segment_analyses(raw, 2);
        assert_eq!(entries[0].as_ref().unwrap().topic_label.as_deref(), Some("thermo"));
        assert_eq!(entries[1].as_ref().unwrap().tags, vec!["example"]);
        // Omitted fields take defaults rather than failing the entry.
        assert_eq!(entries[0].as_ref().unwrap().importance, Importance::Medium);
    }

    #[test]
    fn segment_analyses_ignore_out_of_range_indices() {
        let raw = r#"[{"index": 9, "tags": ["important"]}]"#;
        let entries = parse_segment_analyses(raw, 2);
        assert!(entries.iter().all(Option::is_none));
    }

    #[test]
    fn segment_analyses_of_garbage_are_all_absent() {
        let entries = parse_segment_analyses("the model rambled instead", 4);
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(Option::is_none));
    }
}
