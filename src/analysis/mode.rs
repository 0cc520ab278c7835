//! Analysis modes. The set is fixed at compile time; each mode carries
//! its prompt template, generation temperature, and response contract.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    Explain,
    Solve,
    QuickAnswer,
    ExtractConcepts,
    ExtractFormulas,
    ExtractTimeline,
}

/// How a mode's raw model output is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Free prose; the whole response is the answer.
    Prose,
    /// `---ANSWER---` / `---STEPS---` delimited.
    Delimited,
    /// JSON array of mode-specific objects.
    Extraction,
}

impl Mode {
    pub fn shape(&self) -> ResponseShape {
        match self {
            Mode::Explain => ResponseShape::Prose,
            Mode::Solve | Mode::QuickAnswer => ResponseShape::Delimited,
            Mode::ExtractConcepts | Mode::ExtractFormulas | Mode::ExtractTimeline => {
                ResponseShape::Extraction
            }
        }
    }

    /// Low temperature for solve-class modes, higher for explanatory
    /// ones.
    pub fn temperature(&self) -> f32 {
        match self {
            Mode::Solve | Mode::ExtractFormulas => 0.2,
            Mode::QuickAnswer | Mode::ExtractConcepts | Mode::ExtractTimeline => 0.3,
            Mode::Explain => 0.7,
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Mode::Explain => {
                "You are a study assistant watching a lecture alongside the user. \
                 Explain the material in the provided context clearly and \
                 concisely, as if to a smart student seeing it for the first \
                 time. Prefer plain language and short paragraphs."
            }
            Mode::Solve => {
                "You are a precise problem solver. Solve the problem in the \
                 provided context. Respond using exactly this format:\n\
                 ---ANSWER---\n<the final answer>\n\
                 ---STEPS---\n<the key steps, numbered>"
            }
            Mode::QuickAnswer => {
                "Give the shortest correct answer to the question in the \
                 provided context. Respond using exactly this format:\n\
                 ---ANSWER---\n<one or two sentences>\n\
                 ---STEPS---\n<a brief justification, optional>"
            }
            Mode::ExtractConcepts => {
                "Extract the key concepts from the provided context. Respond \
                 with only a JSON array of objects, each shaped like \
                 {\"concept\": string, \"definition\": string}. No prose \
                 outside the array."
            }
            Mode::ExtractFormulas => {
                "Extract every formula or equation from the provided context. \
                 Respond with only a JSON array of objects, each shaped like \
                 {\"formula\": string, \"meaning\": string}. No prose outside \
                 the array."
            }
            Mode::ExtractTimeline => {
                "Extract the chronological events mentioned in the provided \
                 context. Respond with only a JSON array of objects, each \
                 shaped like {\"event\": string, \"when\": string}. No prose \
                 outside the array."
            }
        }
    }
}

/// Prompt for the per-segment transcript pass; not a user-facing mode
/// but shares the engine plumbing.
pub const SEGMENT_ANALYSIS_PROMPT: &str = "You are tagging lecture transcript segments. \
 The user message lists numbered segments, one per line, as \
 `<index>. <text>`. Respond with only a JSON array containing one object \
 per segment, in order, shaped like {\"index\": number, \"tags\": \
 [string], \"isTestWorthy\": boolean, \"isConfusing\": boolean, \
 \"importance\": \"low\"|\"medium\"|\"high\"|\"critical\", \
 \"topicLabel\": string or null}. Use tags from: new-topic, example, \
 definition, review, important. Set topicLabel only when the segment \
 starts a new topic.";

pub const SEGMENT_ANALYSIS_TEMPERATURE: f32 = 0.2;
