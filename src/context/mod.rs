//! Combines screen text, the flattened transcript, and an explicit user
//! instruction into the single payload one analysis call consumes.

use serde::Serialize;
use thiserror::Error;

const SESSION_LABEL_MAX_CHARS: usize = 60;

#[derive(Debug, Error)]
#[error("nothing to analyze yet: capture the screen, speak, or type a question")]
pub struct NoContextError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPayload {
    pub screen_text: Option<String>,
    pub transcript_text: Option<String>,
    pub instruction: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect()
}

impl ContextPayload {
    /// Normalizes the three sources (whitespace-only counts as absent)
    /// and rejects the all-empty case before any quota or network
    /// activity can happen downstream.
    pub fn assemble(
        screen_text: Option<String>,
        transcript_text: Option<String>,
        instruction: Option<String>,
    ) -> Result<Self, NoContextError> {
        let payload = Self {
            screen_text: non_blank(screen_text),
            transcript_text: non_blank(transcript_text),
            instruction: non_blank(instruction),
        };

        if payload.is_empty() {
            return Err(NoContextError);
        }
        Ok(payload)
    }

    pub fn is_empty(&self) -> bool {
        self.screen_text.is_none() && self.transcript_text.is_none() && self.instruction.is_none()
    }

    /// Short human label for the session. Precedence: explicit
    /// instruction, then screen text, then transcript. Only used for
    /// naming; the model always receives every present source.
    pub fn session_label(&self) -> Option<String> {
        self.instruction
            .as_deref()
            .or(self.screen_text.as_deref())
            .or(self.transcript_text.as_deref())
            .map(|s| truncate_chars(s, SESSION_LABEL_MAX_CHARS))
    }

    /// Serialize for the model. Screen first, transcript second, the
    /// explicit instruction last; the trailing section carries the most
    /// weight by LLM convention.
    pub fn to_prompt(&self) -> String {
        let mut sections = Vec::new();
        if let Some(screen) = &self.screen_text {
            sections.push(format!("SCREEN CONTENT:\n{screen}"));
        }
        if let Some(transcript) = &self.transcript_text {
            sections.push(format!("TRANSCRIPT:\n{transcript}"));
        }
        if let Some(instruction) = &self.instruction {
            sections.push(format!("REQUEST:\n{instruction}"));
        }
        sections.join("\n\n")
    }
}
