//! JSON shapes returned by `POST /sessions/{id}/attempts`.

use serde::{Deserialize, Serialize};

/// Per-dimension scores.  All five are required; a reply missing any of them
/// is treated as malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptScores {
    pub pronunciation: f64,
    pub accuracy: f64,
    pub fluency: f64,
    pub completeness: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFeedback {
    pub textual: Option<String>,
    /// Spoken feedback; usually a URL, passed through untouched.
    pub audio: Option<serde_json::Value>,
}

/// The scoring service's reply to one submitted take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub scores: AttemptScores,
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub feedback: Option<AttemptFeedback>,
    #[serde(default)]
    pub show_text_feedback: Option<bool>,
    #[serde(default)]
    pub is_last_scenario: Option<bool>,
    /// Session-level summary, sent with the last scenario.  Free-form.
    #[serde(default)]
    pub overall_feedback: Option<serde_json::Value>,
}

impl AttemptResult {
    /// Textual feedback to show, honouring `showTextFeedback` when present.
    pub fn text_feedback(&self) -> Option<&str> {
        if self.show_text_feedback == Some(false) {
            return None;
        }
        self.feedback.as_ref()?.textual.as_deref()
    }

    pub fn is_last_scenario(&self) -> bool {
        self.is_last_scenario.unwrap_or(false)
    }
}
