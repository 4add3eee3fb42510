// SPDX-License-Identifier: MIT

//! Output messages fanned out to session subscribers (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of an [`OutputMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Text,
    Tool,
    Stats,
    Status,
    Error,
}

/// A single unit of streamed session output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMessage {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl OutputMessage {
    pub fn new(kind: OutputKind, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp,
        }
    }

    pub fn text(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(OutputKind::Text, content, timestamp)
    }

    pub fn status(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(OutputKind::Status, content, timestamp)
    }

    pub fn error(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(OutputKind::Error, content, timestamp)
    }
}

/// Accumulated token/cost/duration statistics (spec.md §3, §4.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputStats {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

impl OutputStats {
    pub fn add(&mut self, other: &OutputStats) {
        self.tokens_in += other.tokens_in;
        self.tokens_out += other.tokens_out;
        self.cost_usd += other.cost_usd;
        self.duration_ms += other.duration_ms;
    }
}
