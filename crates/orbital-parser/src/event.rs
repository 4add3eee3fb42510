// SPDX-License-Identifier: MIT

//! Parses the agent subprocess's line-delimited JSON stream (spec.md §4.1,
//! §6.1) and reconciles intermediate (per-message) and authoritative
//! (per-turn) token/cost counts without double-accounting.

use chrono::{DateTime, Utc};
use orbital_core::OutputStats;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no known event types observed — possible agent version skew")]
    NoKnownEvents,
}

/// The recognized event kinds from the agent's wire format (spec.md §6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventKind {
    Assistant,
    User,
    Result,
    Error,
    ContentBlockDelta,
    ContentBlockStart,
    ContentBlockStop,
    System,
    Unknown(String),
}

/// A single parsed line from the agent subprocess.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub tool_name: Option<String>,
    pub tool_id: Option<String>,
    pub tool_input: Option<String>,
}

impl StreamEvent {
    fn new(kind: StreamEventKind, content: String) -> Self {
        Self {
            kind,
            content,
            timestamp: Utc::now(),
            tool_name: None,
            tool_id: None,
            tool_input: None,
        }
    }
}

fn get_str<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(|x| x.as_str())
}

fn get_u64(v: &Value, key: &str) -> u64 {
    v.get(key).and_then(|x| x.as_u64()).unwrap_or(0)
}

fn get_f64(v: &Value, key: &str) -> f64 {
    v.get(key).and_then(|x| x.as_f64()).unwrap_or(0.0)
}

/// Stateful parser reconciling stats across a session's event stream.
///
/// Three counters drive reconciliation (spec.md §4.1):
/// - `result_*`/`cost`/`duration`: accumulated from authoritative `result` events.
/// - `assist_in`/`assist_out`: intermediate, cumulative-within-turn, reset on
///   every `result` event so they never survive into the next turn.
#[derive(Debug, Default)]
pub struct EventParser {
    result_in: u64,
    result_out: u64,
    cost: f64,
    duration_ms: u64,
    assist_in: u64,
    assist_out: u64,
    known_seen: bool,
    unknown_types_seen: HashSet<String>,
    pending_warnings: Vec<String>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one line of output. Empty/whitespace/malformed lines yield
    /// `None` with no error (spec.md §4.1).
    pub fn feed_line(&mut self, line: &str) -> Option<StreamEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let json: Value = serde_json::from_str(trimmed).ok()?;
        let event = self.parse_value(&json)?;
        Some(event)
    }

    /// Drain warnings accumulated since the last call (one per unknown type,
    /// emitted on its first occurrence).
    pub fn drain_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_warnings)
    }

    fn parse_value(&mut self, json: &Value) -> Option<StreamEvent> {
        let type_str = get_str(json, "type")?;

        let event = match type_str {
            "assistant" => self.parse_assistant(json),
            "user" => self.parse_user(json),
            "result" => self.parse_result(json),
            "error" => self.parse_error(json),
            "content_block_delta" => self.parse_content_block_delta(json),
            "content_block_start" => self.parse_content_block_start(json),
            "content_block_stop" => Some(StreamEvent::new(StreamEventKind::ContentBlockStop, String::new())),
            "system" => {
                let message = get_str(json, "message").unwrap_or("").to_string();
                Some(StreamEvent::new(StreamEventKind::System, message))
            }
            other => {
                if self.unknown_types_seen.insert(other.to_string()) {
                    self.pending_warnings
                        .push(format!("unknown stream event type: {other}"));
                }
                Some(StreamEvent::new(StreamEventKind::Unknown(other.to_string()), String::new()))
            }
        };

        if !matches!(
            event.as_ref().map(|e| &e.kind),
            Some(StreamEventKind::Unknown(_))
        ) {
            self.known_seen = true;
        }

        event
    }

    fn parse_assistant(&mut self, json: &Value) -> Option<StreamEvent> {
        let message = json.get("message")?;
        let mut text = String::new();
        let mut tool_name = None;
        let mut tool_id = None;
        let mut tool_input = None;

        if let Some(blocks) = message.get("content").and_then(|c| c.as_array()) {
            for block in blocks {
                match get_str(block, "type") {
                    Some("text") => {
                        if let Some(t) = get_str(block, "text") {
                            text.push_str(t);
                        }
                    }
                    Some("tool_use") => {
                        if tool_name.is_none() {
                            tool_name = get_str(block, "name").map(String::from);
                            tool_id = get_str(block, "id").map(String::from);
                            tool_input = block
                                .get("input")
                                .map(|v| serde_json::to_string(v).unwrap_or_default());
                        }
                    }
                    _ => {}
                }
            }
        }

        if let Some(usage) = message.get("usage") {
            self.assist_in = get_u64(usage, "input_tokens")
                + get_u64(usage, "cache_creation_input_tokens")
                + get_u64(usage, "cache_read_input_tokens");
            self.assist_out = get_u64(usage, "output_tokens");
        }

        let mut event = StreamEvent::new(StreamEventKind::Assistant, text);
        event.tool_name = tool_name;
        event.tool_id = tool_id;
        event.tool_input = tool_input;
        Some(event)
    }

    fn parse_user(&mut self, json: &Value) -> Option<StreamEvent> {
        let mut content = String::new();
        if let Some(tur) = json.get("tool_use_result") {
            if let Some(filenames) = tur.get("filenames").and_then(|v| v.as_array()) {
                if let Some(first) = filenames.first().and_then(|v| v.as_str()) {
                    content = first.to_string();
                } else {
                    content = "0 files".to_string();
                }
            } else if let Some(n) = tur.get("numFiles").and_then(|v| v.as_u64()) {
                content = format!("{n} files");
            }
        }
        if let Some(tool_result) = get_str(json, "tool_result") {
            let truncated = truncate_with_ellipsis(tool_result, 100);
            if content.is_empty() {
                content = truncated;
            } else {
                content = format!("{content}: {truncated}");
            }
        }
        Some(StreamEvent::new(StreamEventKind::User, content))
    }

    fn parse_result(&mut self, json: &Value) -> Option<StreamEvent> {
        let cost = get_f64(json, "total_cost_usd");
        let duration_ms = get_u64(json, "duration_ms");
        let usage = json.get("usage");

        let input = usage
            .map(|u| {
                get_u64(u, "input_tokens")
                    + get_u64(u, "cache_creation_input_tokens")
                    + get_u64(u, "cache_read_input_tokens")
            })
            .unwrap_or(0);
        let output = usage.map(|u| get_u64(u, "output_tokens")).unwrap_or(0);

        self.result_in += input;
        self.result_out += output;
        self.cost += cost;
        self.duration_ms += duration_ms;
        self.assist_in = 0;
        self.assist_out = 0;

        Some(StreamEvent::new(
            StreamEventKind::Result,
            format!("turn complete (cost=${cost:.4}, {duration_ms}ms)"),
        ))
    }

    fn parse_error(&mut self, json: &Value) -> Option<StreamEvent> {
        let message = json
            .get("error")
            .and_then(|e| get_str(e, "message"))
            .unwrap_or("unknown error")
            .to_string();
        Some(StreamEvent::new(StreamEventKind::Error, message))
    }

    fn parse_content_block_delta(&mut self, json: &Value) -> Option<StreamEvent> {
        let text = json
            .get("delta")
            .and_then(|d| get_str(d, "text"))
            .unwrap_or("")
            .to_string();
        Some(StreamEvent::new(StreamEventKind::ContentBlockDelta, text))
    }

    fn parse_content_block_start(&mut self, json: &Value) -> Option<StreamEvent> {
        let mut event = StreamEvent::new(StreamEventKind::ContentBlockStart, String::new());
        if let Some(block) = json.get("content_block") {
            if get_str(block, "type") == Some("tool_use") {
                event.tool_name = get_str(block, "name").map(String::from);
                event.tool_id = get_str(block, "id").map(String::from);
                event.tool_input = block
                    .get("input")
                    .map(|v| serde_json::to_string(v).unwrap_or_default());
            }
        }
        Some(event)
    }

    /// The currently reconciled stats (spec.md §4.1, §8):
    /// - If a result has arrived since the last assistant usage, only
    ///   result-accumulated counts are published.
    /// - Otherwise the latest intermediate assistant usage is added on top.
    pub fn stats(&self) -> OutputStats {
        OutputStats {
            tokens_in: self.result_in + self.assist_in,
            tokens_out: self.result_out + self.assist_out,
            cost_usd: self.cost,
            duration_ms: self.duration_ms,
        }
    }

    /// Returns an error if no known event types have been observed —
    /// indicates the agent subprocess's wire format has drifted from what
    /// this parser understands (spec.md §4.1, §7 kind 7).
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.known_seen {
            Ok(())
        } else {
            Err(ParseError::NoKnownEvents)
        }
    }
}

fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
