// SPDX-License-Identifier: MIT

//! Completion marker detection (spec.md §4.6, §6.4, §9).
//!
//! Always normalize via [`extract_text`] before matching — searching raw
//! JSON lines directly risks a false positive from a literal marker string
//! appearing inside some unrelated field value.

use crate::event::EventParser;

/// Default promise marker, overridable by configuration (spec.md §4.6).
pub const DEFAULT_PROMISE_MARKER: &str = "<promise>COMPLETE</promise>";

/// Run a throwaway parser across a full raw stream-JSON blob and concatenate
/// event content into a plain-text view, suitable for marker searches.
pub fn extract_text(raw: &str) -> String {
    let mut parser = EventParser::new();
    let mut out = String::new();
    for line in raw.lines() {
        if let Some(event) = parser.feed_line(line) {
            if event.content.is_empty() {
                continue;
            }
            out.push_str(&event.content);
            if !event.content.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    out
}

/// Case-sensitive substring match of `marker` against the extracted text.
pub fn detect_completion(raw: &str, marker: &str) -> bool {
    extract_text(raw).contains(marker)
}
