//! Shared streaming plumbing: SSE line reassembly, per-index tool-call
//! delta accumulation, and the thinking-preamble filter.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::{fresh_call_id, ToolCall};

/// Reassembles complete lines from arbitrarily-split network chunks.
/// Server-sent events arrive as byte chunks that do not respect line
/// boundaries; JSON payloads must not be parsed until their line is whole.
#[derive(Default)]
pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    /// Feed one network chunk; returns every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Whatever is left after the stream ends (usually empty).
    pub fn finish(self) -> Option<String> {
        if self.buf.trim().is_empty() {
            None
        } else {
            Some(self.buf)
        }
    }
}

/// Strip the `data: ` SSE prefix; `None` for blanks, comments and `[DONE]`.
pub fn sse_data(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        None
    } else {
        Some(data)
    }
}

/// Accumulates OpenAI-style tool-call deltas keyed by stream index.
/// Argument fragments are concatenated and JSON-parsed only at the end;
/// each call is decoded independently so one malformed argument object
/// yields `{}` for that call without poisoning the others.
#[derive(Default)]
pub struct ToolCallAccumulator {
    // (id, name, argument fragments)
    entries: BTreeMap<usize, (String, String, String)>,
}

impl ToolCallAccumulator {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Feed one `delta.tool_calls` array element.
    pub fn push(&mut self, delta: &Value) {
        let idx = delta.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
        let entry = self.entries.entry(idx).or_default();
        if let Some(id) = delta.get("id").and_then(Value::as_str) {
            entry.0 = id.to_string();
        }
        if let Some(func) = delta.get("function") {
            // The name arrives once in the first delta, not incrementally.
            if let Some(name) = func.get("name").and_then(Value::as_str) {
                entry.1 = name.to_string();
            }
            if let Some(args) = func.get("arguments").and_then(Value::as_str) {
                entry.2.push_str(args);
            }
        }
    }

    pub fn finish(self) -> Vec<ToolCall> {
        self.entries
            .into_values()
            .map(|(id, name, args)| ToolCall {
                id: if id.is_empty() { fresh_call_id() } else { id },
                name,
                input: serde_json::from_str(&args).unwrap_or_else(|_| json!({})),
            })
            .collect()
    }
}

/// Filters a "thinking" preamble from streamed text.
///
/// Some OpenAI-compatible servers prepend reasoning that starts with the
/// literal token `THOUGHT` and ends at the first blank line. Until enough
/// bytes have arrived to decide, text is buffered rather than emitted.
pub struct ThinkingFilter {
    buf: String,
    // None = undecided, Some(true) = inside thinking, Some(false) = passthrough
    in_thinking: Option<bool>,
}

impl ThinkingFilter {
    pub fn new() -> Self {
        Self { buf: String::new(), in_thinking: None }
    }

    /// Feed a streamed fragment; returns the text safe to show, if any.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        match self.in_thinking {
            None => {
                self.buf.push_str(chunk);
                if self.buf.starts_with("THOUGHT") {
                    self.in_thinking = Some(true);
                    self.drain_after_blank_line()
                } else if self.buf.len() >= "THOUGHT".len()
                    || !"THOUGHT".starts_with(self.buf.as_str())
                {
                    self.in_thinking = Some(false);
                    Some(std::mem::take(&mut self.buf))
                } else {
                    None
                }
            }
            Some(true) => {
                self.buf.push_str(chunk);
                self.drain_after_blank_line()
            }
            Some(false) => Some(chunk.to_string()),
        }
    }

    fn drain_after_blank_line(&mut self) -> Option<String> {
        let end = self.buf.find("\n\n")?;
        self.in_thinking = Some(false);
        let real = self.buf.split_off(end + 2);
        self.buf.clear();
        if real.is_empty() {
            None
        } else {
            Some(real)
        }
    }

    /// Leftovers once the stream closes (an unterminated preamble stays
    /// filtered; undecided short text is released).
    pub fn finish(self) -> Option<String> {
        match self.in_thinking {
            Some(true) => None,
            _ if self.buf.is_empty() => None,
            _ => Some(self.buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_reassembles_split_lines() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"data: {\"a\":").is_empty());
        let lines = buf.push(b" 1}\ndata: done\n");
        assert_eq!(lines, vec!["data: {\"a\": 1}", "data: done"]);
        assert!(buf.finish().is_none());
    }

    #[test]
    fn line_buffer_strips_carriage_returns() {
        let mut buf = LineBuffer::default();
        let lines = buf.push(b"event: ping\r\n");
        assert_eq!(lines, vec!["event: ping"]);
    }

    #[test]
    fn sse_data_extracts_payloads() {
        assert_eq!(sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(sse_data("data:{\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(sse_data("data: [DONE]"), None);
        assert_eq!(sse_data(""), None);
        assert_eq!(sse_data(": keepalive"), None);
        assert_eq!(sse_data("event: message_start"), None);
    }

    #[test]
    fn accumulator_joins_split_arguments() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(&serde_json::json!({
            "index": 0, "id": "call_a",
            "function": {"name": "look", "arguments": "{\"dire"}
        }));
        acc.push(&serde_json::json!({
            "index": 0,
            "function": {"arguments": "ction\": \"left\"}"}
        }));
        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].name, "look");
        assert_eq!(calls[0].input["direction"], "left");
    }

    #[test]
    fn accumulator_isolates_malformed_arguments() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(&serde_json::json!({
            "index": 0, "id": "bad",
            "function": {"name": "walk", "arguments": "{not json"}
        }));
        acc.push(&serde_json::json!({
            "index": 1, "id": "good",
            "function": {"name": "see", "arguments": "{}"}
        }));
        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].input, serde_json::json!({}));
        assert_eq!(calls[1].name, "see");
    }

    #[test]
    fn accumulator_synthesizes_missing_ids_in_index_order() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(&serde_json::json!({"index": 1, "function": {"name": "b", "arguments": "{}"}}));
        acc.push(&serde_json::json!({"index": 0, "function": {"name": "a", "arguments": "{}"}}));
        let calls = acc.finish();
        assert_eq!(calls[0].name, "a");
        assert_eq!(calls[1].name, "b");
        assert!(calls.iter().all(|c| c.id.starts_with("call_")));
    }

    #[test]
    fn thinking_filter_passes_normal_text() {
        let mut f = ThinkingFilter::new();
        let mut out = String::new();
        for chunk in ["Hel", "lo the", "re"] {
            if let Some(s) = f.push(chunk) {
                out.push_str(&s);
            }
        }
        if let Some(s) = f.finish() {
            out.push_str(&s);
        }
        assert_eq!(out, "Hello there");
    }

    #[test]
    fn thinking_filter_strips_thought_preamble() {
        let mut f = ThinkingFilter::new();
        let mut out = String::new();
        for chunk in ["THOUGHT", "\nI should look left.", "\n\nLooking now."] {
            if let Some(s) = f.push(chunk) {
                out.push_str(&s);
            }
        }
        if let Some(s) = f.finish() {
            out.push_str(&s);
        }
        assert_eq!(out, "Looking now.");
    }

    #[test]
    fn thinking_filter_drops_unterminated_preamble() {
        let mut f = ThinkingFilter::new();
        assert!(f.push("THOUGHT\nstill thinking").is_none());
        assert!(f.finish().is_none());
    }

    #[test]
    fn thinking_filter_releases_short_tail() {
        let mut f = ThinkingFilter::new();
        assert!(f.push("THO").is_none());
        assert_eq!(f.finish(), Some("THO".to_string()));
    }
}
