//! Deterministic renderers that turn recalled records into prompt blocks.
//!
//! Format: a localized header line followed by one bullet per record,
//! `- <date> <time> [<emotion>]: <content>`, with the similarity score
//! appended when the record came from the vector-search path.

use familiar_config::locale::{tr, Lang};

use crate::types::MemoryRecord;

const CONTENT_LIMIT: usize = 120;

fn render(header: &str, records: &[MemoryRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }
    let mut lines = vec![header.to_string()];
    for r in records {
        let score = match r.score {
            Some(s) => format!(" ({s:.2})"),
            None => String::new(),
        };
        let content: String = r.content.chars().take(CONTENT_LIMIT).collect();
        lines.push(format!(
            "- {} {} [{}]{}: {}",
            r.date,
            r.time,
            r.emotion.as_str(),
            score,
            content
        ));
    }
    lines.join("\n")
}

/// General recalled-memory block.
pub fn format_for_context(lang: Lang, records: &[MemoryRecord]) -> String {
    render(tr(lang, "memory_header"), records)
}

/// Recent feelings block.
pub fn format_feelings_for_context(lang: Lang, records: &[MemoryRecord]) -> String {
    render(tr(lang, "feelings_header"), records)
}

/// Self-model insights block (morning reconstruction).
pub fn format_self_model_for_context(lang: Lang, records: &[MemoryRecord]) -> String {
    render(tr(lang, "self_model_header"), records)
}

/// Unresolved-curiosities block (morning reconstruction).
pub fn format_curiosities_for_context(lang: Lang, records: &[MemoryRecord]) -> String {
    render(tr(lang, "curiosity_header"), records)
}
