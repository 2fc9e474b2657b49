//! Greedy, token-budgeted packing of high-relevance chunks into a bounded
//! context string. Rollback-by-truncate-on-overflow carried over from
//! `services/rag_service.rs::build_structured_context`/`format_grouped_context`,
//! reworked from its XML-tag framing to a plain `"[Source: <title>] <text>"`
//! framing.

use crate::models::{ContextBuildResult, NoteMeta, RetrievedChunk, Source};
use crate::services::tokenizer::Tokenizer;
use std::collections::HashMap;

pub struct ContextAssembler;

impl ContextAssembler {
    /// Low-relevance chunks are never included — they exist only so the
    /// orchestrator can distinguish "nothing found" from "only weak hits
    /// found"; they play no role in assembly itself.
    pub fn build(
        high_relevance: &[RetrievedChunk],
        notes: &HashMap<String, NoteMeta>,
        budget: usize,
    ) -> ContextBuildResult {
        let mut used = 0usize;
        let mut selected_text = Vec::new();
        let mut selected_sources: Vec<Source> = Vec::new();
        let mut seen_notes = std::collections::HashSet::new();
        let mut chunks_used = 0usize;
        let mut chunks_skipped = 0usize;
        let mut context_truncated = false;

        for rc in high_relevance {
            let title = notes
                .get(&rc.chunk.note_id)
                .map(|n| n.title.as_str())
                .unwrap_or("Untitled note");

            let formatted = format!("[Source: {}] {}", title, rc.chunk.text);
            let tokens = Tokenizer::count(&formatted);

            if used + tokens <= budget {
                used += tokens;
                chunks_used += 1;
                selected_text.push(formatted);

                if seen_notes.insert(rc.chunk.note_id.clone()) {
                    if let Some(meta) = notes.get(&rc.chunk.note_id) {
                        selected_sources.push(Source {
                            note_id: meta.note_id.clone(),
                            title: meta.title.clone(),
                            preacher: meta.preacher.clone(),
                            scripture_refs: meta.scripture_refs.clone(),
                            tags: meta.tags.clone(),
                        });
                    } else {
                        selected_sources.push(Source {
                            note_id: rc.chunk.note_id.clone(),
                            title: title.to_string(),
                            preacher: None,
                            scripture_refs: None,
                            tags: None,
                        });
                    }
                }
            } else {
                chunks_skipped += 1;
                context_truncated = true;
            }
        }

        ContextBuildResult {
            context_text: selected_text.join("\n\n"),
            sources: selected_sources,
            chunks_used,
            chunks_skipped,
            context_tokens: used,
            context_truncated,
        }
    }
}
