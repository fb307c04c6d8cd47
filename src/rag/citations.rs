use log::{ debug, warn };
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

use crate::error::CitationError;
use crate::llm::grounding::{ Grounding, RetrievedContext };

const PREVIEW_CHARS: usize = 500;

/// Observer for what retrieval handed back. Purely diagnostic.
pub trait GroundingTrace: Send + Sync {
    fn chunks_retrieved(&self, _count: usize) {}
    fn chunk(&self, _index: usize, _context: Option<&RetrievedContext>) {}
    fn supports(&self, _supports: &[JsonValue]) {}
    fn malformed(&self, _error: &CitationError) {}
}

/// Writes retrieval diagnostics to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTrace;

impl GroundingTrace for LogTrace {
    fn chunks_retrieved(&self, count: usize) {
        if count == 0 {
            debug!("No chunks retrieved from file search");
        } else {
            debug!("Total chunks retrieved: {}", count);
        }
    }

    fn chunk(&self, index: usize, context: Option<&RetrievedContext>) {
        let Some(ctx) = context else {
            debug!("Chunk {}: no retrieved context", index + 1);
            return;
        };
        debug!("Chunk {}: title={:?} uri={:?}", index + 1, ctx.title, ctx.uri);
        if let Some(text) = ctx.text.as_deref() {
            debug!("Chunk {} preview: {}", index + 1, preview(text));
        }
    }

    fn supports(&self, supports: &[JsonValue]) {
        debug!("Grounding supports: {}", supports.len());
        for (j, support) in supports.iter().enumerate() {
            debug!("  Support {}: {}", j + 1, support);
        }
    }
}

/// Discards all diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTrace;

impl GroundingTrace for NoTrace {}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

pub fn format_citation(label: &str) -> String {
    format!("Source: {}", label)
}

/// Derives de-duplicated, alphabetically ordered `Source: <label>` strings.
///
/// Best effort: absent or malformed grounding yields an empty list, and chunks that failed to
/// decode or carry no usable title or URI are skipped.
pub fn extract_citations(grounding: &Grounding, trace: &dyn GroundingTrace) -> Vec<String> {
    let metadata = match grounding {
        Grounding::Absent => {
            trace.chunks_retrieved(0);
            return Vec::new();
        }
        Grounding::Malformed(reason) => {
            let err = CitationError::Malformed(reason.clone());
            warn!("Error extracting citations: {}", err);
            trace.malformed(&err);
            return Vec::new();
        }
        Grounding::Present(metadata) => metadata,
    };

    let chunks = metadata.grounding_chunks.as_deref().unwrap_or_default();
    trace.chunks_retrieved(chunks.len());

    for rejected in &metadata.rejected_chunks {
        let err = CitationError::Chunk {
            index: rejected.index,
            reason: rejected.reason.clone(),
        };
        warn!("Skipping grounding chunk: {}", err);
        trace.malformed(&err);
    }

    let mut sources = BTreeSet::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let context = chunk.retrieved_context.as_ref();
        trace.chunk(i, context);
        if let Some(label) = context.and_then(RetrievedContext::label) {
            sources.insert(label);
        }
    }

    if let Some(supports) = metadata.grounding_supports.as_deref().filter(|s| !s.is_empty()) {
        trace.supports(supports);
    }

    sources.into_iter().map(format_citation).collect()
}
