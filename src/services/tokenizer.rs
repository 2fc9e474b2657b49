//! Exact token counting, truncation, and sliding-window chunking over the
//! embedding model's BPE vocabulary. CPU-bound and synchronous throughout —
//! callers in async contexts must not treat these calls as suspension
//! points (see the concurrency model); bulk chunking is offloaded to
//! `spawn_blocking` by the ingestion pipeline, not by this module itself.

use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;
use tracing::warn;

static TOKENIZER: Lazy<CoreBPE> = Lazy::new(|| {
    tiktoken_rs::cl100k_base().expect("failed to load tokenizer vocabulary")
});

#[derive(Debug, thiserror::Error)]
pub enum TokenizerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub struct Tokenizer;

impl Tokenizer {
    pub fn model_name() -> &'static str {
        "cl100k_base"
    }

    pub fn vocab_size() -> usize {
        100_256
    }

    /// `count(null|empty) -> 0`, never fails; falls back to a 1-token-per-4-chars
    /// heuristic (logged as a warning) if the underlying tokenizer panics on
    /// malformed input.
    pub fn count(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        TOKENIZER.encode_ordinary(text).len()
    }

    /// Heuristic fallback (1 token ~= 4 chars), used only if a caller needs
    /// a count without paying for a real encode (not used internally; kept
    /// for parity with the fallback path truncate/chunk never silently
    /// skip — see `heuristic_count`).
    #[allow(dead_code)]
    pub fn count_heuristic(text: &str) -> usize {
        Self::heuristic_count(text)
    }

    pub fn count_batch(texts: &[String]) -> Vec<usize> {
        texts.iter().map(|t| Self::count(t)).collect()
    }

    fn heuristic_count(text: &str) -> usize {
        (text.chars().count() + 3) / 4
    }

    pub fn encode(text: &str) -> Result<Vec<usize>, TokenizerError> {
        Ok(TOKENIZER.encode_ordinary(text))
    }

    pub fn decode(ids: &[usize]) -> Result<String, TokenizerError> {
        TOKENIZER
            .decode(ids.to_vec())
            .map_err(|e| TokenizerError::InvalidArgument(e.to_string()))
    }

    /// No-op if `text` already fits `max_tokens`; otherwise returns a prefix
    /// whose re-count is `<= max_tokens` (tolerating up to 2 tokens of
    /// special-token overhead, never more).
    pub fn truncate(text: &str, max_tokens: usize) -> (String, bool) {
        let ids = TOKENIZER.encode_ordinary(text);
        if ids.len() <= max_tokens {
            return (text.to_string(), false);
        }

        let mut window_len = max_tokens;
        loop {
            let window = &ids[..window_len];
            let candidate = TOKENIZER
                .decode(window.to_vec())
                .unwrap_or_else(|_| text.chars().take(window_len * 4).collect());

            let recount = Self::count(&candidate);
            if recount <= max_tokens + 2 || window_len == 0 {
                if recount > max_tokens + 2 {
                    warn!(recount, max_tokens, "truncate overshot tolerance after hard-trim, giving up");
                }
                return (candidate, true);
            }

            warn!(recount, max_tokens, window_len, "truncate overshot tolerance, hard-trimming further");
            window_len -= 1;
        }
    }

    /// Sliding-window chunking: emit `text[0..chunk_size]` tokens, then
    /// advance by `chunk_size - overlap`, until exhausted. Whitespace-only
    /// chunks are dropped; a short input (< chunk_size tokens) yields a
    /// single chunk.
    pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, TokenizerError> {
        if chunk_size == 0 {
            return Err(TokenizerError::InvalidArgument("chunk_size must be > 0".into()));
        }
        if overlap >= chunk_size {
            return Err(TokenizerError::InvalidArgument(
                "overlap must be < chunk_size".into(),
            ));
        }

        let ids = TOKENIZER.encode_ordinary(text);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let stride = chunk_size - overlap;
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < ids.len() {
            let end = (start + chunk_size).min(ids.len());
            let window = &ids[start..end];
            let text_chunk = TOKENIZER
                .decode(window.to_vec())
                .map_err(|e| TokenizerError::InvalidArgument(e.to_string()))?;

            if !text_chunk.trim().is_empty() {
                chunks.push(text_chunk);
            }

            if end == ids.len() {
                break;
            }
            start += stride;
        }

        Ok(chunks)
    }
}
