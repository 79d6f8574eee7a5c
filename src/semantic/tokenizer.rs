//! Query tokenization for the text tower.
//!
//! The text model consumes a fixed-length row of token ids. Turning the raw
//! query into ids is a separate step behind `QueryTokenizer`; the default
//! implementation reads a HuggingFace `tokenizer.json` for the CLIP BPE
//! vocabulary.

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tokenizers::Tokenizer;

/// Errors that can occur while tokenizing a query.
#[derive(Debug, thiserror::Error)]
pub enum TokenizeError {
    #[error("Failed to load tokenizer from {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("Failed to tokenize query: {0}")]
    Encode(String),
}

/// Maps query text to token ids of exactly the model's context length.
///
/// Implementations may block (file reads, BPE merges); callers run them on
/// the blocking pool.
pub trait QueryTokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<i64>, TokenizeError>;
}

/// CLIP tokenizer backed by a `tokenizer.json` file, loaded on first use.
pub struct ClipTokenizer {
    path: PathBuf,
    context_length: usize,
    inner: OnceCell<Tokenizer>,
}

impl ClipTokenizer {
    pub fn new(path: PathBuf, context_length: usize) -> Self {
        Self {
            path,
            context_length,
            inner: OnceCell::new(),
        }
    }

    /// A failed load is not cached; the next call retries.
    fn tokenizer(&self) -> Result<&Tokenizer, TokenizeError> {
        self.inner.get_or_try_init(|| {
            log::debug!("Loading tokenizer from {}", self.path.display());
            Tokenizer::from_file(&self.path).map_err(|e| TokenizeError::Load {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
        })
    }
}

impl QueryTokenizer for ClipTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<i64>, TokenizeError> {
        let tokenizer = self.tokenizer()?;
        let encoding = tokenizer
            .encode(text.trim(), true)
            .map_err(|e| TokenizeError::Encode(e.to_string()))?;

        let ids = encoding.get_ids().iter().map(|&id| id as i64).collect();
        Ok(fit_context(ids, self.context_length))
    }
}

/// Truncate or zero-pad `ids` to `context_length`.
///
/// Truncation keeps the final id, which is the end-of-text token the text
/// tower pools on.
pub fn fit_context(mut ids: Vec<i64>, context_length: usize) -> Vec<i64> {
    if ids.len() > context_length {
        let last = ids[ids.len() - 1];
        ids.truncate(context_length);
        if let Some(slot) = ids.last_mut() {
            *slot = last;
        }
    } else {
        ids.resize(context_length, 0);
    }
    ids
}
