//! Deterministic token counting used for cost estimation.
//!
//! The counts only need to be stable and roughly proportional to what the
//! provider bills; they are never sent to the provider.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tokenizers::Tokenizer;

/// Approximate characters per token for a single long word.
const CHARS_PER_TOKEN: usize = 4;

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Pre-tokenises into words, numbers and single punctuation marks, then
/// charges every word one token per started group of four characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexTokenCounter;

fn pre_tokenizer() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\p{L}+|\p{N}+|[^\s\p{L}\p{N}]").expect("static pattern is valid")
    })
}

impl TokenCounter for RegexTokenCounter {
    fn count(&self, text: &str) -> usize {
        pre_tokenizer()
            .find_iter(text)
            .map(|piece| piece.as_str().chars().count().div_ceil(CHARS_PER_TOKEN).max(1))
            .sum()
    }
}

/// Counts with a HuggingFace `tokenizer.json`.
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let tokenizer = Tokenizer::from_file(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.get_ids().len(),
            Err(e) => {
                tracing::warn!("Tokenizer failed, falling back to estimate: {}", e);
                RegexTokenCounter.count(text)
            }
        }
    }
}
