use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::OnceLock;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::{debug, info};

use crate::utils::error::ApiError;

static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("spaces regex"));
static HYPHEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)-\s*\n\s*(\w+)").expect("hyphen regex"));
static NEWLINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("newlines regex"));

static TOKENIZER: OnceLock<CoreBPE> = OnceLock::new();

/// cl100k_base matches the text-embedding-3-small embedder.
fn tokenizer() -> &'static CoreBPE {
    TOKENIZER.get_or_init(|| cl100k_base().expect("cl100k_base tokenizer initializes"))
}

/// Clean extracted PDF text: collapse space/tab runs, rejoin words
/// hyphenated across line breaks, collapse 3+ newlines to two, trim.
pub fn clean_text(text: &str) -> String {
    let text = SPACES_RE.replace_all(text, " ");
    let text = HYPHEN_RE.replace_all(&text, "${1}${2}");
    let text = NEWLINES_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub token_count: usize,
    pub start_char: usize,
    pub end_char: usize,
}

/// Fixed-size token windows with overlap. Successive window starts advance
/// by `chunk_size - overlap` tokens; the final short window is kept.
pub struct TokenChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TokenChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ApiError> {
        if overlap >= chunk_size {
            return Err(ApiError::Internal(format!(
                "chunk overlap ({}) must be less than chunk size ({})",
                overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk(&self, text: &str) -> Result<Vec<Chunk>, ApiError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let bpe = tokenizer();
        let tokens = bpe.encode_ordinary(text);
        let total_tokens = tokens.len();

        debug!("Text encoded to {} tokens", total_tokens);

        if total_tokens <= self.chunk_size {
            return Ok(vec![Chunk {
                index: 0,
                text: text.to_string(),
                token_count: total_tokens,
                start_char: 0,
                end_char: text.chars().count(),
            }]);
        }

        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total_tokens {
            let end = (start + self.chunk_size).min(total_tokens);

            let chunk_text = bpe
                .decode(tokens[start..end].to_vec())
                .map_err(|e| ApiError::Internal(format!("token decode failed: {}", e)))?;
            let start_char = if start > 0 {
                bpe.decode(tokens[..start].to_vec())
                    .map_err(|e| ApiError::Internal(format!("token decode failed: {}", e)))?
                    .chars()
                    .count()
            } else {
                0
            };
            let end_char = start_char + chunk_text.chars().count();

            chunks.push(Chunk {
                index: chunks.len(),
                text: chunk_text,
                token_count: end - start,
                start_char,
                end_char,
            });

            if start + self.chunk_size >= total_tokens {
                break;
            }

            start += step;
        }

        info!(
            "Chunking complete: {} chunks from {} tokens (size={}, overlap={})",
            chunks.len(),
            total_tokens,
            self.chunk_size,
            self.overlap
        );

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_with_tokens(n: usize) -> String {
        // Repeated lowercase words tokenize one per word and round-trip
        // exactly, so token-window arithmetic is stable in assertions.
        let base = "alpha beta gamma delta epsilon zeta eta theta ".repeat(n);
        let tokens = tokenizer().encode_ordinary(&base);
        assert!(tokens.len() >= n, "base text too short for {} tokens", n);
        let text = tokenizer().decode(tokens[..n].to_vec()).expect("decodes");
        assert_eq!(
            tokenizer().encode_ordinary(&text).len(),
            n,
            "fixture text must round-trip through the tokenizer"
        );
        text
    }

    #[test]
    fn clean_collapses_spaces_and_tabs() {
        assert_eq!(clean_text("a  b\t\tc"), "a b c");
    }

    #[test]
    fn clean_rejoins_hyphenated_line_breaks() {
        assert_eq!(clean_text("compu-\ntational"), "computational");
        assert_eq!(clean_text("compu- \n tational"), "computational");
    }

    #[test]
    fn clean_collapses_newline_runs() {
        assert_eq!(clean_text("a\n\n\n\nb"), "a\n\nb");
        // Two newlines stay as they are.
        assert_eq!(clean_text("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn clean_trims() {
        assert_eq!(clean_text("  hello  \n"), "hello");
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(TokenChunker::new(100, 100).is_err());
        assert!(TokenChunker::new(100, 150).is_err());
        assert!(TokenChunker::new(512, 100).is_ok());
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = TokenChunker::new(512, 100).unwrap();
        assert!(chunker.chunk("   \n ").unwrap().is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk_with_original_text() {
        let chunker = TokenChunker::new(512, 100).unwrap();
        let text = "Machine learning is a subset of AI.";
        let chunks = chunker.chunk(text).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, text.chars().count());
    }

    #[test]
    fn chunking_is_deterministic() {
        let chunker = TokenChunker::new(64, 16).unwrap();
        let text = text_with_tokens(500);

        let first = chunker.chunk(&text).unwrap();
        let second = chunker.chunk(&text).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn window_starts_advance_by_size_minus_overlap() {
        // 2048 tokens with S=512, O=100 gives windows at 0, 412, 824, 1236,
        // 1648 with the last one truncated to 400 tokens.
        let chunker = TokenChunker::new(512, 100).unwrap();
        let text = text_with_tokens(2048);

        let chunks = chunker.chunk(&text).unwrap();

        assert_eq!(chunks.len(), 5);
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert_eq!(
            chunks.iter().map(|c| c.token_count).collect::<Vec<_>>(),
            vec![512, 512, 512, 512, 400]
        );
    }

    #[test]
    fn successive_chunks_share_overlap_tokens() {
        let chunker = TokenChunker::new(64, 16).unwrap();
        let text = text_with_tokens(300);

        let chunks = chunker.chunk(&text).unwrap();
        assert!(chunks.len() >= 2);

        for pair in chunks.windows(2) {
            if pair[0].token_count < 64 || pair[1].token_count < 16 {
                continue;
            }
            let prev = tokenizer().encode_ordinary(&pair[0].text);
            let next = tokenizer().encode_ordinary(&pair[1].text);
            assert_eq!(prev[prev.len() - 16..], next[..16]);
        }
    }

    #[test]
    fn char_positions_are_cumulative() {
        let chunker = TokenChunker::new(64, 16).unwrap();
        let text = text_with_tokens(200);

        let chunks = chunker.chunk(&text).unwrap();
        for chunk in &chunks {
            assert_eq!(
                chunk.end_char - chunk.start_char,
                chunk.text.chars().count()
            );
        }
        assert_eq!(chunks[0].start_char, 0);
        assert!(chunks.windows(2).all(|p| p[0].start_char < p[1].start_char));
    }
}
