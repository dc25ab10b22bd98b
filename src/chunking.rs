//! Splitting long documents into windows that are embedded separately.
//!
//! ColBERT encoders truncate their input, so a long document is cut into
//! character windows of roughly the model's document length. The default is
//! 1024 tokens (~4K characters).

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Approximate characters per token for English text.
const CHARS_PER_TOKEN: usize = 4;

const DEFAULT_DOCUMENT_TOKENS: usize = 1024;

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = DEFAULT_DOCUMENT_TOKENS * CHARS_PER_TOKEN;

/// Default overlap between chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 0;

/// How far back from a window's end to look for whitespace to break on.
const BOUNDARY_LOOKBACK: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentenceTransformersConfig {
    document_length: Option<usize>,
}

/// Derive chunking settings for a model.
///
/// A local model directory carrying `config_sentence_transformers.json`
/// with a `document_length` sets the chunk size to `document_length * 4`
/// characters. Remote model IDs use the defaults.
///
/// # Examples
///
/// ```
/// use doc_search::chunking::{resolve_chunking_config, DEFAULT_CHUNK_SIZE};
///
/// let config = resolve_chunking_config("lightonai/GTE-ModernColBERT-v1");
/// assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
/// ```
pub fn resolve_chunking_config(model_id: &str) -> ChunkingConfig {
    let config_path =
        Path::new(model_id).join("config_sentence_transformers.json");
    let document_length = std::fs::read_to_string(config_path)
        .ok()
        .and_then(|contents| {
            serde_json::from_str::<SentenceTransformersConfig>(&contents).ok()
        })
        .and_then(|config| config.document_length);

    match document_length {
        Some(tokens) => ChunkingConfig {
            chunk_size: tokens.saturating_mul(CHARS_PER_TOKEN).max(1),
            overlap: DEFAULT_CHUNK_OVERLAP,
        },
        None => ChunkingConfig::default(),
    }
}

/// A window of a larger document.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    /// Zero-based chunk index within the document.
    pub index: usize,
    /// Byte offset where this chunk starts in the original document.
    pub start_offset: usize,
}

/// Split text into chunks of at most `chunk_size` characters.
///
/// Windows end on whitespace where possible and consecutive windows share
/// `overlap` characters. Every character of the input lands in at least one
/// chunk. Whitespace-only windows are dropped.
///
/// # Examples
///
/// ```
/// use doc_search::chunking::chunk_text;
///
/// let chunks = chunk_text("Hello, world!", 1000, 0);
/// assert_eq!(chunks.len(), 1);
///
/// let text = "word ".repeat(500);
/// assert!(chunk_text(&text, 1000, 200).len() >= 2);
/// ```
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let char_count = text.chars().count();

    if char_count <= chunk_size {
        if text.trim().is_empty() {
            return Vec::new();
        }
        return vec![Chunk {
            text: text.to_string(),
            index: 0,
            start_offset: 0,
        }];
    }

    // char index -> byte index, with one trailing entry for the end.
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut chunks = Vec::new();
    let mut start_char = 0;

    loop {
        let window_end = (start_char + chunk_size).min(char_count);
        let end_char = if window_end < char_count {
            word_boundary(text, &char_to_byte, start_char, window_end)
        } else {
            window_end
        };

        let start_byte = char_to_byte[start_char];
        let slice = &text[start_byte..char_to_byte[end_char]];
        if !slice.trim().is_empty() {
            chunks.push(Chunk {
                text: slice.to_string(),
                index: chunks.len(),
                start_offset: start_byte,
            });
        }

        if end_char >= char_count {
            break;
        }
        start_char = end_char.saturating_sub(overlap).max(start_char + 1);
    }

    chunks
}

/// Last position after whitespace within the lookback window before `end`,
/// or `end` itself when the window has no whitespace.
fn word_boundary(
    text: &str,
    char_to_byte: &[usize],
    start: usize,
    end: usize,
) -> usize {
    let floor = end.saturating_sub(BOUNDARY_LOOKBACK).max(start + 1);
    (floor..end)
        .rev()
        .find(|&i| {
            text[char_to_byte[i]..char_to_byte[i + 1]]
                .starts_with(char::is_whitespace)
        })
        .map_or(end, |i| i + 1)
}

/// Key for one chunk's embedding. Chunk 0 shares the document's key.
///
/// # Examples
///
/// ```
/// use doc_search::chunking::chunk_doc_id;
///
/// assert_eq!(chunk_doc_id(42, 0), 42);
/// assert_ne!(chunk_doc_id(42, 1), 42);
/// ```
pub fn chunk_doc_id(base_id: u64, chunk_index: usize) -> u64 {
    if chunk_index == 0 {
        base_id
    } else {
        base_id ^ ((chunk_index as u64) << 48)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", DEFAULT_CHUNK_SIZE, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start_offset, 0);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(chunk_text("   \n", 100, 0).is_empty());
        assert!(chunk_text("", 100, 0).is_empty());
    }

    #[test]
    fn without_overlap_chunks_partition_text() {
        let text = "word ".repeat(500);
        let chunks = chunk_text(&text, 1000, 0);

        assert!(chunks.len() >= 3);
        assert_eq!(reassemble(&chunks), text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(chunk.text.chars().count() <= 1000);
        }
    }

    #[test]
    fn short_tail_is_kept() {
        let text = format!("{} tail", "a".repeat(1000));
        let chunks = chunk_text(&text, 1000, 0);
        assert!(chunks.last().unwrap().text.ends_with("tail"));
    }

    #[test]
    fn chunks_overlap_when_requested() {
        let text = "word ".repeat(500);
        let chunks = chunk_text(&text, 1000, 200);

        let first_end = chunks[0].start_offset + chunks[0].text.len();
        assert!(chunks[1].start_offset < first_end);
    }

    #[test]
    fn breaks_on_whitespace() {
        let text = "alpha beta gamma delta epsilon";
        let chunks = chunk_text(text, 12, 0);
        assert_eq!(chunks[0].text, "alpha beta ");
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn handles_multibyte_chars() {
        let text = "café ☕ naïve 日本語 🎉 ".repeat(50);
        let chunks = chunk_text(&text, 100, 20);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(text.is_char_boundary(chunk.start_offset));
            assert!(chunk.text.chars().count() <= 100);
        }
    }

    #[test]
    fn chunk_ids() {
        let base = 12345678u64;
        assert_eq!(chunk_doc_id(base, 0), base);
        assert_ne!(chunk_doc_id(base, 1), base);
        assert_ne!(chunk_doc_id(base, 1), chunk_doc_id(base, 2));
    }

    #[test]
    fn chunking_config_from_local_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config_sentence_transformers.json"),
            "{\"document_length\": 512}",
        )
        .unwrap();

        let config = resolve_chunking_config(&dir.path().to_string_lossy());
        assert_eq!(config.chunk_size, 512 * CHARS_PER_TOKEN);
        assert_eq!(config.overlap, DEFAULT_CHUNK_OVERLAP);
    }

    #[test]
    fn chunking_config_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = resolve_chunking_config(&dir.path().to_string_lossy());
        assert_eq!(config, ChunkingConfig::default());
    }
}
