//! The Chunker (§4.E). Sentence-aware packing with a word-window fallback;
//! both paths guarantee forward progress and dense, 0-based chunk indices.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: i64,
    pub token_count: i64,
    pub text_hash: String,
}

pub struct Chunker {
    pub window: usize,
    pub overlap: usize,
}

impl Chunker {
    pub fn new(window: usize, overlap: usize) -> Self {
        assert!(overlap < window, "chunk overlap must be smaller than the window");
        Self { window, overlap }
    }

    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let sentences = split_sentences(text);
        let windows = if sentences.len() > 1 {
            self.pack_sentences(&sentences)
        } else {
            self.pack_words(text)
        };

        windows
            .into_iter()
            .enumerate()
            .map(|(index, chunk_text)| TextChunk {
                token_count: count_tokens(&chunk_text) as i64,
                text_hash: hash_text(&chunk_text),
                chunk_index: index as i64,
                text: chunk_text,
            })
            .collect()
    }

    /// Greedily pack sentences until the next one would exceed `window`
    /// tokens, then start the next chunk with the trailing `overlap`-token
    /// suffix of the chunk just emitted.
    fn pack_sentences(&self, sentences: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_tokens = 0usize;
        let mut i = 0;

        while i < sentences.len() {
            let sentence = sentences[i].as_str();
            let sentence_tokens = count_tokens(sentence);

            if !current.is_empty() && current_tokens + sentence_tokens > self.window {
                chunks.push(current.join(" "));
                let carried = carry_over_suffix(&current, self.overlap);
                let carried_tokens: usize = carried.iter().map(|s| count_tokens(s)).sum();

                if carried_tokens + sentence_tokens > self.window {
                    // The carry-over alone still leaves no room for the
                    // next sentence (the chunk just flushed was one
                    // oversized sentence) — drop the overlap here so the
                    // next sentence starts a fresh chunk instead of
                    // colliding with the same carry-over forever.
                    current = Vec::new();
                    current_tokens = 0;
                } else {
                    current = carried;
                    current_tokens = carried_tokens;
                }
                continue;
            }

            // `current` is empty here whenever a sentence alone exceeds
            // `window` (or is the first sentence); take it regardless so
            // an oversized sentence becomes its own over-large chunk
            // instead of the loop spinning trying to shrink it.
            current.push(sentence);
            current_tokens += sentence_tokens;
            i += 1;
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }

        chunks
    }

    /// Word-window fallback when sentence segmentation gives a single
    /// "sentence" (e.g. no terminal punctuation). Stride is `window -
    /// overlap`, clamped to at least 1 so the window always advances.
    fn pack_words(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let stride = self.window.saturating_sub(self.overlap).max(1);
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < words.len() {
            let end = (start + self.window).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end == words.len() {
                break;
            }
            start += stride;
        }

        chunks
    }
}

/// Returns the trailing sentences of `sentences` whose combined token
/// count is closest to (without exceeding) `overlap`, preserving order.
fn carry_over_suffix<'a>(sentences: &[&'a str], overlap: usize) -> Vec<&'a str> {
    if overlap == 0 {
        return Vec::new();
    }
    let mut suffix = Vec::new();
    let mut tokens = 0usize;
    for sentence in sentences.iter().rev() {
        let sentence_tokens = count_tokens(sentence);
        if tokens + sentence_tokens > overlap && !suffix.is_empty() {
            break;
        }
        suffix.push(*sentence);
        tokens += sentence_tokens;
    }
    suffix.reverse();
    suffix
}

/// Whitespace-delimited token count — the chunker's unit throughout, kept
/// deliberately simple since the embedding collaborator owns tokenization
/// for the model it actually runs.
fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_owned());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_owned());
    }

    sentences
}

fn hash_text(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(Chunker::new(512, 50).chunk("").is_empty());
        assert!(Chunker::new(512, 50).chunk("   ").is_empty());
    }

    #[test]
    fn exact_window_size_is_one_chunk() {
        let words: Vec<String> = (0..512).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let chunks = Chunker::new(512, 50).chunk(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_count, 512);
    }

    #[test]
    fn one_over_window_size_produces_two_overlapping_chunks() {
        let words: Vec<String> = (0..513).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let chunks = Chunker::new(512, 50).chunk(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 1);

        let first_words: Vec<&str> = chunks[0].text.split_whitespace().collect();
        let second_words: Vec<&str> = chunks[1].text.split_whitespace().collect();
        let overlap: Vec<&&str> = first_words
            .iter()
            .rev()
            .take(50)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let second_prefix: Vec<&&str> = second_words.iter().take(50).collect();
        assert_eq!(overlap, second_prefix);
    }

    #[test]
    fn chunk_indices_are_dense_and_start_at_zero() {
        let words: Vec<String> = (0..2000).map(|i| format!("w{i}")).collect();
        let chunks = Chunker::new(512, 50).chunk(&words.join(" "));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
        }
    }

    #[test]
    fn sentence_aware_packing_keeps_sentences_whole() {
        let text = "Alpha bravo charlie. Delta echo foxtrot. Golf hotel india.";
        let chunks = Chunker::new(6, 2).chunk(text);
        assert!(chunks.iter().all(|c| c.text.ends_with('.')));
    }

    #[test]
    fn oversized_sentence_is_emitted_as_its_own_chunk_without_looping() {
        let oversized: Vec<String> = (0..600).map(|i| format!("w{i}")).collect();
        let text = format!("{}. The end.", oversized.join(" "));
        let chunks = Chunker::new(512, 50).chunk(&text);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].token_count > 512);
        assert!(chunks[1].text.contains("The end."));
    }

    #[test]
    fn stride_guarantees_forward_progress_even_with_large_overlap() {
        let words: Vec<String> = (0..100).map(|i| format!("w{i}")).collect();
        let chunker = Chunker::new(10, 9);
        let chunks = chunker.chunk(&words.join(" "));
        assert!(chunks.len() > 1);
        assert!(chunks.len() < 100);
    }
}
