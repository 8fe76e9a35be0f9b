//! Sentence-respecting document chunker.
//!
//! A document is read paragraph by paragraph (a blank line ends a paragraph).
//! Its lines are trimmed and joined with single spaces, so a line break and
//! the whitespace around it become one space. Whitespace inside a line is kept
//! as written, which makes a chunk holding one sentence hash the same as that
//! sentence added on its own. The paragraph is cut into sentences along Unicode
//! sentence boundaries, and the sentences are packed greedily into chunks of at
//! most `window_size` characters:
//!
//! - a sentence is never split across chunks;
//! - a chunk is longer than the window only when it is a single sentence that
//!   is longer than the window on its own;
//! - joining the chunks with spaces gives back every sentence once, in order.
//!
//! ```
//! use knowdb::chunker::chunk;
//!
//! let doc = "Sentence one. Sentence two is a bit longer. Sentence three.";
//! let chunks: Vec<String> = chunk(doc, 30).collect();
//! assert_eq!(chunks, ["Sentence one.", "Sentence two is a bit longer.", "Sentence three."]);
//! ```

use std::str::Lines;
use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_WINDOW_SIZE: usize = 500;

/// Chunks `document` into windows of at most `window_size` characters.
pub fn chunk(document: &str, window_size: usize) -> Chunks<'_> {
    Chunker::new(window_size).chunks(document)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    window_size: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Chunker::new(DEFAULT_WINDOW_SIZE)
    }
}

impl Chunker {
    pub fn new(window_size: usize) -> Self {
        Chunker { window_size }
    }

    /// Lazily chunks `document`. Calling this again restarts from the beginning.
    pub fn chunks<'a>(&self, document: &'a str) -> Chunks<'a> {
        Chunks {
            lines: document.lines(),
            sentences: Vec::new().into_iter(),
            buffer: String::new(),
            buffer_chars: 0,
            window_size: self.window_size,
        }
    }
}

/// Iterator over the chunks of one document. Cloning it forks the iteration.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    lines: Lines<'a>,
    sentences: std::vec::IntoIter<String>,
    buffer: String,
    buffer_chars: usize,
    window_size: usize,
}

impl Chunks<'_> {
    /// Next paragraph with its lines trimmed and joined, or `None` at end of input.
    fn next_paragraph(&mut self) -> Option<String> {
        let mut lines: Vec<&str> = Vec::new();
        for line in self.lines.by_ref() {
            let line = line.trim();
            if line.is_empty() {
                if lines.is_empty() {
                    continue;
                }
                break;
            }
            lines.push(line);
        }

        if lines.is_empty() {
            None
        } else {
            Some(lines.join(" "))
        }
    }

    fn next_sentence(&mut self) -> Option<String> {
        loop {
            if let Some(sentence) = self.sentences.next() {
                return Some(sentence);
            }
            let paragraph = self.next_paragraph()?;
            self.sentences = split_sentences(&paragraph).into_iter();
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while let Some(sentence) = self.next_sentence() {
            let len = sentence.chars().count();

            if self.buffer.is_empty() {
                self.buffer = sentence;
                self.buffer_chars = len;
                continue;
            }

            if self.buffer_chars + 1 + len <= self.window_size {
                self.buffer.push(' ');
                self.buffer.push_str(&sentence);
                self.buffer_chars += 1 + len;
                continue;
            }

            self.buffer_chars = len;
            return Some(std::mem::replace(&mut self.buffer, sentence));
        }

        if self.buffer.is_empty() {
            return None;
        }
        self.buffer_chars = 0;
        Some(std::mem::take(&mut self.buffer))
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

/// Splits text into trimmed, non-empty sentences. Line breaks (with the
/// whitespace around them) become single spaces; other inner whitespace is kept.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.unicode_sentences()
        .map(|sentence| {
            sentence
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

#[cfg(test)]
mod chunker_test {
    use super::*;

    const DOC: &str = "Sentence one. Sentence two is a bit longer. Sentence three.";

    fn sentences_of(chunks: &[String]) -> Vec<String> {
        chunks.iter().flat_map(|c| split_sentences(c)).collect()
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences(DOC),
            ["Sentence one.", "Sentence two is a bit longer.", "Sentence three."]
        );
    }

    #[test]
    fn test_window_30_gives_one_sentence_per_chunk() {
        // 13 + 1 + 29 > 30 and 29 + 1 + 15 > 30
        let chunks: Vec<String> = chunk(DOC, 30).collect();
        assert_eq!(chunks, ["Sentence one.", "Sentence two is a bit longer.", "Sentence three."]);
    }

    #[test]
    fn test_window_50_packs_first_two() {
        // 13 + 1 + 29 = 43 fits, adding 1 + 15 does not
        let chunks: Vec<String> = chunk(DOC, 50).collect();
        assert_eq!(chunks, ["Sentence one. Sentence two is a bit longer.", "Sentence three."]);
    }

    #[test]
    fn test_exact_fit_stays_in_one_chunk() {
        // 13 + 1 + 29 + 1 + 15 = 59
        let chunks: Vec<String> = chunk(DOC, 59).collect();
        assert_eq!(chunks, [DOC]);

        let chunks: Vec<String> = chunk(DOC, 58).collect();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_oversized_sentence_is_its_own_chunk() {
        let doc = "Short. This sentence is much longer than the window allows. Tiny.";
        let chunks: Vec<String> = chunk(doc, 10).collect();
        assert_eq!(
            chunks,
            ["Short.", "This sentence is much longer than the window allows.", "Tiny."]
        );
        for c in &chunks {
            assert!(c.chars().count() <= 10 || split_sentences(c).len() == 1);
        }
    }

    #[test]
    fn test_newlines_inside_sentence_become_spaces() {
        let doc = "  A sentence that  \n  wraps over lines.\nAnother one.  ";
        let chunks: Vec<String> = chunk(doc, 1000).collect();
        assert_eq!(chunks, ["A sentence that wraps over lines. Another one."]);
    }

    #[test]
    fn test_inner_whitespace_within_a_line_is_kept() {
        let doc = "Two  spaces\there. Plain one.";
        assert_eq!(split_sentences(doc), ["Two  spaces\there.", "Plain one."]);

        let chunks: Vec<String> = chunk(doc, 10).collect();
        assert_eq!(chunks, ["Two  spaces\there.", "Plain one."]);
    }

    #[test]
    fn test_blank_line_ends_a_paragraph() {
        let doc = "Title without a period\n\nBody starts here. It goes on.";
        let chunks: Vec<String> = chunk(doc, 1000).collect();
        assert_eq!(chunks, ["Title without a period Body starts here. It goes on."]);

        let sentences = sentences_of(&chunk(doc, 10).collect::<Vec<_>>());
        assert_eq!(sentences, ["Title without a period", "Body starts here.", "It goes on."]);
    }

    #[test]
    fn test_sentences_are_preserved_in_order() {
        let doc = "Alpha is first. Beta follows alpha. Gamma is third!\n\
                   Delta asks a question? Epsilon ends it.\n\n\
                   Zeta opens a new paragraph. Eta closes.";
        let expected: Vec<String> = doc
            .split("\n\n")
            .flat_map(|p| split_sentences(&p.split_whitespace().collect::<Vec<_>>().join(" ")))
            .collect();

        for window in [0, 5, 20, 40, 80, 10_000] {
            let chunks: Vec<String> = chunk(doc, window).collect();
            assert_eq!(sentences_of(&chunks), expected, "window {}", window);
        }
    }

    #[test]
    fn test_chunks_respect_window_when_possible() {
        let doc = "One two. Three four five. Six. Seven eight nine ten. Eleven.";
        for chunk_text in chunk(doc, 25) {
            assert!(chunk_text.chars().count() <= 25, "chunk too long: {}", chunk_text);
        }
    }

    #[test]
    fn test_window_counts_characters_not_bytes() {
        // each sentence is 6 chars but 8 bytes
        let doc = "Größe! Größe!";
        let chunks: Vec<String> = chunk(doc, 13).collect();
        assert_eq!(chunks, ["Größe! Größe!"]);
    }

    #[test]
    fn test_empty_and_blank_documents() {
        assert_eq!(chunk("", 100).count(), 0);
        assert_eq!(chunk(" \n\n \t\n", 100).count(), 0);
    }

    #[test]
    fn test_iterator_is_restartable_and_fused() {
        let chunker = Chunker::new(30);
        let mut first = chunker.chunks(DOC);
        let forked = first.clone();

        assert_eq!(first.by_ref().count(), 3);
        assert_eq!(first.next(), None);
        assert_eq!(forked.count(), 3);
        assert_eq!(chunker.chunks(DOC).count(), 3);
    }
}
