use std::collections::VecDeque;

use crate::split::{Splitter, SplitterType};

/// Separators tried in order, from coarsest to finest.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Recursive character splitter
///
/// Splits on the coarsest separator present in the text, recursing into
/// pieces that are still too long, then greedily merges pieces back into
/// chunks of at most `chunk_size` characters. Consecutive chunks share up to
/// `chunk_overlap` characters of trailing pieces.
///
/// Separators stay attached to the start of the piece that follows them and
/// chunks are whitespace-trimmed.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub(crate) kind: SplitterType,
}

impl RecursiveSplitter {
    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // pick the first separator present; "" always matches
        let mut separator = "";
        let mut finer: &[&str] = &[];
        for (i, s) in separators.iter().enumerate() {
            if s.is_empty() {
                break;
            }
            if text.contains(s) {
                separator = *s;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                docs.extend(join(&current));

                // drop leading pieces until what is left fits as overlap
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front);
                }
            }
            current.push_back(piece);
            total += len;
        }

        docs.extend(join(&current));
        docs
    }
}

impl Splitter for RecursiveSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_query(&self, text: &str) -> Vec<String> {
        self.split(text)
    }

    fn splitter_type(&self) -> SplitterType {
        self.kind
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Split `text` on `separator`, attaching each separator to the piece after it.
///
/// An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        pieces.push(&text[start..idx]);
        start = idx;
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = "The character depicted in the image appears to be a female elf, given the pointed ears and slender build. She possesses a demeanor that suggests a neutral alignment, focused more on balance or personal goals than strict adherence to good or evil, lawful or chaotic behaviors. The most fitting classes for her would likely be those associated with magic and nature, such as a druid or a ranger.\n\n{\n    \"race\": \"elf\",\n    \"gender\": \"female\",\n    \"alignment\": \"neutral\",\n    \"classes\": [\"druid\", \"ranger\"]\n}";

    fn splitter(chunk_size: usize, chunk_overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter {
            chunk_size,
            chunk_overlap,
            kind: SplitterType::RecursiveChunk120Overlap60,
        }
    }

    #[test]
    fn test_words_without_overlap() {
        let chunks = splitter(10, 0).split("aaaa bbbb cccc dddd");
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc dddd"]);
    }

    #[test]
    fn test_words_with_overlap() {
        let chunks = splitter(10, 5).split("aaaa bbbb cccc dddd");
        assert_eq!(chunks, vec!["aaaa bbbb", "bbbb cccc", "cccc dddd"]);
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let chunks = splitter(15, 0).split("first para\n\nsecond para");
        assert_eq!(chunks, vec!["first para", "second para"]);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = splitter(120, 60).split("A rogue elf female with a knife");
        assert_eq!(chunks, vec!["A rogue elf female with a knife"]);
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let chunks = splitter(4, 0).split("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let chunks = splitter(120, 60).split(DESCRIPTION);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 120, "chunk too long: {chunk:?}");
            assert!(!chunk.trim().is_empty());
            assert!(DESCRIPTION.contains(chunk.as_str()));
        }
    }

    #[test]
    fn test_deterministic() {
        let s = splitter(120, 60);
        assert_eq!(s.split(DESCRIPTION), s.split(DESCRIPTION));
        assert_eq!(s.split_query(DESCRIPTION), s.split(DESCRIPTION));
    }

    #[test]
    fn test_empty_content() {
        assert!(splitter(10, 0).split("").is_empty());
        assert!(splitter(10, 0).split(" \n\n ").is_empty());
    }

    #[test]
    fn test_unicode_safety() {
        let chunks = splitter(5, 0).split("Hello 👋 World");
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(char_len(chunk) <= 5);
        }
    }

    #[test]
    fn test_split_keeping_separator() {
        assert_eq!(
            split_keeping_separator("a\n\nb\n\nc", "\n\n"),
            vec!["a", "\n\nb", "\n\nc"]
        );
        assert_eq!(split_keeping_separator("ab", ""), vec!["a", "b"]);
    }
}
