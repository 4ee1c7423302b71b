//! Fixed-size character segmentation
//!
//! Splits document text into contiguous slices of at most `max_chars`
//! characters. Word and sentence boundaries are ignored on purpose: a
//! sentence cut in two is translated as two independent pieces.

use std::num::NonZeroUsize;

/// Split `text` into segments of at most `max_chars` characters.
///
/// The segments partition the text: joined back together they reproduce it
/// exactly, and none of them is empty. Empty text yields no segments.
pub fn split_segments(text: &str, max_chars: NonZeroUsize) -> Vec<&str> {
    let max_chars = max_chars.get();
    let mut segments = Vec::with_capacity(text.len() / max_chars + 1);
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == max_chars {
            segments.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }

    if start < text.len() {
        segments.push(&text[start..]);
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: usize) -> NonZeroUsize {
        NonZeroUsize::new(v).unwrap()
    }

    #[test]
    fn test_empty_text_has_no_segments() {
        assert!(split_segments("", n(512)).is_empty());
    }

    #[test]
    fn test_short_text_is_one_segment() {
        assert_eq!(split_segments("Hallo Welt", n(512)), vec!["Hallo Welt"]);
    }

    #[test]
    fn test_segments_reassemble_exactly() {
        let texts = [
            "",
            "a",
            "Der schnelle braune Fuchs springt über den faulen Hund.",
            "Zeile eins\nZeile zwei\n\n\tEinrückung",
            "日本語のテキストと English mixed 🦀🦀🦀",
            "ﬁ ligature\u{0}control",
        ];

        for text in texts {
            for len in 1..=17 {
                let segments = split_segments(text, n(len));
                assert_eq!(segments.concat(), text, "len={len}");
                for segment in &segments {
                    assert!(!segment.is_empty());
                    assert!(segment.chars().count() <= len);
                }
            }
        }
    }

    #[test]
    fn test_exact_multiple_gives_full_segments() {
        let text = "abcdefghijkl";
        let segments = split_segments(text, n(4));
        assert_eq!(segments, vec!["abcd", "efgh", "ijkl"]);
    }

    #[test]
    fn test_exact_multiple_counts_characters_not_bytes() {
        // 6 characters, 12 bytes
        let text = "äöüÄÖÜ";
        let segments = split_segments(text, n(3));
        assert_eq!(segments, vec!["äöü", "ÄÖÜ"]);
    }

    #[test]
    fn test_remainder_goes_to_last_segment() {
        let segments = split_segments("abcdefg", n(3));
        assert_eq!(segments, vec!["abc", "def", "g"]);
    }

    #[test]
    fn test_long_document_segment_count() {
        let text = "x".repeat(512 * 5);
        let segments = split_segments(&text, n(512));
        assert_eq!(segments.len(), 5);
        assert!(segments.iter().all(|s| s.len() == 512));
    }
}
