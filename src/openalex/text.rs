//! Abstract reconstruction and summary derivation.

use serde_json::Value;

/// Rebuild linear abstract text from the upstream inverted index
/// (token -> positions). Tokens are placed in position order and joined by
/// single spaces, so gaps in the position sequence collapse; positions past
/// the declared length just sort to the end. Returns `None` when the index
/// is absent or yields no tokens.
pub fn reconstruct_abstract(inverted_index: &Value) -> Option<String> {
    let obj = inverted_index.as_object()?;

    let mut words: Vec<(i64, &str)> = Vec::new();
    for (word, positions) in obj {
        if let Some(pos_array) = positions.as_array() {
            for pos in pos_array {
                if let Some(p) = pos.as_i64() {
                    words.push((p, word.as_str()));
                }
            }
        }
    }

    if words.is_empty() {
        return None;
    }

    words.sort_by_key(|(pos, _)| *pos);
    let text = words
        .iter()
        .map(|(_, w)| *w)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Short derived summary: the first `sentences` sentences of the abstract.
/// Texts under 50 chars are not worth summarizing; when no sentence
/// boundary is found a word-aligned 200-char prefix is used instead.
pub fn summarize(text: &str, sentences: usize) -> Option<String> {
    let text = text.trim();
    if text.len() < 50 {
        return None;
    }

    let mut taken = 0usize;
    let mut end = None;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') {
            let at_boundary = bytes
                .get(i + 1)
                .map(|&next| next == b' ' || next == b'\n')
                .unwrap_or(true);
            if at_boundary {
                taken += 1;
                if taken == sentences {
                    end = Some(i + 1);
                    break;
                }
            }
        }
    }

    match end {
        Some(end) if end < text.len() => Some(text[..end].trim().to_string()),
        Some(_) => None, // summary would be the whole text
        None if text.len() > 200 => {
            let prefix = &text[..200];
            let cut = prefix.rfind(' ').unwrap_or(prefix.len());
            Some(format!("{}...", &prefix[..cut]))
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reconstructs_in_position_order() {
        let index = json!({
            "deep": [0],
            "learning": [1],
            "networks": [3],
            "neural": [2],
        });
        assert_eq!(
            reconstruct_abstract(&index).unwrap(),
            "deep learning neural networks"
        );
    }

    #[test]
    fn repeated_tokens_appear_at_each_position() {
        let index = json!({
            "the": [0, 2],
            "cat": [1],
            "sat": [3],
        });
        assert_eq!(reconstruct_abstract(&index).unwrap(), "the cat the sat");
    }

    #[test]
    fn out_of_range_positions_do_not_panic() {
        let index = json!({
            "start": [0],
            "stray": [9999],
        });
        assert_eq!(reconstruct_abstract(&index).unwrap(), "start stray");
    }

    #[test]
    fn missing_or_empty_index_yields_none() {
        assert!(reconstruct_abstract(&json!(null)).is_none());
        assert!(reconstruct_abstract(&json!({})).is_none());
        assert!(reconstruct_abstract(&json!({"word": "not-an-array"})).is_none());
    }

    #[test]
    fn summarize_takes_leading_sentences() {
        let text = "First sentence about transformers. Second one with detail. Third is dropped.";
        assert_eq!(
            summarize(text, 2).unwrap(),
            "First sentence about transformers. Second one with detail."
        );
    }

    #[test]
    fn summarize_skips_short_text() {
        assert!(summarize("Too short.", 2).is_none());
    }

    #[test]
    fn summarize_falls_back_to_prefix_without_boundaries() {
        let text = "word ".repeat(100);
        let summary = summarize(&text, 2).unwrap();
        assert!(summary.ends_with("..."));
        assert!(summary.len() <= 204);
    }
}
