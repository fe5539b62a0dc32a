// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt canonicalization and hashing.

use sha2::{Digest, Sha256};

/// Words dropped before similarity scoring.
pub(crate) const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it",
    "its", "of", "on", "or", "that", "the", "this", "to", "was", "with", "very", "some",
];

/// Lowercase, strip punctuation, and collapse whitespace.
pub fn canonicalize(prompt: &str) -> String {
    let cleaned: String = prompt
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Order-independent fingerprint of a prompt.
///
/// Two prompts that canonicalize to the same multiset of words share a hash.
pub fn canonical_hash(prompt: &str) -> String {
    let canonical = canonicalize(prompt);
    let mut words: Vec<&str> = canonical.split(' ').filter(|w| !w.is_empty()).collect();
    words.sort_unstable();
    hex::encode(Sha256::digest(words.join(" ").as_bytes()))
}

/// Canonical tokens with stop words removed.
pub fn content_tokens(prompt: &str) -> Vec<String> {
    canonicalize(prompt)
        .split(' ')
        .filter(|w| !w.is_empty() && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_normalizes_case_punctuation_and_spacing() {
        assert_eq!(
            canonicalize("  A Photorealistic   portrait, STUDIO lighting!  "),
            "a photorealistic portrait studio lighting"
        );
    }

    #[test]
    fn hash_ignores_word_order() {
        assert_eq!(
            canonical_hash("red dragon, flying"),
            canonical_hash("flying red dragon")
        );
        assert_ne!(canonical_hash("red dragon"), canonical_hash("blue dragon"));
    }

    #[test]
    fn hash_is_hex_sha256() {
        let h = canonical_hash("anything");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn content_tokens_drop_stop_words() {
        assert_eq!(
            content_tokens("a portrait of the queen"),
            vec!["portrait".to_string(), "queen".to_string()]
        );
    }
}
