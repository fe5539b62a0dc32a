// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt similarity scoring for approximate cache matches.

use std::collections::{BTreeSet, HashMap};

use crate::canonical::content_tokens;

/// Domain vocabulary for the keyword-overlap signal: styles, subjects, lighting.
const DOMAIN_KEYWORDS: &[&str] = &[
    // styles
    "photorealistic", "realistic", "photo", "photograph", "cartoon", "anime", "manga",
    "watercolor", "oil", "painting", "sketch", "drawing", "illustration", "digital", "3d",
    "render", "pixel", "minimalist", "abstract", "surreal", "vintage", "retro", "cyberpunk",
    "fantasy", "noir", "impressionist",
    // subjects
    "portrait", "landscape", "cityscape", "still", "life", "animal", "dragon", "woman", "man",
    "child", "character", "building", "architecture", "food", "product", "logo", "vehicle",
    "forest", "ocean", "mountain", "space",
    // lighting and mood
    "lighting", "studio", "cinematic", "golden", "hour", "neon", "dramatic", "soft",
    "backlit", "moody", "bright", "dark", "sunset", "night",
];

/// Scores how alike two prompts are, in `[0, 1]`.
pub trait SimilarityCalculator: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Weighted blend of a term-frequency Jaccard index and domain-keyword overlap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendedSimilarity {
    pub token_weight: f64,
    pub keyword_weight: f64,
}

impl Default for BlendedSimilarity {
    fn default() -> Self {
        Self {
            token_weight: 0.6,
            keyword_weight: 0.4,
        }
    }
}

impl BlendedSimilarity {
    pub fn new(token_weight: f64, keyword_weight: f64) -> Self {
        Self {
            token_weight,
            keyword_weight,
        }
    }
}

impl SimilarityCalculator for BlendedSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let ta = content_tokens(a);
        let tb = content_tokens(b);
        let token_score = weighted_jaccard(&ta, &tb);
        let keyword_score = keyword_overlap(&ta, &tb).unwrap_or(token_score);
        let total = self.token_weight + self.keyword_weight;
        if total <= 0.0 {
            return token_score;
        }
        ((self.token_weight * token_score + self.keyword_weight * keyword_score) / total)
            .clamp(0.0, 1.0)
    }
}

fn term_frequencies(tokens: &[String]) -> HashMap<&str, u32> {
    let mut tf = HashMap::new();
    for t in tokens {
        *tf.entry(t.as_str()).or_insert(0) += 1;
    }
    tf
}

/// Σ min(tf) / Σ max(tf) over the union of terms.
///
/// Repeated words count once per occurrence, so a short prompt that happens to
/// share one word with a long one scores low.
pub fn weighted_jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let fa = term_frequencies(a);
    let fb = term_frequencies(b);
    let terms: BTreeSet<&str> = fa.keys().chain(fb.keys()).copied().collect();

    let (mut min_sum, mut max_sum) = (0u32, 0u32);
    for term in terms {
        let x = fa.get(term).copied().unwrap_or(0);
        let y = fb.get(term).copied().unwrap_or(0);
        min_sum += x.min(y);
        max_sum += x.max(y);
    }
    if max_sum == 0 {
        0.0
    } else {
        f64::from(min_sum) / f64::from(max_sum)
    }
}

/// Jaccard over the domain keywords in each prompt. `None` when neither has any.
pub fn keyword_overlap(a: &[String], b: &[String]) -> Option<f64> {
    let ka: BTreeSet<&str> = keywords(a).collect();
    let kb: BTreeSet<&str> = keywords(b).collect();
    if ka.is_empty() && kb.is_empty() {
        return None;
    }
    let shared = ka.intersection(&kb).count();
    let union = ka.union(&kb).count();
    Some(shared as f64 / union as f64)
}

fn keywords(tokens: &[String]) -> impl Iterator<Item = &str> {
    tokens
        .iter()
        .map(String::as_str)
        .filter(|t| DOMAIN_KEYWORDS.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<String> {
        content_tokens(s)
    }

    #[test]
    fn identical_prompts_score_one() {
        let sim = BlendedSimilarity::default();
        assert_eq!(sim.similarity("a red fox in snow", "a red fox in snow"), 1.0);
    }

    #[test]
    fn stop_words_and_punctuation_do_not_matter() {
        let sim = BlendedSimilarity::default();
        let score = sim.similarity(
            "a photorealistic portrait of a smiling woman, studio lighting",
            "photorealistic portrait of smiling woman studio lighting",
        );
        assert!(score >= 0.85, "score was {score}");
    }

    #[test]
    fn unrelated_prompts_score_low() {
        let sim = BlendedSimilarity::default();
        let score = sim.similarity(
            "a photorealistic portrait of a smiling woman, studio lighting",
            "a cartoon dragon breathing fire",
        );
        assert!(score < 0.2, "score was {score}");
    }

    #[test]
    fn term_frequency_is_counted() {
        let a = tokens("cat cat cat dog");
        let b = tokens("cat dog");
        // min: cat 1 + dog 1 = 2, max: cat 3 + dog 1 = 4
        assert!((weighted_jaccard(&a, &b) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn keyword_overlap_absent_without_keywords() {
        assert_eq!(keyword_overlap(&tokens("red fox"), &tokens("blue fox")), None);
        assert_eq!(
            keyword_overlap(&tokens("cartoon fox"), &tokens("cartoon wolf")),
            Some(1.0)
        );
    }

    #[test]
    fn weights_shift_the_blend() {
        let a = "watercolor painting of a quiet harbor";
        let b = "watercolor painting of a busy market";
        let tokens_only = BlendedSimilarity::new(1.0, 0.0).similarity(a, b);
        let keywords_only = BlendedSimilarity::new(0.0, 1.0).similarity(a, b);
        assert!(keywords_only > tokens_only);
        assert_eq!(keywords_only, 1.0);
    }
}
