// Query expansion (spec §4.12): decides whether and how to translate a
// parsed query before it's projected onto FTS, picking a synchronous
// dictionary-only path (used for the immediate FTS search) and a debounced
// async path that prefers a neural translator when one is configured.

use crate::query::parser::ParsedQuery;
use crate::query::translate::{Dictionary, NeuralTranslator, TranslationDirection};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedLanguage {
    English,
    Cjk,
}

fn is_cjk_char(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3400..=0x4DBF // CJK Extension A
        | 0x3040..=0x30FF // Hiragana + Katakana
        | 0xAC00..=0xD7A3 // Hangul syllables
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk_char)
}

/// Detects language with a confidence score in `[0, 1]`. Text shorter than
/// three characters is too short for a ratio-based estimate, so it falls
/// back to the "contains a CJK character" heuristic with full confidence.
pub fn detect_language(text: &str) -> (DetectedLanguage, f32) {
    let char_count = text.chars().filter(|c| !c.is_whitespace()).count();
    if char_count < 3 {
        return if contains_cjk(text) {
            (DetectedLanguage::Cjk, 1.0)
        } else {
            (DetectedLanguage::English, 1.0)
        };
    }
    let cjk_count = text.chars().filter(|c| is_cjk_char(*c)).count();
    let ratio = cjk_count as f32 / char_count as f32;
    if ratio > 0.5 {
        (DetectedLanguage::Cjk, ratio)
    } else {
        (DetectedLanguage::English, 1.0 - ratio)
    }
}

#[derive(Debug, Clone)]
pub struct ExpandedQuery {
    pub parsed: ParsedQuery,
    pub direction: Option<TranslationDirection>,
    pub translated_positive: Option<String>,
    pub translated_negatives: Vec<String>,
}

impl ExpandedQuery {
    fn untranslated(parsed: ParsedQuery) -> Self {
        Self {
            parsed,
            direction: None,
            translated_positive: None,
            translated_negatives: Vec::new(),
        }
    }

    /// The FTS projection of the translated form, or `None` when no
    /// translation happened (quoted query, non-CJK/English text, or the
    /// translation was discarded for equaling the input).
    pub fn to_fts_query(&self) -> Option<String> {
        let positive = self.translated_positive.as_ref()?;
        let mut parts = vec![positive.clone()];
        for term in &self.translated_negatives {
            parts.push(format!("NOT {term}"));
        }
        Some(parts.join(" "))
    }
}

pub struct QueryPipeline {
    dictionary: Dictionary,
    neural: Option<Arc<dyn NeuralTranslator>>,
}

impl QueryPipeline {
    pub fn new(dictionary: Dictionary, neural: Option<Arc<dyn NeuralTranslator>>) -> Self {
        Self { dictionary, neural }
    }

    fn pick_direction(text: &str) -> Option<TranslationDirection> {
        if text.trim().is_empty() {
            return None;
        }
        match detect_language(text).0 {
            DetectedLanguage::Cjk => Some(TranslationDirection::CjkToEnglish),
            DetectedLanguage::English => Some(TranslationDirection::EnglishToCjk),
        }
    }

    /// Dictionary-only expansion for the cheap, synchronous FTS search.
    pub fn expand_sync(&self, parsed: &ParsedQuery) -> ExpandedQuery {
        if parsed.has_quoted_phrase {
            return ExpandedQuery::untranslated(parsed.clone());
        }
        let Some(direction) = Self::pick_direction(&parsed.positive_text) else {
            return ExpandedQuery::untranslated(parsed.clone());
        };
        let translated_positive = self.dictionary.translate(&parsed.positive_text, direction);
        let translated_negatives = parsed
            .negative_terms
            .iter()
            .map(|t| self.dictionary.translate(t, direction))
            .collect();
        ExpandedQuery {
            parsed: parsed.clone(),
            direction: Some(direction),
            translated_positive: Some(translated_positive),
            translated_negatives,
        }
    }

    /// Debounced async expansion (spec: the ~300ms window before a hybrid
    /// search fires): prefers a neural translator when available, falls
    /// back to the dictionary, and discards a translation identical to the
    /// input text.
    pub async fn expand_async(&self, parsed: &ParsedQuery) -> ExpandedQuery {
        if parsed.has_quoted_phrase {
            return ExpandedQuery::untranslated(parsed.clone());
        }
        let Some(direction) = Self::pick_direction(&parsed.positive_text) else {
            return ExpandedQuery::untranslated(parsed.clone());
        };

        let mut translated_positive = None;
        if let Some(neural) = &self.neural {
            if neural.is_available() {
                translated_positive = neural.translate(&parsed.positive_text, direction).await;
            }
        }
        let translated_positive =
            translated_positive.unwrap_or_else(|| self.dictionary.translate(&parsed.positive_text, direction));

        let translated_positive = if translated_positive.trim().eq_ignore_ascii_case(parsed.positive_text.trim()) {
            None
        } else {
            Some(translated_positive)
        };

        let translated_negatives = parsed
            .negative_terms
            .iter()
            .map(|t| self.dictionary.translate(t, direction))
            .collect();

        ExpandedQuery {
            parsed: parsed.clone(),
            direction: Some(direction),
            translated_positive,
            translated_negatives,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::QueryParser;

    #[test]
    fn short_text_falls_back_to_cjk_heuristic() {
        assert_eq!(detect_language("雨").0, DetectedLanguage::Cjk);
        assert_eq!(detect_language("hi").0, DetectedLanguage::English);
    }

    #[test]
    fn quoted_query_skips_translation() {
        let pipeline = QueryPipeline::new(Dictionary::default(), None);
        let parsed = QueryParser::parse("\"海滩\"");
        let expanded = pipeline.expand_sync(&parsed);
        assert!(expanded.direction.is_none());
        assert!(expanded.to_fts_query().is_none());
    }

    #[test]
    fn cjk_query_translates_to_english_and_negatives_too() {
        let pipeline = QueryPipeline::new(Dictionary::default(), None);
        let parsed = QueryParser::parse("海滩 日落 -雨天");
        let expanded = pipeline.expand_sync(&parsed);
        assert_eq!(expanded.direction, Some(TranslationDirection::CjkToEnglish));
        assert_eq!(expanded.to_fts_query().unwrap(), "beach sunset NOT rainy");
    }

    #[test]
    fn english_query_translates_to_cjk() {
        let pipeline = QueryPipeline::new(Dictionary::default(), None);
        let parsed = QueryParser::parse("beach sunset");
        let expanded = pipeline.expand_sync(&parsed);
        assert_eq!(expanded.direction, Some(TranslationDirection::EnglishToCjk));
        assert_eq!(expanded.translated_positive.unwrap(), "海滩 日落");
    }
}
