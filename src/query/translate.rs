// Dictionary translation (spec §4.12, §9 "Dictionary translation"): a small
// configurable vocabulary, greedy-longest-match for English (1-3 grams) and
// Unicode-word-segmented for CJK, plus a neural-translator fallback behind
// the same is_available/try-then-fallback shape `providers::embedding` uses
// for its cloud/offline split.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationDirection {
    EnglishToCjk,
    CjkToEnglish,
}

/// A loaded `english <-> cjk` vocabulary. The contract is greedy
/// longest-match lookup, not any particular word list; `Dictionary::default`
/// ships a small built-in sample so the pipeline works with no asset on
/// disk, and `load` lets a real deployment supply a larger one.
pub struct Dictionary {
    en_to_cjk: HashMap<String, String>,
    cjk_to_en: HashMap<String, String>,
    max_en_gram: usize,
    max_cjk_gram: usize,
}

const BUILTIN_VOCAB: &[(&str, &str)] = &[
    ("beach", "海滩"),
    ("sunset", "日落"),
    ("sunrise", "日出"),
    ("rain", "雨"),
    ("rainy", "雨天"),
    ("rainy day", "雨天"),
    ("snow", "雪"),
    ("mountain", "山"),
    ("forest", "森林"),
    ("birthday", "生日"),
    ("birthday party", "生日派对"),
    ("wedding", "婚礼"),
    ("dog", "狗"),
    ("cat", "猫"),
    ("family", "家庭"),
    ("child", "孩子"),
    ("children", "孩子们"),
    ("friend", "朋友"),
    ("city", "城市"),
    ("night", "夜晚"),
    ("park", "公园"),
    ("garden", "花园"),
    ("lake", "湖"),
    ("river", "河"),
    ("fireworks", "烟花"),
    ("concert", "音乐会"),
    ("travel", "旅行"),
    ("vacation", "假期"),
    ("graduation", "毕业"),
    ("school", "学校"),
];

impl Default for Dictionary {
    fn default() -> Self {
        Self::from_pairs(BUILTIN_VOCAB.iter().map(|(en, cjk)| (en.to_string(), cjk.to_string())))
    }
}

impl Dictionary {
    fn from_pairs(pairs: impl Iterator<Item = (String, String)>) -> Self {
        let mut en_to_cjk = HashMap::new();
        let mut cjk_to_en = HashMap::new();
        let mut max_en_gram = 1;
        let mut max_cjk_gram = 1;
        for (en, cjk) in pairs {
            let gram_len = en.split_whitespace().count().max(1);
            max_en_gram = max_en_gram.max(gram_len);
            max_cjk_gram = max_cjk_gram.max(cjk.chars().count().max(1));
            en_to_cjk.insert(en.to_lowercase(), cjk.clone());
            cjk_to_en.entry(cjk).or_insert(en);
        }
        Self {
            en_to_cjk,
            cjk_to_en,
            max_en_gram: max_en_gram.min(3),
            max_cjk_gram,
        }
    }

    /// One entry per line, tab-separated `english\tcjk`. Blank lines and
    /// lines starting with `#` are ignored.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_pairs(text.lines().filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let mut parts = line.splitn(2, '\t');
            let en = parts.next()?.trim().to_string();
            let cjk = parts.next()?.trim().to_string();
            Some((en, cjk))
        })))
    }

    /// Greedy longest-match over 1..=3-word grams; unmatched words pass
    /// through unchanged.
    pub fn translate_en_to_cjk(&self, text: &str) -> String {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut out = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let mut matched = false;
            let max_gram = self.max_en_gram.min(words.len() - i);
            for gram in (1..=max_gram).rev() {
                let candidate = words[i..i + gram].join(" ").to_lowercase();
                if let Some(translated) = self.en_to_cjk.get(&candidate) {
                    out.push(translated.clone());
                    i += gram;
                    matched = true;
                    break;
                }
            }
            if !matched {
                out.push(words[i].to_string());
                i += 1;
            }
        }
        out.join(" ")
    }

    /// Segments with Unicode word boundaries (which, for unspaced CJK text,
    /// yields one token per character) then greedy longest-matches 1-3
    /// consecutive segments against the dictionary, same as the English
    /// direction but concatenating grams instead of joining with spaces.
    pub fn translate_cjk_to_en(&self, text: &str) -> String {
        let tokens: Vec<&str> = text.split_word_bounds().collect();
        let mut out: Vec<String> = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            if tokens[i].trim().is_empty() {
                i += 1;
                continue;
            }
            let mut matched = false;
            let max_gram = self.max_cjk_gram.min(tokens.len() - i);
            for gram in (1..=max_gram).rev() {
                let candidate: String = tokens[i..i + gram].concat();
                if let Some(en) = self.cjk_to_en.get(&candidate) {
                    out.push(en.clone());
                    i += gram;
                    matched = true;
                    break;
                }
            }
            if !matched {
                out.push(tokens[i].to_string());
                i += 1;
            }
        }
        out.join(" ")
    }

    pub fn translate(&self, text: &str, direction: TranslationDirection) -> String {
        match direction {
            TranslationDirection::EnglishToCjk => self.translate_en_to_cjk(text),
            TranslationDirection::CjkToEnglish => self.translate_cjk_to_en(text),
        }
    }
}

/// Neural translator used on the debounced async path; the dictionary is
/// always the fallback, so unlike `EmbeddingProvider` this trait never
/// returns an error, only `None` when unavailable or unhelpful.
#[async_trait]
pub trait NeuralTranslator: Send + Sync {
    fn is_available(&self) -> bool;
    async fn translate(&self, text: &str, direction: TranslationDirection) -> Option<String>;
}

/// Checks for a local model file at construction time; actual invocation is
/// intentionally unimplemented until a real offline translator is wired in,
/// matching `providers::embedding::OfflineEmbeddingProvider`'s honesty about
/// unimplemented local inference.
pub struct OfflineNeuralTranslator {
    model_path: std::path::PathBuf,
}

impl OfflineNeuralTranslator {
    pub fn new(model_path: impl Into<std::path::PathBuf>) -> Self {
        Self { model_path: model_path.into() }
    }
}

#[async_trait]
impl NeuralTranslator for OfflineNeuralTranslator {
    fn is_available(&self) -> bool {
        self.model_path.exists()
    }

    async fn translate(&self, _text: &str, _direction: TranslationDirection) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_to_cjk_prefers_longer_gram_match() {
        let dict = Dictionary::default();
        assert_eq!(dict.translate_en_to_cjk("rainy day"), "雨天");
        assert_eq!(dict.translate_en_to_cjk("rainy"), "雨天");
    }

    #[test]
    fn cjk_to_english_segments_and_translates_each_word() {
        let dict = Dictionary::default();
        assert_eq!(dict.translate_cjk_to_en("海滩 日落"), "beach sunset");
    }

    #[test]
    fn unmatched_words_pass_through_unchanged() {
        let dict = Dictionary::default();
        assert_eq!(dict.translate_en_to_cjk("unknown word beach"), "unknown word 海滩");
    }
}
