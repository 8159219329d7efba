//! Per-word language classification.

use std::collections::HashMap;
use std::sync::Arc;

use lingua::LanguageDetectorBuilder;

use crate::Language;

/// Tamil words commonly written in Latin script ("Tanglish"), plus a few
/// English loanwords that are spoken as part of Tamil sentences.
const TANGLISH_WORDS: &[&str] = &[
    "romba", "nalla", "enna", "epdi", "enga", "inga", "anga", "ippo", "appo",
    "thaan", "than", "illa", "illai", "iruku", "irukku", "iruken", "irukken",
    "panna", "pannunga", "sollu", "sollungo", "vaanga", "ponga", "vanga",
    "aamam", "aama", "seri", "sariya", "konjam", "koncham", "kastam",
    "bore", "adikkudhu", "adikuthu", "podhu", "pothum", "venum", "vendum",
    "theriyum", "therla", "theriyala", "puriyala", "puriyuthu", "mudiala",
    "mudiyum", "mudiyathu", "paravala", "parava", "nandri", "vanakkam",
    "poi", "vaa", "va", "pa", "da", "di", "ma", "ya", "la", "le",
    "kku", "ku", "thala", "anna", "akka", "amma", "appa", "thangachi",
    "thambi", "macha", "machan", "machaan", "nanba", "nanban", "dei", "dey",
    "apdiya", "apdi", "ipdiya", "ipdi", "yenda", "yenada", "yen", "yaar",
    "evlo", "evalavu", "etna", "ethana", "eppadi", "yepdi", "yenge",
    "kaasu", "panam", "velai", "vela", "venaam", "thevai",
    "saptu", "sapadu", "saapdu", "kudikka", "kudicha", "poyiten", "vandhuten",
    "solluren", "keluren", "parkuren", "paakuren", "poren", "poidren",
    "super", "mass", "thara", "level", "mokka", "jolly", "cool", "vera",
    "ooru", "oor", "veedu", "veetu", "kadai", "office", "school", "college",
    "friend", "friends", "guys", "bro", "bha", "ji",
];

pub const DEFAULT_SHORT_WORD_THRESHOLD: usize = 3;

fn is_tamil_char(c: char) -> bool {
    ('\u{0B80}'..='\u{0BFF}').contains(&c)
}

/// Lower-cased word with punctuation and symbols removed.
fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || is_tamil_char(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Statistical fallback for words the cheap rules cannot decide.
///
/// `None` means the detector could not determine a language.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, word: &str) -> Option<Language>;
}

/// [`LanguageDetector`] backed by lingua's n-gram models for English and Tamil.
pub struct LinguaDetector {
    inner: lingua::LanguageDetector,
}

impl LinguaDetector {
    pub fn new() -> Self {
        let inner = LanguageDetectorBuilder::from_languages(&[
            lingua::Language::English,
            lingua::Language::Tamil,
        ])
        .build();
        Self { inner }
    }
}

impl Default for LinguaDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LinguaDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinguaDetector").finish_non_exhaustive()
    }
}

impl LanguageDetector for LinguaDetector {
    fn detect(&self, word: &str) -> Option<Language> {
        match self.inner.detect_language_of(word)? {
            lingua::Language::Tamil => Some(Language::Tamil),
            lingua::Language::English => Some(Language::English),
        }
    }
}

/// Raw classifier output, before grouping collapses it to a [`Language`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordLabel {
    /// Word contains Tamil script.
    Tamil,
    /// Latin-script word from the Tanglish lexicon.
    Tanglish,
    English,
}

impl WordLabel {
    pub fn language(self) -> Language {
        match self {
            WordLabel::Tamil | WordLabel::Tanglish => Language::Tamil,
            WordLabel::English => Language::English,
        }
    }
}

/// Classifies words one at a time, memoizing results for the lifetime of the
/// instance. One classifier is created per job.
pub struct WordClassifier {
    detector: Arc<dyn LanguageDetector>,
    short_word_threshold: usize,
    cache: HashMap<String, WordLabel>,
}

impl WordClassifier {
    pub fn new(detector: Arc<dyn LanguageDetector>) -> Self {
        Self::with_threshold(detector, DEFAULT_SHORT_WORD_THRESHOLD)
    }

    pub fn with_threshold(detector: Arc<dyn LanguageDetector>, short_word_threshold: usize) -> Self {
        Self {
            detector,
            short_word_threshold,
            cache: HashMap::new(),
        }
    }

    /// Label a single whitespace-delimited word.
    ///
    /// Returns `None` when the word has no letters or digits at all (pure
    /// punctuation or symbols).
    pub fn classify(&mut self, word: &str) -> Option<WordLabel> {
        let key = normalize_word(word);
        if key.is_empty() {
            return None;
        }
        if let Some(label) = self.cache.get(&key) {
            return Some(*label);
        }

        let label = self.classify_uncached(&key);
        self.cache.insert(key, label);
        Some(label)
    }

    /// Number of distinct words classified so far.
    pub fn cached_words(&self) -> usize {
        self.cache.len()
    }

    fn classify_uncached(&self, key: &str) -> WordLabel {
        if key.chars().any(is_tamil_char) {
            return WordLabel::Tamil;
        }
        if TANGLISH_WORDS.contains(&key) {
            return WordLabel::Tanglish;
        }
        if key.chars().count() < self.short_word_threshold {
            return WordLabel::English;
        }
        match self.detector.detect(key) {
            Some(Language::Tamil) => WordLabel::Tamil,
            Some(Language::English) | None => WordLabel::English,
        }
    }
}
