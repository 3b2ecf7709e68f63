//! Term normalization: surface token → (lemma, part of speech).
//!
//! Real morphology is an external concern. The engine only sees the
//! [`TermNormalizer`] trait; [`DictionaryNormalizer`] plugs in a morphological
//! dictionary exported by such a tool and [`StemmingNormalizer`] is a
//! dependency-light fallback built on Snowball stemmers.

use crate::error::{Result, SearchError};
use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartOfSpeech {
    Noun,
    Adjective,
    Verb,
    Participle,
    Gerund,
    Adverb,
    Pronoun,
    Predicative,
    Interjection,
    Conjunction,
    Numeral,
    OrdinalNumber,
    Preposition,
    Particle,
    Unclassified,
}

impl PartOfSpeech {
    pub const ALL: [PartOfSpeech; 15] = [
        PartOfSpeech::Noun,
        PartOfSpeech::Adjective,
        PartOfSpeech::Verb,
        PartOfSpeech::Participle,
        PartOfSpeech::Gerund,
        PartOfSpeech::Adverb,
        PartOfSpeech::Pronoun,
        PartOfSpeech::Predicative,
        PartOfSpeech::Interjection,
        PartOfSpeech::Conjunction,
        PartOfSpeech::Numeral,
        PartOfSpeech::OrdinalNumber,
        PartOfSpeech::Preposition,
        PartOfSpeech::Particle,
        PartOfSpeech::Unclassified,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PartOfSpeech::Noun => "noun",
            PartOfSpeech::Adjective => "adjective",
            PartOfSpeech::Verb => "verb",
            PartOfSpeech::Participle => "participle",
            PartOfSpeech::Gerund => "gerund",
            PartOfSpeech::Adverb => "adverb",
            PartOfSpeech::Pronoun => "pronoun",
            PartOfSpeech::Predicative => "predicative",
            PartOfSpeech::Interjection => "interjection",
            PartOfSpeech::Conjunction => "conjunction",
            PartOfSpeech::Numeral => "numeral",
            PartOfSpeech::OrdinalNumber => "ordinal",
            PartOfSpeech::Preposition => "preposition",
            PartOfSpeech::Particle => "particle",
            PartOfSpeech::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for PartOfSpeech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PartOfSpeech {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        PartOfSpeech::ALL
            .into_iter()
            .find(|pos| pos.name() == wanted)
            .ok_or_else(|| format!("unknown part of speech {s:?}"))
    }
}

/// Parts of speech whose words never become index terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosFilter {
    excluded: BTreeSet<PartOfSpeech>,
}

impl Default for PosFilter {
    /// Closed-class words: conjunctions, numerals, ordinals, prepositions, particles.
    fn default() -> Self {
        Self::excluding([
            PartOfSpeech::Conjunction,
            PartOfSpeech::Numeral,
            PartOfSpeech::OrdinalNumber,
            PartOfSpeech::Preposition,
            PartOfSpeech::Particle,
        ])
    }
}

impl PosFilter {
    pub fn excluding(parts: impl IntoIterator<Item = PartOfSpeech>) -> Self {
        Self { excluded: parts.into_iter().collect() }
    }

    /// Parse a comma separated list such as `conjunction,numeral`.
    pub fn parse_list(list: &str) -> std::result::Result<Self, String> {
        let parts = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PartOfSpeech::from_str)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::excluding(parts))
    }

    pub fn admits(&self, pos: PartOfSpeech) -> bool {
        !self.excluded.contains(&pos)
    }

    pub fn excluded(&self) -> impl Iterator<Item = PartOfSpeech> + '_ {
        self.excluded.iter().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub lemma: String,
    pub pos: PartOfSpeech,
}

impl Normalized {
    pub fn new(lemma: impl Into<String>, pos: PartOfSpeech) -> Self {
        Self { lemma: lemma.into(), pos }
    }
}

/// Maps a lowercased surface token to its lemma. `None` means the token is
/// unknown to the normalizer and must be skipped by the caller.
pub trait TermNormalizer: Send + Sync {
    fn normalize(&self, token: &str) -> Option<Normalized>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Russian,
    English,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ru" | "russian" => Ok(Language::Russian),
            "en" | "english" => Ok(Language::English),
            other => Err(format!("unsupported language {other:?}")),
        }
    }
}

lazy_static! {
    static ref RUSSIAN_CLOSED: HashMap<&'static str, PartOfSpeech> = closed_class(
        &["и", "а", "но", "или", "что", "чтобы", "если", "когда", "как", "да", "либо", "зато", "однако", "хотя", "потому", "поэтому", "будто", "пока", "тоже", "также"],
        &["в", "во", "на", "с", "со", "к", "ко", "по", "о", "об", "обо", "от", "до", "из", "изо", "у", "за", "под", "над", "при", "про", "для", "без", "через", "между", "перед", "около", "вокруг", "после", "среди", "сквозь"],
        &["не", "ни", "же", "ли", "бы", "вот", "вон", "лишь", "только", "даже", "уже", "ещё", "еще", "разве", "неужели", "пусть"],
        &["один", "одна", "одно", "два", "две", "три", "четыре", "пять", "шесть", "семь", "восемь", "девять", "десять", "сто", "тысяча", "миллион"],
        &["первый", "второй", "третий", "четвертый", "четвёртый", "пятый", "шестой", "седьмой", "восьмой", "девятый", "десятый"],
    );
    static ref ENGLISH_CLOSED: HashMap<&'static str, PartOfSpeech> = closed_class(
        &["and", "or", "but", "if", "because", "while", "although", "though", "nor", "yet", "so", "that", "whether", "unless", "since"],
        &["in", "on", "at", "by", "for", "from", "of", "to", "with", "about", "into", "onto", "over", "under", "between", "through", "during", "without", "after", "before", "against", "among", "upon"],
        &["not", "no", "just", "only", "even", "too"],
        &["one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "hundred", "thousand", "million"],
        &["first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth", "tenth"],
    );
}

fn closed_class(
    conjunctions: &[&'static str],
    prepositions: &[&'static str],
    particles: &[&'static str],
    numerals: &[&'static str],
    ordinals: &[&'static str],
) -> HashMap<&'static str, PartOfSpeech> {
    let groups = [
        (conjunctions, PartOfSpeech::Conjunction),
        (prepositions, PartOfSpeech::Preposition),
        (particles, PartOfSpeech::Particle),
        (numerals, PartOfSpeech::Numeral),
        (ordinals, PartOfSpeech::OrdinalNumber),
    ];
    let mut table = HashMap::new();
    for (words, pos) in groups {
        for w in words {
            table.entry(*w).or_insert(pos);
        }
    }
    table
}

/// Snowball stemming for open-class words plus a closed-class word table so
/// that the part-of-speech filter still has something to work with.
pub struct StemmingNormalizer {
    stemmer: Stemmer,
    closed: &'static HashMap<&'static str, PartOfSpeech>,
}

impl StemmingNormalizer {
    pub fn new(language: Language) -> Self {
        let (algorithm, closed) = match language {
            Language::Russian => (Algorithm::Russian, &*RUSSIAN_CLOSED),
            Language::English => (Algorithm::English, &*ENGLISH_CLOSED),
        };
        Self { stemmer: Stemmer::create(algorithm), closed }
    }
}

impl TermNormalizer for StemmingNormalizer {
    fn normalize(&self, token: &str) -> Option<Normalized> {
        if token.is_empty() || !token.chars().all(char::is_alphabetic) {
            return None;
        }
        if let Some(pos) = self.closed.get(token) {
            return Some(Normalized::new(token, *pos));
        }
        let stem = self.stemmer.stem(token);
        if stem.is_empty() {
            return None;
        }
        Some(Normalized::new(stem.into_owned(), PartOfSpeech::Unclassified))
    }
}

/// Lookup table exported from a morphological analyzer.
///
/// File format: one `surface lemma pos` entry per line, `#` starts a comment.
/// When a surface form is listed twice the first entry is kept.
#[derive(Default)]
pub struct DictionaryNormalizer {
    entries: HashMap<String, Normalized>,
    fallback: Option<Box<dyn TermNormalizer>>,
}

impl DictionaryNormalizer {
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a str, PartOfSpeech)>,
    ) -> Self {
        let mut map = HashMap::new();
        for (surface, lemma, pos) in entries {
            map.entry(surface.to_lowercase())
                .or_insert_with(|| Normalized::new(lemma.to_lowercase(), pos));
        }
        Self { entries: map, fallback: None }
    }

    pub fn parse(artifact: &str, contents: &str) -> Result<Self> {
        let mut entries = HashMap::new();
        for (n, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [surface, lemma, pos] = fields.as_slice() else {
                return Err(SearchError::parse(artifact, n + 1, "expected `surface lemma pos`"));
            };
            let pos = pos
                .parse::<PartOfSpeech>()
                .map_err(|e| SearchError::parse(artifact, n + 1, e))?;
            entries
                .entry(surface.to_lowercase())
                .or_insert_with(|| Normalized::new(lemma.to_lowercase(), pos));
        }
        Ok(Self { entries, fallback: None })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| SearchError::io(path, e))?;
        Self::parse(&path.display().to_string(), &contents)
    }

    /// Consult `fallback` for tokens missing from the dictionary.
    pub fn with_fallback(mut self, fallback: Box<dyn TermNormalizer>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TermNormalizer for DictionaryNormalizer {
    fn normalize(&self, token: &str) -> Option<Normalized> {
        match self.entries.get(token) {
            Some(n) => Some(n.clone()),
            None => self.fallback.as_ref().and_then(|f| f.normalize(token)),
        }
    }
}
