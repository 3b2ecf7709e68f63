use crate::config::AnalyzerConfig;
use crate::error::{Result, SearchError};
use crate::normalizer::{
    DictionaryNormalizer, Normalized, PosFilter, StemmingNormalizer, TermNormalizer,
};
use crate::tokenizer::tokenize;
use std::sync::Arc;

/// A surface term together with the lemma it normalized to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedTerm {
    pub surface: String,
    pub lemma: String,
}

/// Tokenizer + normalizer + part-of-speech filter. Documents and queries go
/// through the same analyzer so that index-time and query-time terms agree.
#[derive(Clone)]
pub struct Analyzer {
    normalizer: Arc<dyn TermNormalizer>,
    filter: PosFilter,
}

impl Analyzer {
    pub fn new(normalizer: Arc<dyn TermNormalizer>, filter: PosFilter) -> Self {
        Self { normalizer, filter }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        let stemmer = StemmingNormalizer::new(config.language);
        let normalizer: Arc<dyn TermNormalizer> = match &config.dictionary {
            Some(path) => {
                let dict = DictionaryNormalizer::from_file(path)?;
                tracing::info!(
                    entries = dict.len(),
                    path = %path.display(),
                    "loaded morphological dictionary"
                );
                Arc::new(dict.with_fallback(Box::new(stemmer)))
            }
            None => Arc::new(stemmer),
        };
        Ok(Self::new(normalizer, config.filter.clone()))
    }

    pub fn filter(&self) -> &PosFilter {
        &self.filter
    }

    /// Classify one surface token: `Ok(Some)` for an index term, `Ok(None)`
    /// when its part of speech is excluded, `NormalizationMiss` when the
    /// normalizer knows nothing about it.
    pub fn classify(&self, token: &str) -> Result<Option<Normalized>> {
        match self.normalizer.normalize(token) {
            None => Err(SearchError::NormalizationMiss(token.to_string())),
            Some(n) if self.filter.admits(n.pos) => Ok(Some(n)),
            Some(_) => Ok(None),
        }
    }

    /// Index terms of `text` in order of appearance. Misses and filtered
    /// tokens are dropped.
    pub fn analyze(&self, text: &str) -> Vec<AnalyzedTerm> {
        tokenize(text)
            .into_iter()
            .filter_map(|surface| match self.classify(&surface) {
                Ok(Some(n)) => Some(AnalyzedTerm { surface, lemma: n.lemma }),
                Ok(None) => None,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping token");
                    None
                }
            })
            .collect()
    }

    /// Lemma a single query operand resolves to. The operand is tokenized
    /// like document text, so quotes and trailing punctuation are stripped;
    /// anything that is not exactly one word is an `InvalidQuery`. Falls back
    /// to the token when the normalizer misses or filters it, so the postings
    /// lookup reports the term instead of silently dropping it.
    pub fn lemma_of(&self, operand: &str) -> Result<String> {
        let mut tokens = tokenize(operand).into_iter();
        let token = match (tokens.next(), tokens.next()) {
            (Some(token), None) => token,
            _ => return Err(SearchError::InvalidQuery(format!("{operand:?} is not a single word"))),
        };
        Ok(match self.normalizer.normalize(&token) {
            Some(n) => n.lemma,
            None => token,
        })
    }
}
