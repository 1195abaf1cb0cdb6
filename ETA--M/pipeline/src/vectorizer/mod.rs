//! Bounded-vocabulary TF-IDF over ticket descriptions.
//!
//! [`TfidfConfig::fit`] is the only way to obtain a [`TfidfVectorizer`], so an
//! unfitted vectorizer cannot transform text. The fitted state is persisted with
//! the training artifacts and reused unchanged at serve time.

/// Fixed English stop-word list.
pub mod stop_words;

use std::{
    collections::{BTreeMap, HashMap},
    sync::OnceLock,
};

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::{PipelineError, PipelineResult},
    schema::tfidf_column,
};

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?u)\b\w\w+\b").expect("token pattern is valid"))
}

/// Lowercases `text` and returns its tokens of two or more word characters,
/// stop words removed.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_pattern()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|token| !stop_words::is_stop_word(token))
        .map(str::to_string)
        .collect()
}

/// Vectorizer settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TfidfConfig {
    /// Upper bound on the vocabulary size.
    pub max_features: usize,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self { max_features: 100 }
    }
}

impl TfidfConfig {
    /// Learns the vocabulary and document frequencies of `corpus`. Missing
    /// descriptions should be passed as empty strings.
    ///
    /// The `max_features` terms with the highest corpus frequency are kept (ties
    /// broken alphabetically); the final vocabulary is ordered alphabetically.
    pub fn fit<'a>(
        &self,
        corpus: impl IntoIterator<Item = &'a str>,
    ) -> PipelineResult<TfidfVectorizer> {
        if self.max_features == 0 {
            return Err(PipelineError::Data(
                "vectorizer max_features must be positive".into(),
            ));
        }
        let mut term_counts: HashMap<String, usize> = HashMap::new();
        let mut doc_counts: HashMap<String, usize> = HashMap::new();
        let mut documents = 0usize;
        for text in corpus {
            documents += 1;
            let tokens = tokenize(text);
            let mut seen: Vec<&String> = Vec::new();
            for token in &tokens {
                *term_counts.entry(token.clone()).or_default() += 1;
                if !seen.contains(&token) {
                    seen.push(token);
                    *doc_counts.entry(token.clone()).or_default() += 1;
                }
            }
        }
        if term_counts.is_empty() {
            return Err(PipelineError::Data(format!(
                "empty vocabulary: {documents} documents contain only stop words or no tokens"
            )));
        }

        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.max_features);
        let selected: BTreeMap<String, f64> = ranked
            .into_iter()
            .map(|(term, _)| {
                let df = doc_counts.get(&term).copied().unwrap_or(0);
                let idf = ((1.0 + documents as f64) / (1.0 + df as f64)).ln() + 1.0;
                (term, idf)
            })
            .collect();

        let mut vocabulary = IndexMap::with_capacity(selected.len());
        let mut idf = Vec::with_capacity(selected.len());
        for (index, (term, weight)) in selected.into_iter().enumerate() {
            vocabulary.insert(term, index);
            idf.push(weight);
        }
        Ok(TfidfVectorizer {
            config: *self,
            documents,
            vocabulary,
            idf,
        })
    }
}

/// Fitted TF-IDF state: vocabulary in column order and smoothed IDF weights.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TfidfVectorizer {
    config: TfidfConfig,
    documents: usize,
    vocabulary: IndexMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// Settings the vectorizer was fitted with.
    #[must_use]
    pub const fn config(&self) -> TfidfConfig {
        self.config
    }

    /// Number of documents seen at fit time.
    #[must_use]
    pub const fn documents(&self) -> usize {
        self.documents
    }

    /// Vocabulary size, i.e. output width.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Whether the vocabulary is empty (never true for a fitted vectorizer).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    /// Vocabulary terms in column order.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.vocabulary.keys().map(String::as_str)
    }

    /// IDF weight of a term, if it is in the vocabulary.
    #[must_use]
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.vocabulary.get(term).map(|&index| self.idf[index])
    }

    /// Column names (`tfidf:<term>`) in output order.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.terms().map(tfidf_column).collect()
    }

    /// Checks internal consistency after deserialization.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.vocabulary.len() != self.idf.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "vectorizer has {} terms but {} idf weights",
                self.vocabulary.len(),
                self.idf.len()
            )));
        }
        if self.vocabulary.len() > self.config.max_features {
            return Err(PipelineError::SchemaMismatch(format!(
                "vectorizer vocabulary of {} exceeds max_features {}",
                self.vocabulary.len(),
                self.config.max_features
            )));
        }
        if self
            .vocabulary
            .iter()
            .enumerate()
            .any(|(position, (_, &index))| position != index)
        {
            return Err(PipelineError::SchemaMismatch(
                "vectorizer vocabulary indices are out of order".into(),
            ));
        }
        Ok(())
    }

    /// Maps text onto the fixed vocabulary: raw counts times IDF, L2-normalised.
    /// Unseen terms contribute nothing; text without vocabulary terms yields zeros.
    #[must_use]
    pub fn transform(&self, text: &str) -> Vec<f64> {
        let mut row = vec![0.0; self.vocabulary.len()];
        for token in tokenize(text) {
            if let Some(&index) = self.vocabulary.get(&token) {
                row[index] += 1.0;
            }
        }
        for (value, weight) in row.iter_mut().zip(&self.idf) {
            *value *= weight;
        }
        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in &mut row {
                *value /= norm;
            }
        }
        row
    }

    /// Like [`Self::transform`], reading a missing description as empty.
    #[must_use]
    pub fn transform_optional(&self, text: Option<&str>) -> Vec<f64> {
        self.transform(text.unwrap_or(""))
    }
}
