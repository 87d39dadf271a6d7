//! TF-IDF vectorizer.
//!
//! Turns text into fixed-length vectors:
//! - `fit` learns a vocabulary (capped at `dimensions` terms) and smoothed
//!   idf weights from a corpus
//! - `transform` weights term counts by idf and L2-normalizes the row
//! - terms unseen during `fit` are ignored, the vocabulary never grows
//!
//! Vectors are zero-padded to `dimensions` when the fitted vocabulary is
//! smaller, so the output length is fixed before `fit` is ever called.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Word tokens of two or more characters
static WORD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?u)\b\w\w+\b").expect("Failed to compile word regex"));

/// How text is split into terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Analyzer {
    /// Lowercased word tokens
    Word,
    /// Character n-grams taken inside space-padded words
    CharWb { min_n: usize, max_n: usize },
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::CharWb { min_n: 3, max_n: 4 }
    }
}

impl Analyzer {
    /// Split text into terms.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        match *self {
            Analyzer::Word => WORD_REGEX
                .find_iter(&lower)
                .map(|m| m.as_str().to_string())
                .collect(),
            Analyzer::CharWb { min_n, max_n } => char_wb_ngrams(&lower, min_n, max_n),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match *self {
            Analyzer::Word => Ok(()),
            Analyzer::CharWb { min_n, max_n } => {
                if min_n == 0 || min_n > max_n {
                    Err(format!(
                        "char_wb n-gram range must satisfy 1 <= min_n <= max_n, got {min_n}..={max_n}"
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn char_wb_ngrams(text: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let mut ngrams = Vec::new();

    for word in text.split_whitespace() {
        let padded: Vec<char> = std::iter::once(' ')
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();

        for n in min_n..=max_n {
            // a short word is counted once, whole
            if padded.len() <= n {
                ngrams.push(padded.iter().collect());
                break;
            }
            for window in padded.windows(n) {
                ngrams.push(window.iter().collect());
            }
        }
    }

    ngrams
}

/// Vocabulary and idf weights learned by `fit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedState {
    /// term -> column
    vocabulary: BTreeMap<String, usize>,
    /// idf weight per column
    idf: Vec<f32>,
}

/// TF-IDF vectorizer with a bounded vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    analyzer: Analyzer,
    dimensions: usize,
    sublinear_tf: bool,
    state: Option<FittedState>,
}

impl TfIdfVectorizer {
    /// Create an unfitted vectorizer producing vectors of `dimensions` components.
    pub fn new(analyzer: Analyzer, dimensions: usize, sublinear_tf: bool) -> Self {
        Self {
            analyzer,
            dimensions,
            sublinear_tf,
            state: None,
        }
    }

    pub fn analyzer(&self) -> Analyzer {
        self.analyzer
    }

    /// Length of every vector this vectorizer produces.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Number of terms in the fitted vocabulary (0 before `fit`).
    pub fn vocabulary_len(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.vocabulary.len())
    }

    /// Column of a term, if it made it into the vocabulary.
    pub fn term_index(&self, term: &str) -> Option<usize> {
        self.state.as_ref()?.vocabulary.get(term).copied()
    }

    /// Learn vocabulary and idf weights from `corpus`.
    ///
    /// Replaces any previous fit. On error the vectorizer is unchanged.
    pub fn fit<S: AsRef<str> + Sync>(&mut self, corpus: &[S]) -> Result<(), VectorizerError> {
        if corpus.is_empty() {
            return Err(VectorizerError::EmptyCorpus);
        }

        let counts: Vec<HashMap<String, u32>> = corpus
            .par_iter()
            .map(|doc| self.term_counts(doc.as_ref()))
            .collect();

        let mut total: HashMap<&str, u64> = HashMap::new();
        let mut df: HashMap<&str, u32> = HashMap::new();
        for doc in &counts {
            for (term, &count) in doc {
                *total.entry(term.as_str()).or_default() += u64::from(count);
                *df.entry(term.as_str()).or_default() += 1;
            }
        }

        if total.is_empty() {
            return Err(VectorizerError::EmptyVocabulary);
        }

        let mut ranked: Vec<(&str, u64)> = total.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.dimensions);

        let mut kept: Vec<&str> = ranked.into_iter().map(|(term, _)| term).collect();
        kept.sort_unstable();

        let n = corpus.len() as f32;
        let idf = kept
            .iter()
            .map(|term| ((1.0 + n) / (1.0 + df[term] as f32)).ln() + 1.0)
            .collect();
        let vocabulary = kept
            .into_iter()
            .enumerate()
            .map(|(col, term)| (term.to_string(), col))
            .collect::<BTreeMap<_, _>>();

        log::debug!(
            "fitted tf-idf vocabulary: documents={} terms={} dimensions={}",
            corpus.len(),
            vocabulary.len(),
            self.dimensions
        );

        self.state = Some(FittedState { vocabulary, idf });

        Ok(())
    }

    /// Check that a deserialized vectorizer can be used without indexing
    /// out of bounds.
    ///
    /// Columns must be a permutation of `0..idf.len()`, there can be at most
    /// `dimensions` of them, and every idf weight must be finite.
    pub(crate) fn validate(&self) -> Result<(), String> {
        self.analyzer.validate()?;

        let Some(state) = &self.state else {
            return Ok(());
        };

        if state.vocabulary.len() != state.idf.len() {
            return Err(format!(
                "{} terms but {} idf weights",
                state.vocabulary.len(),
                state.idf.len()
            ));
        }

        if state.idf.len() > self.dimensions {
            return Err(format!(
                "{} terms exceed {} dimensions",
                state.idf.len(),
                self.dimensions
            ));
        }

        let mut seen = vec![false; state.idf.len()];
        for (term, &col) in &state.vocabulary {
            match seen.get_mut(col) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => return Err(format!("column {col} assigned twice (term {term:?})")),
                None => return Err(format!("term {term:?} has out-of-range column {col}")),
            }
        }

        if let Some(col) = state.idf.iter().position(|w| !w.is_finite()) {
            return Err(format!("idf weight for column {col} is not finite"));
        }

        Ok(())
    }

    /// Vectorize a single text with the fitted vocabulary.
    pub fn transform(&self, text: &str) -> Result<Vec<f32>, VectorizerError> {
        let state = self.state.as_ref().ok_or(VectorizerError::NotFitted)?;

        let mut vector = vec![0.0f32; self.dimensions];
        for (term, count) in self.term_counts(text) {
            if let Some(&col) = state.vocabulary.get(&term) {
                let tf = if self.sublinear_tf {
                    1.0 + (count as f32).ln()
                } else {
                    count as f32
                };
                vector[col] = tf * state.idf[col];
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            vector.iter_mut().for_each(|x| *x /= norm);
        }

        Ok(vector)
    }

    /// Vectorize several texts in parallel, preserving order.
    pub fn transform_batch<S: AsRef<str> + Sync>(
        &self,
        texts: &[S],
    ) -> Result<Vec<Vec<f32>>, VectorizerError> {
        if !self.is_fitted() {
            return Err(VectorizerError::NotFitted);
        }
        texts
            .par_iter()
            .map(|text| self.transform(text.as_ref()))
            .collect()
    }

    /// `fit` followed by `transform_batch` over the same corpus.
    pub fn fit_transform<S: AsRef<str> + Sync>(
        &mut self,
        corpus: &[S],
    ) -> Result<Vec<Vec<f32>>, VectorizerError> {
        self.fit(corpus)?;
        self.transform_batch(corpus)
    }

    fn term_counts(&self, text: &str) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for term in self.analyzer.analyze(text) {
            *counts.entry(term).or_default() += 1;
        }
        counts
    }
}

/// Errors that can occur during vectorization.
#[derive(Debug, thiserror::Error)]
pub enum VectorizerError {
    #[error("Vectorizer has not been fitted")]
    NotFitted,

    #[error("Cannot fit on an empty corpus")]
    EmptyCorpus,

    #[error("Corpus produced no terms")]
    EmptyVocabulary,
}
