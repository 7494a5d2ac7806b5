//! TF-IDF text vectorizer
//!
//! Word tokens of two or more characters, English stop words removed, a
//! vocabulary capped at the most frequent terms, smoothed IDF weights and
//! L2-normalized rows. Rows are sparse: `(term index, weight)` sorted by index.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sparse document vector, sorted by term index
pub type SparseVector = Vec<(usize, f64)>;

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "back", "be", "became", "because", "become", "becomes", "been",
    "before", "beforehand", "behind", "being", "below", "beside", "besides", "between",
    "beyond", "both", "but", "by", "can", "cannot", "could", "do", "done", "down", "due",
    "during", "each", "eg", "either", "else", "elsewhere", "enough", "etc", "even", "ever",
    "every", "everyone", "everything", "everywhere", "except", "few", "for", "former",
    "formerly", "from", "further", "had", "has", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hers", "herself", "him", "himself", "his", "how",
    "however", "ie", "if", "in", "indeed", "into", "is", "it", "its", "itself", "last",
    "latter", "least", "less", "ltd", "many", "may", "me", "meanwhile", "might", "mine", "more",
    "moreover", "most", "mostly", "much", "must", "my", "myself", "neither", "never",
    "nevertheless", "next", "no", "nobody", "none", "noone", "nor", "not", "nothing", "now",
    "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto", "or", "other",
    "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "per", "perhaps",
    "please", "rather", "re", "same", "seem", "seemed", "seeming", "seems", "several", "she",
    "should", "since", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "than", "that", "the", "their", "them",
    "themselves", "then", "thence", "there", "thereafter", "thereby", "therefore", "therein",
    "thereupon", "these", "they", "this", "those", "though", "through", "throughout", "thru",
    "thus", "to", "together", "too", "toward", "towards", "under", "until", "up", "upon", "us",
    "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "whence",
    "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever",
    "whether", "which", "while", "whither", "who", "whoever", "whole", "whom", "whose", "why",
    "will", "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("static regex"))
}

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Lowercased word tokens with stop words removed
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_pattern()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| !stop_words().contains(t))
        .map(str::to_string)
        .collect()
}

/// Fitted TF-IDF vectorizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    /// Term → column index, columns ordered alphabetically
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// Learn the vocabulary and IDF weights from `docs`.
    ///
    /// Fails when no document contains a usable token.
    pub fn fit(docs: &[&str], max_vocabulary: usize) -> Result<Self> {
        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| tokenize(d)).collect();

        let mut term_counts: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            for t in tokens {
                *term_counts.entry(t.as_str()).or_default() += 1;
            }
        }

        if term_counts.is_empty() {
            return Err(Error::Training(
                "empty vocabulary; documents contain only stop words".into(),
            ));
        }

        // Keep the most frequent terms; ties broken alphabetically
        let mut ranked: Vec<(&str, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_vocabulary);

        let mut terms: Vec<&str> = ranked.into_iter().map(|(t, _)| t).collect();
        terms.sort_unstable();
        let vocabulary: BTreeMap<String, usize> = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i))
            .collect();

        let mut doc_freq = vec![0usize; vocabulary.len()];
        for tokens in &tokenized {
            let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
            for t in unique {
                if let Some(&idx) = vocabulary.get(t) {
                    doc_freq[idx] += 1;
                }
            }
        }

        let n = docs.len() as f64;
        let idf = doc_freq
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        Ok(Self { vocabulary, idf })
    }

    /// Vectorize one document. Unknown terms are ignored.
    ///
    /// Fails only when a vocabulary column has no IDF weight, which a
    /// fitted vectorizer never produces.
    pub fn transform(&self, doc: &str) -> Result<SparseVector> {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for token in tokenize(doc) {
            if let Some(&idx) = self.vocabulary.get(&token) {
                *counts.entry(idx).or_default() += 1.0;
            }
        }

        let mut row: SparseVector = counts
            .into_iter()
            .map(|(idx, tf)| {
                self.idf
                    .get(idx)
                    .map(|w| (idx, tf * w))
                    .ok_or_else(|| missing_column(idx, self.idf.len()))
            })
            .collect::<Result<_>>()?;

        let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            for (_, w) in &mut row {
                *w /= norm;
            }
        }
        Ok(row)
    }

    pub fn transform_all(&self, docs: &[&str]) -> Result<Vec<SparseVector>> {
        docs.iter().map(|d| self.transform(d)).collect()
    }

    /// Check that every vocabulary column has a finite IDF weight
    pub fn validate(&self) -> Result<()> {
        if self.vocabulary.is_empty() {
            return Err(Error::InvalidData("vectorizer has an empty vocabulary".into()));
        }
        let out_of_range = self
            .vocabulary
            .iter()
            .find(|(_, idx)| **idx >= self.idf.len());
        if let Some((term, &idx)) = out_of_range {
            return Err(Error::InvalidData(format!(
                "term '{}' maps to column {} but only {} IDF weights exist",
                term,
                idx,
                self.idf.len()
            )));
        }
        if self.idf.iter().any(|w| !w.is_finite()) {
            return Err(Error::InvalidData("non-finite IDF weight".into()));
        }
        Ok(())
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.vocabulary.contains_key(term)
    }
}

fn missing_column(idx: usize, columns: usize) -> Error {
    Error::InvalidData(format!(
        "vocabulary column {} out of range for {} IDF weights",
        idx, columns
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_short_and_stop_words() {
        assert_eq!(
            tokenize("Paid to the Uber a b trip"),
            vec!["paid", "uber", "trip"]
        );
    }

    #[test]
    fn test_rows_are_unit_norm() {
        let docs = ["uber trip", "uber eats order", "coffee shop"];
        let v = TfidfVectorizer::fit(&docs, 1000).unwrap();
        for doc in docs {
            let row = v.transform(doc).unwrap();
            let norm: f64 = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let docs = ["uber trip", "uber ride", "uber pool"];
        let v = TfidfVectorizer::fit(&docs, 1000).unwrap();
        // columns are alphabetical: pool=0, ride=1, trip=2, uber=3
        let row = v.transform("uber trip").unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row[0].0, 2);
        assert_eq!(row[1].0, 3);
        assert!(row[0].1 > row[1].1);
    }

    #[test]
    fn test_vocabulary_cap_keeps_frequent_terms() {
        let docs = ["netflix netflix", "netflix spotify", "hulu"];
        let v = TfidfVectorizer::fit(&docs, 1).unwrap();
        assert_eq!(v.vocabulary_size(), 1);
        assert!(v.contains("netflix"));
        assert!(v.transform("hulu").unwrap().is_empty());
    }

    #[test]
    fn test_missing_idf_weight_is_error() {
        let mut v = TfidfVectorizer::fit(&["uber trip", "uber ride"], 1000).unwrap();
        assert!(v.validate().is_ok());

        v.idf.truncate(1);
        assert!(matches!(v.validate(), Err(Error::InvalidData(_))));
        assert!(v.transform("uber ride").is_err());
        // Rows that only touch surviving columns still vectorize
        assert_eq!(v.transform("ride").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_vocabulary_is_error() {
        assert!(TfidfVectorizer::fit(&["the of and", ""], 1000).is_err());
    }
}
