// Keyword stage: multi-pattern substring matching over the expanded taxonomy.
//
// The expanded taxonomy easily holds thousands of terms and a batch holds tens
// of thousands of answers, so matching term by term is out. All terms are
// compiled once into an Aho-Corasick automaton and each answer is scanned in a
// single pass, in time proportional to its length.

use std::collections::HashMap;

use aho_corasick::{AhoCorasick, MatchKind};
use anyhow::{Context, Result};
use tracing::debug;

use crate::normalize::normalize;
use crate::variants::ExpandedTaxonomy;

/// Compiled keyword matcher: term automaton + term -> category table.
pub struct KeywordMatcher {
    automaton: AhoCorasick,
    /// Category index for each pattern id in the automaton.
    owners: Vec<usize>,
    categories: Vec<String>,
}

impl KeywordMatcher {
    /// Compile every expanded term into one automaton.
    ///
    /// When two categories register the same term, the one registered last
    /// owns it. That is a taxonomy-authoring problem, not a runtime error.
    pub fn compile(expanded: &ExpandedTaxonomy) -> Result<Self> {
        let categories: Vec<String> = expanded
            .categories()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();

        let mut patterns: Vec<String> = Vec::new();
        let mut owners: Vec<usize> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();

        for (cat_idx, (_, terms)) in expanded.categories().iter().enumerate() {
            for term in terms.iter().filter(|t| !t.is_empty()) {
                match position.get(term) {
                    Some(&pid) => owners[pid] = cat_idx,
                    None => {
                        position.insert(term.clone(), patterns.len());
                        patterns.push(term.clone());
                        owners.push(cat_idx);
                    }
                }
            }
        }

        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns)
            .context("Failed to compile keyword automaton")?;

        debug!(
            patterns = patterns.len(),
            categories = categories.len(),
            "Compiled keyword matcher"
        );

        Ok(Self {
            automaton,
            owners,
            categories,
        })
    }

    /// Category of the leftmost term occurring anywhere in `normalized_text`.
    ///
    /// Substring semantics: "advogado" matches inside "advogadoa". Use
    /// `term_in_text` when whole-word precision matters.
    pub fn find(&self, normalized_text: &str) -> Option<&str> {
        self.automaton
            .find(normalized_text)
            .map(|m| self.category_of(m.pattern().as_usize()))
    }

    /// Every category hit in `normalized_text`, in order of first appearance.
    pub fn find_all(&self, normalized_text: &str) -> Vec<&str> {
        let mut hits: Vec<&str> = Vec::new();
        for m in self.automaton.find_iter(normalized_text) {
            let category = self.category_of(m.pattern().as_usize());
            if !hits.contains(&category) {
                hits.push(category);
            }
        }
        hits
    }

    /// Number of distinct terms compiled into the automaton.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    fn category_of(&self, pattern_id: usize) -> &str {
        &self.categories[self.owners[pattern_id]]
    }
}

/// Whole-word check: does any of `terms` appear in `text` bounded by
/// non-letter characters? The text is normalized first; terms are expected
/// to already be in normalized form.
///
/// Slower than `KeywordMatcher::find` (one regex per term), used where
/// precision matters more than throughput.
pub fn term_in_text<S: AsRef<str>>(terms: &[S], text: &str) -> bool {
    let text = normalize(text);
    terms.iter().any(|term| {
        let term = term.as_ref();
        if term.is_empty() {
            return false;
        }
        let pattern = format!(r"\b{}\b", regex_lite::escape(term));
        match regex_lite::Regex::new(&pattern) {
            Ok(re) => re.is_match(&text),
            Err(_) => false,
        }
    })
}
