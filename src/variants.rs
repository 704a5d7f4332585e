// Variant expansion: derive alternate spellings from seed terms.
//
// Survey answers are typed by hand, so "advogados", "viajem" or "gerente" show
// up where the taxonomy author wrote "advogado", "viagem" or "gerencia". The
// expander applies a small table of Portuguese suffix rules to every seed term
// and unions the results per category. The table is plain data so a bad rule
// can be corrected without touching the control flow below.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::normalize::normalize;
use crate::taxonomy::Taxonomy;

/// Replace `suffix` at the end of a term with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixRule {
    pub suffix: String,
    pub replacement: String,
}

impl SuffixRule {
    pub fn new(suffix: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            replacement: replacement.into(),
        }
    }

    /// Apply the rule; `None` when the term doesn't end with the suffix.
    pub fn apply(&self, term: &str) -> Option<String> {
        term.strip_suffix(self.suffix.as_str())
            .map(|root| format!("{root}{}", self.replacement))
    }
}

/// The morphology rule table used by the expander.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRules {
    /// Appended to every term that doesn't already end with it (naive plural).
    pub plural_suffix: Option<String>,
    /// Independent suffix rewrites, each producing at most one variant.
    pub suffix_rules: Vec<SuffixRule>,
}

impl Default for VariantRules {
    fn default() -> Self {
        Self::portuguese()
    }
}

impl VariantRules {
    /// The default Portuguese table.
    ///
    /// `cao -> car` and `dade -> ""` are rough: "profissao" becomes
    /// "profissar", "universidade" becomes "universi". They stay in the default
    /// table for parity with existing categorized data; override via
    /// `CATEGORIZER_RULES` to drop them.
    pub fn portuguese() -> Self {
        Self {
            plural_suffix: Some("s".to_string()),
            suffix_rules: vec![
                SuffixRule::new("gem", "jem"),
                SuffixRule::new("cao", "car"),
                SuffixRule::new("ncia", "nte"),
                SuffixRule::new("dade", ""),
            ],
        }
    }

    /// No rules at all: every term expands to just its normalized form.
    pub fn none() -> Self {
        Self {
            plural_suffix: None,
            suffix_rules: Vec::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid variant rules JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read variant rules {}", path.display()))?;
        Self::from_json_str(&json)
    }
}

/// Every spelling of a seed term: its normalized form plus one variant per
/// rule that fires.
///
/// A rule output that is empty or has whitespace at either edge is discarded,
/// not trimmed: "alta dade" under `dade -> ""` would leave "alta ", and
/// trimming that to "alta" would register a much broader keyword than the
/// seed. Every variant kept is therefore already in normalized form.
pub fn generate_variants(term: &str, rules: &VariantRules) -> BTreeSet<String> {
    let base = normalize(term);
    let mut variants = BTreeSet::new();
    if base.is_empty() {
        return variants;
    }

    if let Some(plural) = rules.plural_suffix.as_deref() {
        if !plural.is_empty() && !base.ends_with(plural) {
            variants.insert(format!("{base}{plural}"));
        }
    }

    for rule in &rules.suffix_rules {
        if let Some(variant) = rule.apply(&base) {
            if !variant.is_empty() && variant.trim() == variant {
                variants.insert(variant);
            }
        }
    }

    variants.insert(base);
    variants
}

/// Category -> sorted, deduplicated normalized terms. Category order follows
/// the source taxonomy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpandedTaxonomy {
    categories: Vec<(String, Vec<String>)>,
}

impl ExpandedTaxonomy {
    pub fn categories(&self) -> &[(String, Vec<String>)] {
        &self.categories
    }

    pub fn terms(&self, category: &str) -> Option<&[String]> {
        self.categories
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, terms)| terms.as_slice())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Total number of expanded terms across all categories.
    pub fn term_count(&self) -> usize {
        self.categories.iter().map(|(_, terms)| terms.len()).sum()
    }

    /// JSON object form, for `categorizer expand`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, terms) in &self.categories {
            map.insert(name.clone(), serde_json::Value::from(terms.clone()));
        }
        serde_json::Value::Object(map)
    }
}

/// Expand every seed term of every category and union the variants.
pub fn expand_taxonomy(taxonomy: &Taxonomy, rules: &VariantRules) -> ExpandedTaxonomy {
    let categories = taxonomy
        .categories()
        .iter()
        .map(|category| {
            let terms: BTreeSet<String> = category
                .terms
                .iter()
                .flat_map(|term| generate_variants(term, rules))
                .collect();
            (category.name.clone(), terms.into_iter().collect())
        })
        .collect();

    ExpandedTaxonomy { categories }
}
