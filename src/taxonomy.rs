// Taxonomy: the fixed set of target categories and their seed vocabulary.
//
// A taxonomy is authored outside this crate (one JSON file per survey
// question: professions, other languages, learning problems, ...). Category
// order matters: it decides which category wins a semantic tie and which
// category owns a term registered twice, so the taxonomy keeps categories in
// the order they were supplied instead of using a hash map.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::normalize::normalize;

/// Sentinel category for answers neither stage could resolve.
pub const UNCLASSIFIED: &str = "Outros";

/// One category and its author-supplied seed terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub terms: Vec<String>,
}

/// Ordered mapping from category name to seed terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taxonomy {
    categories: Vec<Category>,
}

impl Taxonomy {
    /// Build a taxonomy from (name, terms) pairs, keeping their order.
    ///
    /// No validation happens here; call `validate()` (the orchestrator does)
    /// before using the taxonomy for categorization.
    pub fn new<N, T>(categories: Vec<(N, Vec<T>)>) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        Self {
            categories: categories
                .into_iter()
                .map(|(name, terms)| Category {
                    name: name.into(),
                    terms: terms.into_iter().map(Into::into).collect(),
                })
                .collect(),
        }
    }

    /// Parse a taxonomy from a JSON object `{ "Category": ["seed", ...] }`.
    /// Categories keep the order they appear in the document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(json).context("Taxonomy must be a JSON object")?;

        let mut categories = Vec::with_capacity(map.len());
        for (name, value) in map {
            let terms: Vec<String> = serde_json::from_value(value).with_context(|| {
                format!("Category '{name}' must map to a list of strings")
            })?;
            categories.push(Category { name, terms });
        }

        Ok(Self { categories })
    }

    /// Load a taxonomy JSON file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read taxonomy file {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Invalid taxonomy file {}", path.display()))
    }

    /// Serialize back to the JSON object form (order preserved).
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for category in &self.categories {
            map.insert(
                category.name.clone(),
                serde_json::Value::from(category.terms.clone()),
            );
        }
        serde_json::Value::Object(map)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Check the taxonomy is usable before any row is processed.
    ///
    /// Rejects: no categories, blank or duplicate category names, the sentinel
    /// used as a category, empty term lists, and seed terms that normalize to
    /// nothing (an empty pattern would match every answer).
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            anyhow::bail!("Taxonomy has no categories");
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.name.trim().is_empty() {
                anyhow::bail!("Taxonomy contains a category with an empty name");
            }
            if category.name == UNCLASSIFIED {
                anyhow::bail!(
                    "'{UNCLASSIFIED}' is reserved for unclassified answers and cannot be a category"
                );
            }
            if !seen.insert(category.name.as_str()) {
                anyhow::bail!("Duplicate category '{}' in taxonomy", category.name);
            }
            if category.terms.is_empty() {
                anyhow::bail!("Category '{}' has no seed terms", category.name);
            }
            if let Some(bad) = category.terms.iter().find(|t| normalize(t).is_empty()) {
                anyhow::bail!(
                    "Seed term {:?} in category '{}' is empty after normalization",
                    bad,
                    category.name
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_preserves_order() {
        let tax = Taxonomy::from_json_str(
            r#"{"Saude": ["enfermeiro"], "Direito": ["advogado", "juiz"], "Artes": ["pintor"]}"#,
        )
        .unwrap();
        let names: Vec<&str> = tax.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Saude", "Direito", "Artes"]);
        assert_eq!(tax.get("Direito").unwrap().terms, vec!["advogado", "juiz"]);
    }

    #[test]
    fn test_json_rejects_non_list_terms() {
        let result = Taxonomy::from_json_str(r#"{"Saude": "enfermeiro"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_ok() {
        let tax = Taxonomy::new(vec![("Direito", vec!["advogado"])]);
        assert!(tax.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_taxonomy() {
        assert!(Taxonomy::default().validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_terms() {
        let tax = Taxonomy::new(vec![("Direito", Vec::<String>::new())]);
        let err = tax.validate().unwrap_err().to_string();
        assert!(err.contains("no seed terms"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_blank_seed() {
        let tax = Taxonomy::new(vec![("Direito", vec!["advogado", "123"])]);
        assert!(tax.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_sentinel() {
        let dup = Taxonomy::new(vec![("A", vec!["x"]), ("A", vec!["y"])]);
        assert!(dup.validate().is_err());

        let sentinel = Taxonomy::new(vec![(UNCLASSIFIED, vec!["x"])]);
        assert!(sentinel.validate().is_err());
    }

    #[test]
    fn test_to_json_roundtrip() {
        let tax = Taxonomy::new(vec![("B", vec!["b1"]), ("A", vec!["a1", "a2"])]);
        let json = serde_json::to_string(&tax.to_json()).unwrap();
        assert_eq!(Taxonomy::from_json_str(&json).unwrap(), tax);
    }
}
