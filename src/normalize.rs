// Text normalization: the canonical form every term and answer is compared in.
//
// Survey answers arrive with arbitrary casing, accents, digits and punctuation
// ("Sou Advogado!", "ENFERMEIRA (UTI)", "Técnica em TI 2x"). Both the keyword
// stage and the semantic stage work on the normalized form, and the expanded
// taxonomy is built from normalized seed terms, so this function is the single
// place that decides what "the same text" means.

use std::fmt::Display;

use unicode_normalization::UnicodeNormalization;

/// Normalize a raw answer into lowercase ASCII letters and whitespace.
///
/// Steps, in order:
/// 1. lower-case;
/// 2. NFKD decomposition, dropping every non-ASCII code point (so "é" becomes
///    "e" and characters with no Latin decomposition disappear);
/// 3. delete everything that is not `a-z` or ASCII whitespace;
/// 4. trim surrounding whitespace.
///
/// Trimming happens last so `normalize(normalize(x)) == normalize(x)` even
/// when stripped punctuation leaves whitespace at the edges ("a !" -> "a").
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();

    let filtered: String = lowered
        .nfkd()
        .filter(|c| c.is_ascii())
        .filter(|&c| c.is_ascii_lowercase() || is_whitespace(c))
        .collect();

    filtered.trim_matches(is_whitespace).to_string()
}

/// ASCII whitespace as understood by the rest of the pipeline: the ASCII
/// code points with a separator bidi class. That adds the vertical tab and the
/// information separators `\x1c`..=`\x1f` to what `char::is_ascii_whitespace`
/// accepts. They are kept verbatim inside the text, not folded to spaces.
fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c' | '\x1c'..='\x1f')
}

/// Coerce a possibly-missing value into text. Missing becomes the empty string;
/// anything else uses its `Display` form (numbers, booleans, etc.).
pub fn coerce<T: Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

/// Build a text column from a sequence of possibly-missing values.
pub fn text_column<I, T>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<T>>,
    T: Display,
{
    values.into_iter().map(coerce).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_strips_accents() {
        assert_eq!(normalize("Médico Cirurgião"), "medico cirurgiao");
        assert_eq!(normalize("AÇÃO"), "acao");
    }

    #[test]
    fn test_removes_digits_and_punctuation() {
        assert_eq!(normalize("Técnica em TI, 2x!"), "tecnica em ti x");
        assert_eq!(normalize("123"), "");
    }

    #[test]
    fn test_trims_after_filtering() {
        assert_eq!(normalize("  a !  "), "a");
        assert_eq!(normalize("!!advogado??"), "advogado");
    }

    #[test]
    fn test_drops_non_latin_scripts() {
        assert_eq!(normalize("日本語 professor"), "professor");
        assert_eq!(normalize("Ελληνικά"), "");
    }

    #[test]
    fn test_keeps_inner_whitespace() {
        assert_eq!(normalize("sou   advogado"), "sou   advogado");
        assert_eq!(normalize("sou\tadvogado"), "sou\tadvogado");
    }

    #[test]
    fn test_compatibility_forms_fold() {
        // Ligature and non-breaking space decompose to plain ASCII
        assert_eq!(normalize("ﬁnanças"), "financas");
        assert_eq!(normalize("sou\u{00a0}professor"), "sou professor");
    }

    #[test]
    fn test_information_separators_are_whitespace() {
        assert_eq!(normalize("a\x1fb"), "a\x1fb");
        assert_eq!(normalize("\x1c Ação \x1d"), "acao");
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce::<String>(None), "");
        assert_eq!(coerce(Some(42)), "42");
        assert_eq!(coerce(Some("Direito")), "Direito");
    }

    #[test]
    fn test_text_column() {
        let col = text_column(vec![Some("a"), None, Some("b")]);
        assert_eq!(col, vec!["a".to_string(), String::new(), "b".to_string()]);
    }
}
