// Unit tests for the text side of the engine: normalization, variant
// expansion and the keyword matcher built from an expanded taxonomy.
//
// These check invariants over a spread of realistic answers rather than one
// example at a time.

use categorizer::keywords::{term_in_text, KeywordMatcher};
use categorizer::normalize::normalize;
use categorizer::taxonomy::Taxonomy;
use categorizer::variants::{expand_taxonomy, generate_variants, VariantRules};

const ANSWERS: &[&str] = &[
    "Sou Advogado!",
    "  ENFERMEIRA (UTI)  ",
    "Técnica em TI 2x",
    "a !",
    "!!!",
    "",
    "Professora\tde\nMatemática",
    "ＦＵＬＬＷＩＤＴＨ",
    "日本語のテキスト",
    "São Paulo - capital",
    "\x0bvertical tab\x0b",
    "campo\x1fseparado",
];

// ============================================================
// normalize
// ============================================================

#[test]
fn normalize_is_idempotent() {
    for raw in ANSWERS {
        let once = normalize(raw);
        assert_eq!(normalize(&once), once, "not idempotent for {raw:?}");
    }
}

#[test]
fn normalize_output_alphabet() {
    for raw in ANSWERS {
        let out = normalize(raw);
        assert!(
            out.chars()
                .all(|c| c.is_ascii_lowercase()
                    || c.is_ascii_whitespace()
                    || c == '\x0b'
                    || ('\x1c'..='\x1f').contains(&c)),
            "unexpected character in {out:?}"
        );
        assert_eq!(out, out.trim(), "untrimmed output {out:?}");
    }
}

#[test]
fn normalize_known_outputs() {
    assert_eq!(normalize("Sou Advogado!"), "sou advogado");
    assert_eq!(normalize("Técnica em TI 2x"), "tecnica em ti x");
    assert_eq!(normalize("ＦＵＬＬＷＩＤＴＨ"), "fullwidth");
    assert_eq!(normalize("日本語のテキスト"), "");
    assert_eq!(normalize("São Paulo - capital"), "sao paulo  capital");
}

// ============================================================
// Variant expansion
// ============================================================

#[test]
fn variants_always_include_normalized_seed() {
    let rules = VariantRules::portuguese();
    for seed in ["Advogado", "viagem", "Gerência", "universidade", "profissão", "idiomas"] {
        let variants = generate_variants(seed, &rules);
        assert!(
            variants.contains(&normalize(seed)),
            "{seed:?} missing from {variants:?}"
        );
    }
}

#[test]
fn variants_are_normalized_and_non_empty() {
    let rules = VariantRules::portuguese();
    for seed in ["Dade", "viagem", "Gerência", "cidade", "ação"] {
        for variant in generate_variants(seed, &rules) {
            assert!(!variant.is_empty());
            assert_eq!(normalize(&variant), variant);
        }
    }
}

#[test]
fn expansion_is_deterministic_and_keeps_category_order() {
    let taxonomy = Taxonomy::from_json_str(
        r#"{"Turismo": ["viagem", "hotel"], "Gestao": ["gerencia"], "Educacao": ["universidade"]}"#,
    )
    .unwrap();
    let rules = VariantRules::portuguese();

    let a = expand_taxonomy(&taxonomy, &rules);
    let b = expand_taxonomy(&taxonomy, &rules);
    assert_eq!(a, b);

    let names: Vec<&str> = a.categories().iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["Turismo", "Gestao", "Educacao"]);

    assert_eq!(
        a.terms("Turismo").unwrap(),
        ["hotel", "hotels", "viagem", "viagems", "viajem"]
    );
    assert!(a.terms("Gestao").unwrap().contains(&"gerente".to_string()));
    assert!(a.terms("Educacao").unwrap().contains(&"universi".to_string()));
}

#[test]
fn no_rules_means_seed_terms_only() {
    let taxonomy = Taxonomy::new(vec![("Direito", vec!["Advogado", "juíza"])]);
    let expanded = expand_taxonomy(&taxonomy, &VariantRules::none());
    assert_eq!(expanded.terms("Direito").unwrap(), ["advogado", "juiza"]);
}

// ============================================================
// Keyword matcher over an expansion
// ============================================================

#[test]
fn matcher_finds_generated_variants() {
    let taxonomy = Taxonomy::new(vec![
        ("Turismo", vec!["viagem"]),
        ("Gestao", vec!["gerencia"]),
    ]);
    let expanded = expand_taxonomy(&taxonomy, &VariantRules::portuguese());
    let matcher = KeywordMatcher::compile(&expanded).unwrap();

    assert_eq!(matcher.find(&normalize("Adoro uma VIAJEM")), Some("Turismo"));
    assert_eq!(matcher.find(&normalize("sou gerente de loja")), Some("Gestao"));
    assert_eq!(matcher.find(&normalize("Nada disso")), None);
    assert_eq!(matcher.find(""), None);
}

#[test]
fn matcher_and_whole_word_check_differ_on_substrings() {
    let taxonomy = Taxonomy::new(vec![("Artes", vec!["arte"])]);
    let expanded = expand_taxonomy(&taxonomy, &VariantRules::none());
    let matcher = KeywordMatcher::compile(&expanded).unwrap();

    // "arte" sits inside "martelo": the automaton matches, the whole-word check does not
    assert_eq!(matcher.find("martelo"), Some("Artes"));
    assert!(!term_in_text(expanded.terms("Artes").unwrap(), "Martelo"));
    assert!(term_in_text(expanded.terms("Artes").unwrap(), "Gosto de Arte."));
}
