// Unit tests for the semantic stage: batching, deduplication and the
// encoder contract, using table-driven encoders instead of the ONNX model.

mod common;

use categorizer::semantic::classifier::{
    build_index, classify_batch, encode_in_batches, CategoryEmbeddings, EmbeddingIndex,
};
use categorizer::semantic::embeddings::cosine_similarity;
use categorizer::taxonomy::UNCLASSIFIED;
use categorizer::variants::{expand_taxonomy, VariantRules};

use common::{axis, near, strings, survey_taxonomy, LookupEncoder, ShortEncoder};

fn two_category_index() -> EmbeddingIndex {
    EmbeddingIndex::from_parts(vec![
        CategoryEmbeddings {
            name: "Direito".to_string(),
            terms: strings(&["advogado"]),
            vectors: vec![axis(0)],
        },
        CategoryEmbeddings {
            name: "Saude".to_string(),
            terms: strings(&["enfermeiro", "medico"]),
            vectors: vec![axis(1), axis(3)],
        },
    ])
}

// ============================================================
// Batching
// ============================================================

#[tokio::test]
async fn encode_respects_preferred_batch_size() {
    let encoder = LookupEncoder::new().with_batch_size(2);
    let texts = strings(&["a", "b", "c", "d", "e"]);

    let vectors = encode_in_batches(&encoder, &texts).await.unwrap();

    assert_eq!(vectors.len(), 5);
    let sizes: Vec<usize> = encoder.calls().iter().map(|c| c.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(encoder.seen(), texts);
}

#[tokio::test]
async fn short_encoder_output_is_an_error() {
    let err = encode_in_batches(&ShortEncoder, &strings(&["a", "b"]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("1 vectors for 2 texts"), "got: {err}");
}

#[tokio::test]
async fn index_keeps_vectors_aligned_with_terms() {
    let encoder = LookupEncoder::for_survey().with_batch_size(4);
    let expanded = expand_taxonomy(&survey_taxonomy(), &VariantRules::portuguese());

    let index = build_index(&expanded, &encoder).await.unwrap();

    assert_eq!(index.len(), 3);
    for (category, axis_id) in index.categories().iter().zip([0, 1, 2]) {
        assert_eq!(category.terms.len(), category.vectors.len());
        for v in &category.vectors {
            assert_eq!(v, &axis(axis_id), "misaligned vector in {}", category.name);
        }
    }
}

// ============================================================
// classify_batch
// ============================================================

#[tokio::test]
async fn classify_uses_best_term_of_each_category() {
    let encoder = LookupEncoder::new()
        .with("clinico geral", near(3, 0.8))
        .with("direito penal", near(0, 0.65));

    let result = classify_batch(
        &strings(&["clinico geral", "direito penal", "outra coisa"]),
        &two_category_index(),
        &encoder,
        0.6,
    )
    .await
    .unwrap();

    assert_eq!(result["clinico geral"], "Saude");
    assert_eq!(result["direito penal"], "Direito");
    assert_eq!(result["outra coisa"], UNCLASSIFIED);
}

#[tokio::test]
async fn classify_encodes_each_distinct_text_once() {
    let encoder = LookupEncoder::new().with_batch_size(100);
    let texts = strings(&["x", "y", "x", "x", "y"]);

    let result = classify_batch(&texts, &two_category_index(), &encoder, 0.6)
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(encoder.calls(), vec![strings(&["x", "y"])]);
}

#[tokio::test]
async fn classify_maps_blank_to_unclassified_without_encoding() {
    let encoder = LookupEncoder::new().strict();
    let result = classify_batch(&strings(&["", "  "]), &two_category_index(), &encoder, 0.0)
        .await
        .unwrap();

    assert_eq!(result[""], UNCLASSIFIED);
    assert_eq!(result["  "], UNCLASSIFIED);
    assert!(encoder.calls().is_empty());
}

#[tokio::test]
async fn classify_empty_input_makes_no_calls() {
    let encoder = LookupEncoder::new();
    let result = classify_batch(&[], &two_category_index(), &encoder, 0.6)
        .await
        .unwrap();
    assert!(result.is_empty());
    assert!(encoder.calls().is_empty());
}

#[tokio::test]
async fn classify_against_empty_index_is_unclassified() {
    let encoder = LookupEncoder::new().with("qualquer", axis(0));
    let result = classify_batch(&strings(&["qualquer"]), &EmbeddingIndex::default(), &encoder, 0.0)
        .await
        .unwrap();
    assert_eq!(result["qualquer"], UNCLASSIFIED);
}

// ============================================================
// cosine_similarity
// ============================================================

#[test]
fn cosine_stays_within_minus_one_and_one() {
    let samples = [
        vec![1.0, 2.0, 3.0],
        vec![-1.0, 0.5, 0.0],
        vec![0.0, 0.0, 0.0],
        vec![1e-300, 1e-300, 0.0],
        vec![-3.0, -2.0, -1.0],
    ];
    for a in &samples {
        for b in &samples {
            let s = cosine_similarity(a, b);
            assert!((-1.0..=1.0).contains(&s), "cos({a:?}, {b:?}) = {s}");
        }
    }
    assert!(cosine_similarity(&samples[0], &samples[4]) < 0.0);
}

#[test]
fn cosine_is_symmetric() {
    let a = near(2, 0.3);
    let b = near(2, 0.9);
    assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
}
