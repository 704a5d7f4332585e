// Colored terminal output for categorization runs.
//
// All terminal formatting lives here so the library core stays free of any
// presentation concern. main.rs delegates to these functions.

use std::collections::HashMap;

use colored::Colorize;

use crate::cache::CacheStatus;
use crate::pipeline::ColumnResult;
use crate::taxonomy::UNCLASSIFIED;
use crate::variants::ExpandedTaxonomy;

/// Display the category distribution of a run as a bar chart.
pub fn display_summary(result: &ColumnResult) {
    let stats = &result.stats;

    println!(
        "\n{}",
        format!("=== Categorization ({} rows) ===", stats.rows).bold()
    );
    println!();

    let bar_width: usize = 30;
    let rows = stats.rows.max(1) as f64;

    for (category, count) in result.counts() {
        let share = count as f64 / rows;
        let filled = (share * bar_width as f64).round() as usize;
        let empty = bar_width.saturating_sub(filled);
        let bar = format!("[{}{}]", "=".repeat(filled), " ".repeat(empty));

        let colored_bar = if category == UNCLASSIFIED {
            bar.dimmed()
        } else if share >= 0.25 {
            bar.bright_green()
        } else if share >= 0.10 {
            bar.bright_yellow()
        } else {
            bar.bright_blue()
        };

        println!(
            "  {:<32} {} {:>6} ({:>5.1}%)",
            category.bold(),
            colored_bar,
            count,
            share * 100.0
        );
    }

    println!();
    if stats.cache == CacheStatus::Hit {
        println!("  {}", "Loaded from cache".green());
    } else {
        println!(
            "  Keyword: {}  Semantic: {}  Unclassified: {}  (distinct texts encoded: {})",
            stats.keyword_matched,
            stats.semantic_matched,
            stats.unclassified,
            stats.distinct_encoded
        );
        println!("  Cache: {}", colorize_cache(&stats.cache));
    }
}

/// Show the most frequent answers that ended up in "Outros", the usual
/// starting point for adding seed terms to the taxonomy.
pub fn display_unclassified_samples(result: &ColumnResult, texts: &[String], limit: usize) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for a in &result.assignments {
        if a.category != UNCLASSIFIED {
            continue;
        }
        if let Some(text) = texts.get(a.index) {
            let text = text.trim();
            if !text.is_empty() {
                *counts.entry(text).or_insert(0) += 1;
            }
        }
    }

    if counts.is_empty() {
        return;
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    println!(
        "\n{}",
        format!("Top unclassified answers ({} distinct):", ranked.len()).bold()
    );
    for (text, count) in ranked.into_iter().take(limit) {
        let preview = super::truncate_chars(text, 60);
        println!("  {:>5}x  {}", count, preview.dimmed());
    }
}

/// One line per category with its expanded term count.
pub fn display_expansion_stats(expanded: &ExpandedTaxonomy) {
    println!(
        "\n{}",
        format!(
            "=== Expanded taxonomy ({} categories, {} terms) ===",
            expanded.len(),
            expanded.term_count()
        )
        .bold()
    );
    for (name, terms) in expanded.categories() {
        println!("  {:<32} {:>5} terms", name.bold(), terms.len());
    }
}

fn colorize_cache(status: &CacheStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        CacheStatus::Hit => text.green(),
        CacheStatus::Miss => text.normal(),
        CacheStatus::Disabled => text.dimmed(),
        CacheStatus::Corrupt(_) | CacheStatus::Unavailable(_) => text.yellow(),
    }
}
