use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use categorizer::cache::{CacheKey, CacheStore};
use categorizer::config::{CacheBackend, Config};
use categorizer::keywords::{term_in_text, KeywordMatcher};
use categorizer::normalize::{normalize, text_column};
use categorizer::pipeline::{categorize_column, CacheHandle, CategorizeOptions};
use categorizer::semantic::embeddings::SentenceEmbedder;
use categorizer::taxonomy::Taxonomy;
use categorizer::variants::expand_taxonomy;

/// Categorizer: assign free-text survey answers to taxonomy categories.
///
/// Keyword matching on normalized text first, sentence-embedding similarity
/// for whatever the keywords miss.
#[derive(Parser)]
#[command(name = "categorizer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Categorize a file of answers (one answer per line, blank = missing)
    Categorize {
        /// Taxonomy JSON file: { "Category": ["seed", ...], ... }
        #[arg(long)]
        taxonomy: PathBuf,

        /// Input text file, one answer per line
        #[arg(long)]
        input: PathBuf,

        /// Write one category per line to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Similarity threshold for the semantic stage (default: 0.6)
        #[arg(long)]
        threshold: Option<f64>,

        /// Skip the result cache for this run
        #[arg(long)]
        no_cache: bool,

        /// Use a fixed cache identity instead of a content hash
        #[arg(long)]
        cache_key: Option<String>,

        /// Print assignments as JSON instead of the summary
        #[arg(long)]
        json: bool,

        /// How many unclassified answers to list (default: 10)
        #[arg(long, default_value = "10")]
        samples: usize,
    },

    /// Print the expanded taxonomy (seed terms plus generated variants)
    Expand {
        #[arg(long)]
        taxonomy: PathBuf,

        /// Show per-category term counts instead of the full JSON
        #[arg(long)]
        stats: bool,
    },

    /// Check how the keyword stage sees a single answer
    Check {
        #[arg(long)]
        taxonomy: PathBuf,

        /// Restrict the whole-word check to one category
        #[arg(long)]
        category: Option<String>,

        /// The answer text to check
        text: String,
    },

    /// Delete every cached run from the configured cache
    CacheClear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("categorizer=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Categorize {
            taxonomy,
            input,
            output,
            threshold,
            no_cache,
            cache_key,
            json,
            samples,
        } => {
            let config = Config::load()?;
            let taxonomy = Taxonomy::load(&taxonomy)?;
            taxonomy.validate()?;

            let texts = read_answers(&input)?;
            info!(rows = texts.len(), input = %input.display(), "Loaded answers");

            let options = CategorizeOptions {
                threshold: threshold.unwrap_or(config.threshold),
                rules: config.variant_rules()?,
                show_progress: !json,
                label: input
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "answers".to_string()),
            };

            config.require_model()?;
            let encoder = SentenceEmbedder::load(&config.model_dir, config.max_tokens)?
                .with_batch_size(config.batch_size);

            let store = if no_cache { None } else { open_cache(&config) };
            let handle = store.as_deref().map(|store| CacheHandle {
                store,
                key: match &cache_key {
                    Some(k) => CacheKey::new(k.clone()),
                    None => {
                        CacheKey::for_run(&texts, &taxonomy, &options.rules, options.threshold)
                    }
                },
            });

            let result =
                categorize_column(&texts, &taxonomy, &encoder, &options, handle.as_ref()).await?;

            if let Some(path) = &output {
                let mut body = result.labels().join("\n");
                body.push('\n');
                std::fs::write(path, body)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), "Wrote categories");
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&result.assignments)?);
            } else {
                categorizer::output::terminal::display_summary(&result);
                categorizer::output::terminal::display_unclassified_samples(
                    &result, &texts, samples,
                );
                if let Some(path) = &output {
                    println!("\nCategories written to {}", path.display());
                }
            }
        }

        Commands::Expand { taxonomy, stats } => {
            let config = Config::load()?;
            let taxonomy = Taxonomy::load(&taxonomy)?;
            taxonomy.validate()?;

            let expanded = expand_taxonomy(&taxonomy, &config.variant_rules()?);
            if stats {
                categorizer::output::terminal::display_expansion_stats(&expanded);
            } else {
                println!("{}", serde_json::to_string_pretty(&expanded.to_json())?);
            }
        }

        Commands::Check {
            taxonomy,
            category,
            text,
        } => {
            let config = Config::load()?;
            let taxonomy = Taxonomy::load(&taxonomy)?;
            taxonomy.validate()?;

            let expanded = expand_taxonomy(&taxonomy, &config.variant_rules()?);
            let matcher = KeywordMatcher::compile(&expanded)?;

            let normalized = normalize(&text);
            println!("Normalized: {:?}", normalized);

            match matcher.find(&normalized) {
                Some(c) => println!("Keyword match: {}", c.green().bold()),
                None => println!("Keyword match: {}", "none (would go to the semantic stage)".dimmed()),
            }

            let hits = matcher.find_all(&normalized);
            if hits.len() > 1 {
                println!("  Also matched: {}", hits[1..].join(", "));
            }

            let candidates: Vec<&(String, Vec<String>)> = match &category {
                Some(name) => {
                    let found: Vec<_> =
                        expanded.categories().iter().filter(|(n, _)| n == name).collect();
                    if found.is_empty() {
                        anyhow::bail!("Category '{name}' is not in the taxonomy");
                    }
                    found
                }
                None => expanded.categories().iter().collect(),
            };

            let whole_word: Vec<&str> = candidates
                .iter()
                .filter(|(_, terms)| term_in_text(terms, &text))
                .map(|(name, _)| name.as_str())
                .collect();
            if whole_word.is_empty() {
                println!("Whole-word matches: {}", "none".dimmed());
            } else {
                println!("Whole-word matches: {}", whole_word.join(", "));
            }
        }

        Commands::CacheClear => {
            let config = Config::load()?;
            match open_cache(&config) {
                Some(store) => {
                    let removed = store.clear().await?;
                    println!("Removed {removed} cached runs from {}", config.cache_path.display());
                }
                None => println!("Caching is disabled (CATEGORIZER_CACHE=off)"),
            }
        }
    }

    Ok(())
}

/// Read one answer per line. Blank lines are missing answers.
fn read_answers(path: &Path) -> Result<Vec<String>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read answers from {}", path.display()))?;
    Ok(text_column(body.lines().map(|line| {
        if line.trim().is_empty() {
            None
        } else {
            Some(line)
        }
    })))
}

/// Open the configured cache store. A cache that can't be opened disables
/// caching for the run instead of failing it.
fn open_cache(config: &Config) -> Option<Box<dyn CacheStore>> {
    let opened: Result<Box<dyn CacheStore>> = match config.cache_backend {
        CacheBackend::Off => return None,
        CacheBackend::File => categorizer::cache::file::FileCacheStore::open(&config.cache_path)
            .map(|s| Box::new(s) as Box<dyn CacheStore>),
        #[cfg(feature = "sqlite")]
        CacheBackend::Sqlite => {
            categorizer::cache::sqlite::SqliteCacheStore::open(&config.cache_path)
                .map(|s| Box::new(s) as Box<dyn CacheStore>)
        }
        #[cfg(not(feature = "sqlite"))]
        CacheBackend::Sqlite => Err(anyhow::anyhow!(
            "CATEGORIZER_CACHE=sqlite but the 'sqlite' feature is not compiled in"
        )),
    };

    match opened {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, path = %config.cache_path.display(), "Cache unavailable, running without it");
            None
        }
    }
}
