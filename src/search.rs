//! `analyst search`: rank documentation chunks for a query.

use anyhow::Result;

use crate::config::Config;
use crate::corpus;
use crate::models::RetrievalResult;

const EXCERPT_CHARS: usize = 160;

pub fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        anyhow::bail!("query must not be empty");
    }

    let index = corpus::build_index(config)?;
    let k = k.unwrap_or(config.retrieval.top_k);
    let results = index.search(query, k);

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    print_results(&results);
    Ok(())
}

fn print_results(results: &[RetrievalResult]) {
    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, result.score, result.chunk.id);
        println!("    source: {}", result.chunk.source);
        println!("    excerpt: \"{}\"", excerpt(&result.chunk.content));
        println!();
    }
}

/// Single-line preview of a chunk, cut on a char boundary.
pub fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}
