//! Filesystem corpus loader.
//!
//! Walks the configured docs root and returns every matching file as a
//! [`RawDocument`], sorted by relative path so index builds are
//! reproducible.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::{Config, DocsConfig};
use crate::index::{Bm25Params, RankingIndex};
use crate::models::RawDocument;

pub fn load_documents(docs: &DocsConfig) -> Result<Vec<RawDocument>> {
    let root = &docs.root;
    if !root.exists() {
        bail!("Docs root does not exist: {}", root.display());
    }

    let include_set = build_globset(&docs.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string()];
    default_excludes.extend(docs.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let body = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        documents.push(RawDocument {
            filename: rel_str,
            body,
        });
    }

    documents.sort_by(|a, b| a.filename.cmp(&b.filename));
    tracing::info!(count = documents.len(), root = %root.display(), "loaded corpus");

    Ok(documents)
}

/// Load the corpus and build the ranking index once at startup. A missing
/// docs root yields an empty index; retrieval then returns nothing.
pub fn build_index(config: &Config) -> Result<RankingIndex> {
    let documents = if config.docs.root.exists() {
        load_documents(&config.docs)?
    } else {
        tracing::warn!(root = %config.docs.root.display(), "docs root missing, index is empty");
        Vec::new()
    };
    let index = RankingIndex::build(&documents, Bm25Params::from(&config.retrieval));
    tracing::info!(chunks = index.len(), "ranking index built");
    Ok(index)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
