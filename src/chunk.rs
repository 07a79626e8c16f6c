//! Heading/blank-line document chunker.
//!
//! Splits a document wherever a level 1-3 markdown heading starts a line or
//! a blank line separates paragraphs. The chunk ordinal is the position in
//! the raw split, so pieces that are dropped for being empty still consume
//! an ordinal and the surviving IDs stay stable across rebuilds.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::DocumentChunk;

fn boundary() -> &'static Regex {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    BOUNDARY.get_or_init(|| Regex::new(r"\n#{1,3} |\n\n").expect("static regex"))
}

/// Split one document into trimmed, non-empty chunks.
pub fn split_document(filename: &str, text: &str) -> Vec<DocumentChunk> {
    boundary()
        .split(text)
        .enumerate()
        .filter_map(|(ordinal, piece)| {
            let trimmed = piece.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(DocumentChunk {
                id: chunk_id(filename, ordinal),
                content: trimmed.to_string(),
                source: filename.to_string(),
            })
        })
        .collect()
}

pub fn chunk_id(filename: &str, ordinal: usize) -> String {
    format!("{}::chunk{}", filename, ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_sentence_single_chunk() {
        let chunks = split_document("policy.md", "Returns are allowed within 30 days.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "policy.md::chunk0");
        assert_eq!(chunks[0].content, "Returns are allowed within 30 days.");
        assert_eq!(chunks[0].source, "policy.md");
    }

    #[test]
    fn test_splits_on_headings_and_blank_lines() {
        let text = "# Catalog\nIntro line.\n## Beverages\nTea and coffee.\n\nCondiments are sauces.";
        let chunks = split_document("catalog.md", text);
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "# Catalog\nIntro line.",
                "Beverages\nTea and coffee.",
                "Condiments are sauces."
            ]
        );
    }

    #[test]
    fn test_empty_pieces_keep_their_ordinal() {
        let text = "First.\n\n\n\nSecond.";
        let chunks = split_document("a.md", text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "a.md::chunk0");
        // "\n\n\n\n" yields an empty piece between the two paragraphs
        assert_eq!(chunks[1].id, "a.md::chunk2");
    }

    #[test]
    fn test_whitespace_only_document_has_no_chunks() {
        assert!(split_document("blank.md", "  \n\n \n").is_empty());
        assert!(split_document("empty.md", "").is_empty());
    }

    #[test]
    fn test_level_four_heading_is_not_a_boundary() {
        let chunks = split_document("kpi.md", "AOV\n#### Detail\nSum over orders.");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n# Gamma\nDelta";
        let c1 = split_document("doc.md", text);
        let c2 = split_document("doc.md", text);
        assert_eq!(c1, c2);
    }
}
