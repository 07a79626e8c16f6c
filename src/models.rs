//! Core data models used throughout the analyst pipeline.
//!
//! These types represent the question, the document chunks, the extracted
//! constraints and the query results that flow between the retrieval index,
//! the SQL gateway and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Expected shape of the final answer (`int`, `float`, `json`, `str`, or a
/// structural hint such as `{category:str, quantity:int}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatHint(String);

impl FormatHint {
    pub fn new(hint: impl Into<String>) -> Self {
        Self(hint.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FormatHint {
    fn default() -> Self {
        Self("str".to_string())
    }
}

impl fmt::Display for FormatHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable per-request input.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionContext {
    pub question: String,
    pub format_hint: FormatHint,
}

impl QuestionContext {
    pub fn new(question: impl Into<String>, format_hint: FormatHint) -> Self {
        Self {
            question: question.into(),
            format_hint,
        }
    }
}

/// Routing label for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Answerable from documentation alone.
    Rag,
    /// Answerable from the database alone.
    Sql,
    /// Needs definitions from the docs and numbers from the database.
    Hybrid,
}

impl Classification {
    /// Normalize a free-text label. `hybrid` wins over `sql`, which wins
    /// over the `rag` fallback.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.contains("hybrid") {
            Classification::Hybrid
        } else if label.contains("sql") {
            Classification::Sql
        } else {
            Classification::Rag
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Rag => "rag",
            Classification::Sql => "sql",
            Classification::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw document as read from the corpus directory.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Path relative to the corpus root; becomes the chunk ID prefix.
    pub filename: String,
    pub body: String,
}

/// A contiguous span of a source document; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentChunk {
    /// `<filename>::chunk<ordinal>`.
    pub id: String,
    pub content: String,
    pub source: String,
}

/// A chunk paired with its relevance score for one query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    #[serde(flatten)]
    pub chunk: DocumentChunk,
    pub score: f64,
}

/// Structured facts extracted from the docs to steer SQL generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    pub date_range_start: Option<String>,
    pub date_range_end: Option<String>,
    pub kpi_formula: Option<String>,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// One result row, keyed by column name in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Outcome of a single SQL execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub columns: Vec<String>,
    pub error: Option<String>,
}

impl QueryResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            columns: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// True when the execution produced a non-empty error message.
    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }
}

/// One line of batch output, also returned by `ask` and `POST /ask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub id: serde_json::Value,
    pub final_answer: serde_json::Value,
    pub sql: String,
    pub confidence: f64,
    pub explanation: String,
    pub citations: Vec<String>,
}

impl AnswerRecord {
    /// Zero-confidence record for a request that faulted entirely.
    pub fn failure(id: serde_json::Value, message: impl fmt::Display) -> Self {
        Self {
            id,
            final_answer: serde_json::Value::Null,
            sql: String::new(),
            confidence: 0.0,
            explanation: format!("Error: {}", message),
            citations: Vec::new(),
        }
    }
}
