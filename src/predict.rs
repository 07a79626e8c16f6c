//! Structured prediction ports.
//!
//! The orchestrator never talks to a model directly; it calls the four
//! capabilities of a [`StructuredPredictor`]. Every call returns a
//! `Result<_, PortError>` and the orchestrator decides the fallback, so an
//! implementation is free to fail loudly.
//!
//! | Port | Input | Output |
//! |------|-------|--------|
//! | [`classify`](StructuredPredictor::classify) | question | raw routing label |
//! | [`extract`](StructuredPredictor::extract) | question, docs context | [`ConstraintSet`] |
//! | [`generate`](StructuredPredictor::generate) | question, schema, constraints | [`SqlDraft`] |
//! | [`synthesize`](StructuredPredictor::synthesize) | question, SQL, rows, context, hint | [`Synthesis`] |

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{ConstraintSet, FormatHint};

/// Failure to obtain a well-formed prediction.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("prediction engine is disabled")]
    Disabled,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("prediction engine returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed prediction: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for PortError {
    fn from(err: reqwest::Error) -> Self {
        PortError::Transport(err.to_string())
    }
}

/// Inputs of the SQL generation port.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub question: &'a str,
    /// Concatenated `CREATE TABLE` statements.
    pub schema: &'a str,
    /// Constraint description, including repair feedback when present.
    pub constraints: &'a str,
}

/// Raw output of the SQL generation port.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlDraft {
    pub sql: Option<String>,
    pub explanation: Option<String>,
}

/// Inputs of the synthesis port.
#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub question: &'a str,
    pub sql: &'a str,
    /// Size-bounded rendering of the result rows.
    pub rows: &'a str,
    /// Retrieved chunks, each prefixed with its chunk ID.
    pub context: &'a str,
    pub format_hint: &'a FormatHint,
}

/// Final answer and the sources it cites.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub answer: Value,
    pub citations: Vec<String>,
}

#[async_trait]
pub trait StructuredPredictor: Send + Sync {
    /// Returns a free-text routing label (`rag`, `sql` or `hybrid`, possibly decorated).
    async fn classify(&self, question: &str) -> Result<String, PortError>;

    async fn extract(&self, question: &str, context: &str) -> Result<ConstraintSet, PortError>;

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<SqlDraft, PortError>;

    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Synthesis, PortError>;
}

/// A predictor that fails every call; used when `llm.provider = "disabled"`.
pub struct DisabledPredictor;

#[async_trait]
impl StructuredPredictor for DisabledPredictor {
    async fn classify(&self, _question: &str) -> Result<String, PortError> {
        Err(PortError::Disabled)
    }

    async fn extract(&self, _question: &str, _context: &str) -> Result<ConstraintSet, PortError> {
        Err(PortError::Disabled)
    }

    async fn generate(&self, _request: &GenerationRequest<'_>) -> Result<SqlDraft, PortError> {
        Err(PortError::Disabled)
    }

    async fn synthesize(&self, _request: &SynthesisRequest<'_>) -> Result<Synthesis, PortError> {
        Err(PortError::Disabled)
    }
}
