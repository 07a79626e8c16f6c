//! Question-answering state machine.
//!
//! ```text
//!            ┌────────┐ rag/hybrid ┌───────────┐  rag   ┌─────────────┐
//!  question ─▶ Router ├───────────▶│ Retriever ├───────▶│ Synthesizer │──▶ answer
//!            └───┬────┘            └─────┬─────┘        └──────▲──────┘
//!                │ sql                   │ hybrid              │
//!                │                 ┌─────▼─────┐               │ synthesize
//!                │                 │  Planner  │               │
//!                │                 └─────┬─────┘        ┌──────┴──────┐
//!                │                 ┌─────▼────────┐     │ RepairCheck │
//!                └────────────────▶│ SqlGenerator ├──▶ Executor ─┘
//!                                  └─────▲────────┘     │ repair
//!                                        └──── Repair ◀─┘
//! ```
//!
//! Every port call has a local fallback, so [`Orchestrator::run`] cannot fail:
//! it always reaches the Synthesizer and returns a [`PipelineState`] holding
//! some answer. The repair check is the only loop guard; with a budget of
//! `max_repairs` the SQL is generated at most `max_repairs + 1` times.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

use crate::answer::coerce_answer;
use crate::config::Config;
use crate::corpus;
use crate::gateway::SqlGateway;
use crate::index::RankingIndex;
use crate::llm;
use crate::models::{
    AnswerRecord, Classification, ConstraintSet, QueryResult, QuestionContext, RetrievalResult,
    Row,
};
use crate::predict::{GenerationRequest, StructuredPredictor, SynthesisRequest};

/// Confidence reported when the path taken hit no SQL error.
pub const CONFIDENCE_HIGH: f64 = 0.8;
/// Confidence reported when the final SQL attempt still failed.
pub const CONFIDENCE_LOW: f64 = 0.2;

const EMPTY_RESULT_FEEDBACK: &str = "Invalid format or empty result";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Router,
    Retriever,
    Planner,
    SqlGenerator,
    Executor,
    Repair,
    Synthesizer,
}

/// Outcome of the repair check after each execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairDecision {
    Repair,
    Synthesize,
}

/// Tunables the state machine reads; taken from `[retrieval]` and `[pipeline]`.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub max_repairs: u32,
    pub max_result_rows: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            max_repairs: 2,
            max_result_rows: 20,
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_repairs: config.pipeline.max_repairs,
            max_result_rows: config.pipeline.max_result_rows,
        }
    }
}

/// Everything one request accumulates on its way through the machine.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub context: QuestionContext,
    pub classification: Option<Classification>,
    pub retrieved: Vec<RetrievalResult>,
    /// `None` when planning was skipped.
    pub constraints: Option<ConstraintSet>,
    /// Loaded on the first SQL generation.
    #[serde(skip)]
    pub schema: Option<String>,
    pub sql: String,
    pub explanation: Option<String>,
    pub result: QueryResult,
    pub final_answer: Value,
    pub citations: Vec<String>,
    pub repair_count: u32,
    pub repair_feedback: Option<String>,
    pub synthesis_failed: bool,
    /// Nodes in the order they ran.
    pub trace: Vec<Node>,
}

impl PipelineState {
    pub fn new(context: QuestionContext) -> Self {
        Self {
            context,
            classification: None,
            retrieved: Vec::new(),
            constraints: None,
            schema: None,
            sql: String::new(),
            explanation: None,
            result: QueryResult::default(),
            final_answer: Value::Null,
            citations: Vec::new(),
            repair_count: 0,
            repair_feedback: None,
            synthesis_failed: false,
            trace: Vec::new(),
        }
    }

    pub fn generation_attempts(&self) -> usize {
        self.trace
            .iter()
            .filter(|node| **node == Node::SqlGenerator)
            .count()
    }

    pub fn confidence(&self) -> f64 {
        if self.result.has_error() {
            CONFIDENCE_LOW
        } else {
            CONFIDENCE_HIGH
        }
    }

    pub fn to_record(&self, id: Value) -> AnswerRecord {
        let explanation = self.explanation.clone().unwrap_or_else(|| {
            match self.classification {
                Some(Classification::Rag) => "Answered from retrieved documentation.",
                Some(Classification::Sql) => "Answered from a database query.",
                Some(Classification::Hybrid) | None => {
                    "Answered from documentation constraints and a database query."
                }
            }
            .to_string()
        });

        AnswerRecord {
            id,
            final_answer: self.final_answer.clone(),
            sql: self.sql.clone(),
            confidence: self.confidence(),
            explanation,
            citations: self.citations.clone(),
        }
    }
}

/// Runs questions through retrieval, planning, SQL with repair, and synthesis.
///
/// Cheap to clone; all collaborators are shared read-only.
#[derive(Clone)]
pub struct Orchestrator {
    index: Arc<RankingIndex>,
    gateway: SqlGateway,
    predictor: Arc<dyn StructuredPredictor>,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        index: Arc<RankingIndex>,
        gateway: SqlGateway,
        predictor: Arc<dyn StructuredPredictor>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            index,
            gateway,
            predictor,
            settings,
        }
    }

    /// Wire the index, gateway and predictor described by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let index = corpus::build_index(config)?;
        let predictor = llm::create_predictor(&config.llm)?;
        Ok(Self::new(
            Arc::new(index),
            SqlGateway::new(&config.db.path),
            predictor,
            PipelineSettings::from(config),
        ))
    }

    pub fn index(&self) -> &RankingIndex {
        &self.index
    }

    pub fn gateway(&self) -> &SqlGateway {
        &self.gateway
    }

    /// Drive one question from Router to Synthesizer.
    pub async fn run(&self, context: QuestionContext) -> PipelineState {
        let span = tracing::info_span!("question", question = %context.question);
        async move {
            let mut state = PipelineState::new(context);
            let mut next = Some(Node::Router);
            while let Some(node) = next {
                state.trace.push(node);
                next = self.step(node, &mut state).await;
                tracing::debug!(?node, ?next, "transition");
            }
            tracing::info!(
                classification = ?state.classification,
                repairs = state.repair_count,
                sql_error = state.result.has_error(),
                "question answered"
            );
            state
        }
        .instrument(span)
        .await
    }

    async fn step(&self, node: Node, state: &mut PipelineState) -> Option<Node> {
        match node {
            Node::Router => Some(self.route(state).await),
            Node::Retriever => Some(self.retrieve(state)),
            Node::Planner => {
                self.plan(state).await;
                Some(Node::SqlGenerator)
            }
            Node::SqlGenerator => {
                self.generate_sql(state).await;
                Some(Node::Executor)
            }
            Node::Executor => {
                state.result = self.gateway.execute(&state.sql).await;
                match repair_decision(state, self.settings.max_repairs) {
                    RepairDecision::Repair => Some(Node::Repair),
                    RepairDecision::Synthesize => Some(Node::Synthesizer),
                }
            }
            Node::Repair => {
                apply_repair(state);
                Some(Node::SqlGenerator)
            }
            Node::Synthesizer => {
                self.synthesize(state).await;
                None
            }
        }
    }

    async fn route(&self, state: &mut PipelineState) -> Node {
        let classification = match self.predictor.classify(&state.context.question).await {
            Ok(label) => Classification::from_label(&label),
            Err(e) => {
                tracing::warn!(error = %e, "classification failed, defaulting to hybrid");
                Classification::Hybrid
            }
        };
        state.classification = Some(classification);
        after_router(classification)
    }

    fn retrieve(&self, state: &mut PipelineState) -> Node {
        state.retrieved = self
            .index
            .search(&state.context.question, self.settings.top_k);
        after_retriever(state.classification.unwrap_or(Classification::Hybrid))
    }

    async fn plan(&self, state: &mut PipelineState) {
        let context = state
            .retrieved
            .iter()
            .map(|r| r.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let constraints = match self
            .predictor
            .extract(&state.context.question, &context)
            .await
        {
            Ok(raw) => normalize_constraints(raw),
            Err(e) => {
                tracing::warn!(error = %e, "constraint extraction failed, using empty constraints");
                ConstraintSet::default()
            }
        };
        state.constraints = Some(constraints);
    }

    async fn generate_sql(&self, state: &mut PipelineState) {
        if state.schema.is_none() {
            let schema = match self.gateway.schema(None).await {
                Ok(schema) => schema,
                Err(e) => {
                    tracing::warn!(error = %e, "schema introspection failed");
                    String::new()
                }
            };
            state.schema = Some(schema);
        }

        let mut constraints = constraints_description(state.constraints.as_ref());
        if let Some(feedback) = &state.repair_feedback {
            constraints = with_feedback(&constraints, feedback);
        }

        let request = GenerationRequest {
            question: &state.context.question,
            schema: state.schema.as_deref().unwrap_or_default(),
            constraints: &constraints,
        };

        match self.predictor.generate(&request).await {
            Ok(draft) => {
                state.sql = strip_code_fences(draft.sql.as_deref().unwrap_or_default());
                state.explanation = draft.explanation;
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt = state.repair_count, "sql generation failed");
                state.sql = String::new();
                state.explanation = None;
            }
        }
    }

    async fn synthesize(&self, state: &mut PipelineState) {
        let context = render_context(&state.retrieved);
        // rag-only paths never reach the executor and carry no result
        let rows = if state.trace.contains(&Node::Executor) {
            render_result(&state.result, self.settings.max_result_rows)
        } else {
            String::new()
        };

        let request = SynthesisRequest {
            question: &state.context.question,
            sql: &state.sql,
            rows: &rows,
            context: &context,
            format_hint: &state.context.format_hint,
        };

        match self.predictor.synthesize(&request).await {
            Ok(synthesis) => {
                state.final_answer = coerce_answer(synthesis.answer, &state.context.format_hint);
                state.citations = synthesis.citations;
            }
            Err(e) => {
                tracing::warn!(error = %e, "synthesis failed");
                state.final_answer = Value::String(format!("Synthesis failed: {}", e));
                state.citations = Vec::new();
                state.synthesis_failed = true;
            }
        }
    }
}

pub fn after_router(classification: Classification) -> Node {
    match classification {
        Classification::Rag | Classification::Hybrid => Node::Retriever,
        Classification::Sql => Node::SqlGenerator,
    }
}

pub fn after_retriever(classification: Classification) -> Node {
    match classification {
        Classification::Rag => Node::Synthesizer,
        Classification::Hybrid => Node::Planner,
        Classification::Sql => Node::SqlGenerator,
    }
}

/// Repair only on a non-empty error while budget remains. An empty result
/// set without an error goes straight to synthesis.
pub fn repair_decision(state: &PipelineState, max_repairs: u32) -> RepairDecision {
    if state.result.has_error() && state.repair_count < max_repairs {
        RepairDecision::Repair
    } else {
        RepairDecision::Synthesize
    }
}

pub fn apply_repair(state: &mut PipelineState) {
    state.repair_count += 1;
    let feedback = state
        .result
        .error
        .clone()
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| EMPTY_RESULT_FEEDBACK.to_string());
    state.repair_feedback = Some(feedback);
}

/// Remove markdown code fences a model may wrap around SQL.
pub fn strip_code_fences(raw: &str) -> String {
    raw.trim()
        .replace("```sql", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Text form of the constraints handed to the SQL generator.
pub fn constraints_description(constraints: Option<&ConstraintSet>) -> String {
    let Some(c) = constraints else {
        return "None".to_string();
    };
    let or_none = |v: &Option<String>| v.clone().unwrap_or_else(|| "None".to_string());
    let entities = if c.entities.is_empty() {
        "None".to_string()
    } else {
        c.entities.join(", ")
    };
    format!(
        "date_range_start: {}\ndate_range_end: {}\nkpi_formula: {}\nentities: {}",
        or_none(&c.date_range_start),
        or_none(&c.date_range_end),
        or_none(&c.kpi_formula),
        entities
    )
}

pub fn with_feedback(description: &str, feedback: &str) -> String {
    format!("{}\nPREVIOUS ERROR: {}. FIX THIS.", description, feedback)
}

/// Drop dates that are not `YYYY-MM-DD` and blank entities.
pub fn normalize_constraints(raw: ConstraintSet) -> ConstraintSet {
    let date = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| match NaiveDate::parse_from_str(v, "%Y-%m-%d") {
                Ok(_) => true,
                Err(_) => {
                    tracing::debug!(value = %v, "discarding non-ISO date constraint");
                    false
                }
            })
    };

    ConstraintSet {
        date_range_start: date(raw.date_range_start),
        date_range_end: date(raw.date_range_end),
        kpi_formula: raw
            .kpi_formula
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty()),
        entities: raw
            .entities
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect(),
    }
}

pub fn render_context(retrieved: &[RetrievalResult]) -> String {
    retrieved
        .iter()
        .map(|r| format!("[{}] {}", r.chunk.id, r.chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One JSON object per row, at most `max_rows` of them, followed by the
/// execution error when there is one.
pub fn render_result(result: &QueryResult, max_rows: usize) -> String {
    let mut out = render_rows(&result.rows, max_rows);
    if let Some(error) = result.error.as_deref().filter(|e| !e.is_empty()) {
        out.push_str(&format!("\nerror: {}", error));
    }
    out
}

pub fn render_rows(rows: &[Row], max_rows: usize) -> String {
    if rows.is_empty() {
        return "[]".to_string();
    }
    let mut lines: Vec<String> = rows
        .iter()
        .take(max_rows)
        .map(|row| serde_json::to_string(row).unwrap_or_default())
        .collect();
    if rows.len() > max_rows {
        lines.push(format!("... ({} more rows omitted)", rows.len() - max_rows));
    }
    lines.join("\n")
}
