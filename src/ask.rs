//! `analyst ask`: answer a single question from the command line.

use anyhow::Result;
use serde_json::{json, Value};

use crate::config::Config;
use crate::models::{FormatHint, QuestionContext};
use crate::pipeline::Orchestrator;

pub async fn run_ask(
    config: &Config,
    question: &str,
    format_hint: Option<String>,
    id: Option<String>,
    trace: bool,
) -> Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("question must not be empty");
    }

    let orchestrator = Orchestrator::from_config(config)?;
    let hint = format_hint.map(FormatHint::new).unwrap_or_default();
    let state = orchestrator
        .run(QuestionContext::new(question, hint))
        .await;

    let id = id
        .map(Value::String)
        .unwrap_or_else(|| Value::String(uuid::Uuid::new_v4().to_string()));
    let record = state.to_record(id);

    let output = if trace {
        json!({ "record": record, "state": state })
    } else {
        serde_json::to_value(&record)?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
