//! Batch question answering over JSON lines.
//!
//! Input: one JSON object per line with `id`, `question` and an optional
//! `format_hint`. Output: one [`AnswerRecord`] per non-blank input line, in
//! input order. A line that cannot be parsed, or a question whose task
//! panics, still gets a zero-confidence record, so one bad question never
//! aborts the batch.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::models::{AnswerRecord, FormatHint, QuestionContext};
use crate::pipeline::Orchestrator;
use crate::progress::{BatchProgressEvent, BatchProgressReporter, ProgressMode};

#[derive(Debug, Clone, Deserialize)]
pub struct BatchQuestion {
    pub id: Value,
    pub question: String,
    #[serde(default)]
    pub format_hint: Option<FormatHint>,
}

impl BatchQuestion {
    pub fn context(&self) -> QuestionContext {
        QuestionContext::new(
            self.question.clone(),
            self.format_hint.clone().unwrap_or_default(),
        )
    }
}

/// Parse one input line. On failure returns the best-effort id (from the raw
/// JSON when it has one) and the reason.
pub fn parse_line(line: &str) -> Result<BatchQuestion, (Value, String)> {
    serde_json::from_str::<BatchQuestion>(line).map_err(|e| {
        let id = serde_json::from_str::<Value>(line)
            .ok()
            .and_then(|v| v.get("id").cloned())
            .unwrap_or(Value::Null);
        (id, format!("invalid input line: {}", e))
    })
}

/// Answer every non-blank line, at most `jobs` at a time.
pub async fn answer_lines(
    orchestrator: &Orchestrator,
    lines: &[String],
    jobs: usize,
    reporter: &dyn BatchProgressReporter,
) -> Vec<AnswerRecord> {
    let inputs: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    let total = inputs.len() as u64;
    reporter.report(BatchProgressEvent::Started { total });

    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));

    enum Pending {
        Running(Value, tokio::task::JoinHandle<AnswerRecord>),
        Done(AnswerRecord),
    }

    let mut pending = Vec::with_capacity(inputs.len());
    for line in inputs {
        match parse_line(line) {
            Ok(question) => {
                let orchestrator = orchestrator.clone();
                let semaphore = semaphore.clone();
                let id = question.id.clone();
                let handle = tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let state = orchestrator.run(question.context()).await;
                    state.to_record(question.id)
                });
                pending.push(Pending::Running(id, handle));
            }
            Err((id, reason)) => {
                tracing::warn!(%id, %reason, "skipping unparseable line");
                pending.push(Pending::Done(AnswerRecord::failure(id, reason)));
            }
        }
    }

    let mut records = Vec::with_capacity(pending.len());
    for (n, item) in pending.into_iter().enumerate() {
        let record = match item {
            Pending::Done(record) => record,
            Pending::Running(id, handle) => match handle.await {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(%id, error = %e, "question task failed");
                    AnswerRecord::failure(id, e)
                }
            },
        };
        records.push(record);
        reporter.report(BatchProgressEvent::Answered {
            n: n as u64 + 1,
            total,
        });
    }

    records
}

pub fn write_records(path: &Path, records: &[AnswerRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// CLI entry point for `analyst batch`.
pub async fn run_batch(
    config: &Config,
    input: &Path,
    output: &Path,
    jobs: usize,
    progress: ProgressMode,
) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read batch file: {}", input.display()))?;
    let lines: Vec<String> = content.lines().map(str::to_string).collect();

    let orchestrator = Orchestrator::from_config(config)?;
    let reporter = progress.reporter();
    let records = answer_lines(&orchestrator, &lines, jobs, reporter.as_ref()).await;

    write_records(output, &records)?;

    let failed = records.iter().filter(|r| r.confidence == 0.0).count();
    println!("batch {}", input.display());
    println!("  questions: {}", records.len());
    println!("  failed: {}", failed);
    println!("  written: {}", output.display());
    println!("ok");
    Ok(())
}
