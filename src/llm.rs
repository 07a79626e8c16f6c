//! Chat-model implementation of the structured prediction ports.
//!
//! [`ChatPredictor`] sends one chat request per port call to either an
//! Ollama server (`POST /api/chat`) or an OpenAI-compatible endpoint
//! (`POST /v1/chat/completions`), asks for a JSON object, and parses the
//! fields leniently.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, … capped at 2^5)
//! - other HTTP 4xx → fail immediately
//! - network errors → retry

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::ConstraintSet;
use crate::predict::{
    DisabledPredictor, GenerationRequest, PortError, SqlDraft, StructuredPredictor, Synthesis,
    SynthesisRequest,
};

const ROUTER_PROMPT: &str = "You route retail analytics questions. Reply with a JSON object \
{\"classification\": \"rag\" | \"sql\" | \"hybrid\"}.\n\
- rag: answerable from policy, calendar, catalog or other documentation text alone.\n\
- sql: needs aggregates, exact figures or order details from the database.\n\
- hybrid: needs definitions or date ranges from the documentation AND database figures.";

const PLANNER_PROMPT: &str = "You extract query constraints from a question and documentation \
excerpts. Reply with a JSON object with the keys \"date_range_start\" and \"date_range_end\" \
(YYYY-MM-DD or null), \"kpi_formula\" (the relevant formula text or null) and \"entities\" \
(a list of product, category or customer names, possibly empty).";

const SQL_PROMPT: &str = "You write SQLite queries. Reply with a JSON object \
{\"sql_query\": \"...\", \"explanation\": \"...\"}.\n\
Rules:\n\
- Use only tables and columns from the schema.\n\
- Quote table names containing spaces, e.g. \"Order Details\".\n\
- Filter dates with: WHERE OrderDate BETWEEN 'YYYY-MM-DD' AND 'YYYY-MM-DD'.\n\
- Return a single statement starting with SELECT.";

const SYNTHESIZER_PROMPT: &str = "You answer retail analytics questions from SQL results and \
documentation. Reply with a JSON object {\"final_answer\": ..., \"citations\": [...]}.\n\
- For format hint 'int' give only an integer; for 'float' only a number.\n\
- For a structured hint give a JSON value with exactly that shape.\n\
- Cite every table you relied on and every documentation chunk ID (the bracketed IDs).";

/// A worked text-to-SQL example appended to the generation prompt.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SqlDemo {
    pub question: String,
    #[serde(default)]
    pub constraints: String,
    pub sql_query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Ollama,
    OpenAi,
}

pub struct ChatPredictor {
    client: reqwest::Client,
    flavor: Flavor,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    max_retries: u32,
    demos: Vec<SqlDemo>,
}

impl ChatPredictor {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let flavor = match config.provider.as_str() {
            "ollama" => Flavor::Ollama,
            "openai" => Flavor::OpenAi,
            other => bail!("Unsupported chat provider: {}", other),
        };

        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for provider '{}'", config.provider))?;

        let api_key = match flavor {
            Flavor::OpenAi => Some(
                std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?,
            ),
            Flavor::Ollama => None,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let demos = config
            .sql_demos
            .as_deref()
            .map(load_demos)
            .unwrap_or_default();

        Ok(Self {
            client,
            flavor,
            base_url: config.base_url(),
            model,
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            demos,
        })
    }

    pub fn demos(&self) -> &[SqlDemo] {
        &self.demos
    }

    fn endpoint(&self) -> String {
        match self.flavor {
            Flavor::Ollama => format!("{}/api/chat", self.base_url),
            Flavor::OpenAi => format!("{}/v1/chat/completions", self.base_url),
        }
    }

    fn request_body(&self, system: &str, user: &str) -> Value {
        let messages = json!([
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ]);
        match self.flavor {
            Flavor::Ollama => json!({
                "model": self.model,
                "messages": messages,
                "stream": false,
                "format": "json",
                "options": { "temperature": self.temperature },
            }),
            Flavor::OpenAi => json!({
                "model": self.model,
                "messages": messages,
                "temperature": self.temperature,
                "response_format": { "type": "json_object" },
            }),
        }
    }

    /// One chat round-trip with retry; returns the assistant message text.
    async fn chat(&self, system: &str, user: &str) -> Result<String, PortError> {
        let body = self.request_body(system, user);
        let url = self.endpoint();
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: Value = response.json().await?;
                        return message_content(&json, self.flavor);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = PortError::Status {
                        status: status.as_u16(),
                        body: body_text,
                    };
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(attempt, %status, "chat request failed, retrying");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "chat request failed, retrying");
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err.unwrap_or_else(|| PortError::Transport("chat failed after retries".into())))
    }

    async fn chat_json(&self, system: &str, user: &str) -> Result<Value, PortError> {
        let text = self.chat(system, user).await?;
        extract_json_object(&text)
    }
}

#[async_trait]
impl StructuredPredictor for ChatPredictor {
    async fn classify(&self, question: &str) -> Result<String, PortError> {
        let text = self.chat(ROUTER_PROMPT, &format!("Question: {}", question)).await?;
        // The router matches substrings, so a bare label is as good as JSON.
        Ok(match extract_json_object(&text) {
            Ok(value) => field_string(&value, "classification").unwrap_or(text),
            Err(_) => text,
        })
    }

    async fn extract(&self, question: &str, context: &str) -> Result<ConstraintSet, PortError> {
        let user = format!("Question: {}\n\nDocumentation:\n{}", question, context);
        let value = self.chat_json(PLANNER_PROMPT, &user).await?;
        Ok(ConstraintSet {
            date_range_start: field_string(&value, "date_range_start"),
            date_range_end: field_string(&value, "date_range_end"),
            kpi_formula: field_string(&value, "kpi_formula"),
            entities: field_list(&value, "entities"),
        })
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<SqlDraft, PortError> {
        let user = generation_prompt(request, &self.demos);
        let value = self.chat_json(SQL_PROMPT, &user).await?;
        Ok(SqlDraft {
            sql: field_string(&value, "sql_query").or_else(|| field_string(&value, "sql")),
            explanation: field_string(&value, "explanation"),
        })
    }

    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Synthesis, PortError> {
        let user = format!(
            "Question: {}\nFormat hint: {}\n\nSQL:\n{}\n\nSQL result:\n{}\n\nDocumentation:\n{}",
            request.question,
            request.format_hint,
            if request.sql.is_empty() { "(none)" } else { request.sql },
            if request.rows.is_empty() { "(none)" } else { request.rows },
            if request.context.is_empty() { "(none)" } else { request.context },
        );
        let value = self.chat_json(SYNTHESIZER_PROMPT, &user).await?;
        let answer = value
            .get("final_answer")
            .cloned()
            .ok_or_else(|| PortError::Malformed("missing final_answer".into()))?;
        Ok(Synthesis {
            answer,
            citations: field_list(&value, "citations"),
        })
    }
}

/// Pick the predictor for the configured provider.
pub fn create_predictor(config: &LlmConfig) -> Result<Arc<dyn StructuredPredictor>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledPredictor)),
        "ollama" | "openai" => Ok(Arc::new(ChatPredictor::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// Load few-shot demos; an unreadable or invalid file is logged and skipped.
pub fn load_demos(path: &Path) -> Vec<SqlDemo> {
    let parsed = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|content| serde_json::from_str::<Vec<SqlDemo>>(&content).map_err(Into::into));
    match parsed {
        Ok(demos) => {
            tracing::info!(count = demos.len(), path = %path.display(), "loaded sql demos");
            demos
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not load sql demos");
            Vec::new()
        }
    }
}

fn generation_prompt(request: &GenerationRequest<'_>, demos: &[SqlDemo]) -> String {
    let mut prompt = String::new();
    for demo in demos {
        prompt.push_str(&format!(
            "Example question: {}\nExample constraints: {}\nExample sql_query: {}\n\n",
            demo.question,
            if demo.constraints.is_empty() { "None" } else { &demo.constraints },
            demo.sql_query
        ));
    }
    prompt.push_str(&format!(
        "Schema:\n{}\n\nConstraints:\n{}\n\nQuestion: {}",
        request.schema, request.constraints, request.question
    ));
    prompt
}

fn message_content(json: &Value, flavor: Flavor) -> Result<String, PortError> {
    let content = match flavor {
        Flavor::Ollama => json.pointer("/message/content"),
        Flavor::OpenAi => json.pointer("/choices/0/message/content"),
    };
    content
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PortError::Malformed("response has no message content".into()))
}

/// Locate and parse the outermost JSON object in a model reply.
pub fn extract_json_object(text: &str) -> Result<Value, PortError> {
    let start = text
        .find('{')
        .ok_or_else(|| PortError::Malformed("no JSON object in reply".into()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| PortError::Malformed("no closing brace in reply".into()))?;
    serde_json::from_str(&text[start..=end])
        .map_err(|e| PortError::Malformed(format!("JSON parse error: {}", e)))
}

/// A non-empty string field; `"none"`/`"null"` placeholders count as absent.
fn field_string(value: &Value, key: &str) -> Option<String> {
    let text = match value.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() || text.eq_ignore_ascii_case("none") || text.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(text)
    }
}

/// A list field given either as a JSON array or a comma-separated string.
fn field_list(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split(',')
            .map(|part| part.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object_with_chatter() {
        let text = "Sure! Here it is:\n{\"classification\": \"sql\"}\nHope that helps.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["classification"], "sql");
    }

    #[test]
    fn test_extract_json_object_rejects_plain_text() {
        assert!(matches!(
            extract_json_object("hybrid"),
            Err(PortError::Malformed(_))
        ));
        assert!(extract_json_object("} backwards {").is_err());
    }

    #[test]
    fn test_field_string_treats_placeholders_as_absent() {
        let value = json!({"a": "None", "b": " null ", "c": "", "d": "1997-06-01", "e": 3});
        assert_eq!(field_string(&value, "a"), None);
        assert_eq!(field_string(&value, "b"), None);
        assert_eq!(field_string(&value, "c"), None);
        assert_eq!(field_string(&value, "d").as_deref(), Some("1997-06-01"));
        assert_eq!(field_string(&value, "e").as_deref(), Some("3"));
        assert_eq!(field_string(&value, "missing"), None);
    }

    #[test]
    fn test_field_list_accepts_array_or_string() {
        let value = json!({
            "arr": ["Beverages", " Condiments ", ""],
            "text": "['Orders', \"Order Details\"]",
        });
        assert_eq!(field_list(&value, "arr"), vec!["Beverages", "Condiments"]);
        assert_eq!(field_list(&value, "text"), vec!["Orders", "Order Details"]);
        assert!(field_list(&value, "missing").is_empty());
    }

    #[test]
    fn test_message_content_per_flavor() {
        let ollama = json!({"message": {"role": "assistant", "content": "{}"}});
        let openai = json!({"choices": [{"message": {"content": "{\"x\":1}"}}]});
        assert_eq!(message_content(&ollama, Flavor::Ollama).unwrap(), "{}");
        assert_eq!(message_content(&openai, Flavor::OpenAi).unwrap(), "{\"x\":1}");
        assert!(message_content(&openai, Flavor::Ollama).is_err());
    }

    #[test]
    fn test_generation_prompt_includes_demos_and_feedback() {
        let demos = vec![SqlDemo {
            question: "How many products are there?".to_string(),
            constraints: String::new(),
            sql_query: "SELECT COUNT(*) FROM Products;".to_string(),
        }];
        let request = GenerationRequest {
            question: "How many orders?",
            schema: "CREATE TABLE Orders (OrderID INTEGER);",
            constraints: "None\nPREVIOUS ERROR: no such table: Order. FIX THIS.",
        };
        let prompt = generation_prompt(&request, &demos);
        assert!(prompt.starts_with("Example question: How many products are there?"));
        assert!(prompt.contains("Example constraints: None"));
        assert!(prompt.contains("PREVIOUS ERROR: no such table: Order. FIX THIS."));
        assert!(prompt.ends_with("Question: How many orders?"));
    }

    #[test]
    fn test_load_demos_ignores_bad_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let bad = tmp.path().join("demos.json");
        std::fs::write(&bad, "not json").unwrap();
        assert!(load_demos(&bad).is_empty());
        assert!(load_demos(&tmp.path().join("missing.json")).is_empty());

        let good = tmp.path().join("good.json");
        std::fs::write(
            &good,
            r#"[{"question": "q", "sql_query": "SELECT 1;"}]"#,
        )
        .unwrap();
        let demos = load_demos(&good);
        assert_eq!(demos.len(), 1);
        assert_eq!(demos[0].constraints, "");
    }

    #[test]
    fn test_create_predictor_disabled() {
        let predictor = create_predictor(&LlmConfig::default());
        assert!(predictor.is_ok());
    }
}
