//! TOML configuration parsing and validation.
//!
//! Only `[db]` is mandatory. Every other section falls back to defaults that
//! reproduce the stock pipeline: top-3 retrieval, a repair budget of two and
//! the prediction engine disabled.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    #[serde(default = "default_docs_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            root: default_docs_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_docs_root() -> PathBuf {
    PathBuf::from("./docs")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

/// BM25 parameters and the number of chunks handed to the pipeline.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_k1")]
    pub k1: f64,
    #[serde(default = "default_b")]
    pub b: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            k1: default_k1(),
            b: default_b(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_k1() -> f64 {
    1.5
}
fn default_b() -> f64 {
    0.75
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Regeneration attempts allowed after the first SQL attempt.
    #[serde(default = "default_max_repairs")]
    pub max_repairs: u32,
    /// Rows shown to the synthesizer before the rest are summarized.
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_repairs: default_max_repairs(),
            max_result_rows: default_max_result_rows(),
        }
    }
}

fn default_max_repairs() -> u32 {
    2
}
fn default_max_result_rows() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub sql_demos: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            temperature: 0.0,
            sql_demos: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    2
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Endpoint root for the configured provider.
    pub fn base_url(&self) -> String {
        match (&self.base_url, self.provider.as_str()) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, "openai") => "https://api.openai.com".to_string(),
            (None, _) => "http://localhost:11434".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.k1 <= 0.0 {
        anyhow::bail!("retrieval.k1 must be > 0");
    }
    if !(0.0..=1.0).contains(&config.retrieval.b) {
        anyhow::bail!("retrieval.b must be in [0.0, 1.0]");
    }
    if config.pipeline.max_result_rows == 0 {
        anyhow::bail!("pipeline.max_result_rows must be >= 1");
    }

    match config.llm.provider.as_str() {
        "disabled" => {}
        "ollama" | "openai" => {
            if config.llm.model.is_none() {
                anyhow::bail!(
                    "llm.model must be specified when provider is '{}'",
                    config.llm.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"data/northwind.sqlite\"\n").unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.pipeline.max_repairs, 2);
        assert_eq!(config.pipeline.max_result_rows, 20);
        assert!(!config.llm.is_enabled());
        assert_eq!(config.docs.include_globs, vec!["**/*.md".to_string()]);
        assert_eq!(config.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let err = parse("[db]\npath = \"x\"\n[retrieval]\ntop_k = 0\n").unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = parse("[db]\npath = \"x\"\n[llm]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_enabled_provider_requires_model() {
        let err = parse("[db]\npath = \"x\"\n[llm]\nprovider = \"ollama\"\n").unwrap_err();
        assert!(err.to_string().contains("llm.model"));
    }

    #[test]
    fn test_base_url_defaults_per_provider() {
        let mut llm = LlmConfig {
            provider: "openai".to_string(),
            ..LlmConfig::default()
        };
        assert_eq!(llm.base_url(), "https://api.openai.com");
        llm.provider = "ollama".to_string();
        assert_eq!(llm.base_url(), "http://localhost:11434");
        llm.base_url = Some("http://gpu-box:11434/".to_string());
        assert_eq!(llm.base_url(), "http://gpu-box:11434");
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse(include_str!("../config/analyst.example.toml")).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(
            config.llm.sql_demos.as_deref(),
            Some(Path::new("./config/sql_demos.json"))
        );
    }
}
