//! End-to-end tests of the `analyst` binary with the prediction engine
//! disabled.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn analyst_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_analyst"))
}

async fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();
    let db_path = common::create_retail_db(&data_dir).await;

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("product_policy.md"),
        "# Returns & Policy\n- Perishables (Produce, Dairy): 3-7 days.\n- Beverages unopened: 14 days; opened: no returns.\n\n## Exceptions\nDamaged items are always refundable.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("kpi_definitions.md"),
        "# KPI Definitions\n## Average Order Value (AOV)\nAOV = SUM(UnitPrice * Quantity * (1 - Discount)) / COUNT(DISTINCT OrderID)",
    )
    .unwrap();
    fs::write(docs_dir.join("notes.txt"), "not indexed").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}"

[docs]
root = "{}"

[retrieval]
top_k = 3

[llm]
provider = "disabled"

[server]
bind = "127.0.0.1:7341"
"#,
        db_path.display(),
        docs_dir.display()
    );

    let config_path = config_dir.join("analyst.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_analyst(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = analyst_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("ANALYST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run analyst binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[tokio::test]
async fn test_schema_command() {
    let (_tmp, config) = setup_test_env().await;

    let (stdout, stderr, success) = run_analyst(&config, &["schema"]);
    assert!(success, "schema failed: {}", stderr);
    assert!(stdout.contains("CREATE TABLE Products"));
    assert!(stdout.contains("CREATE TABLE \"Order Details\""));

    let (stdout, _, success) = run_analyst(&config, &["schema", "--table", "Orders"]);
    assert!(success);
    assert!(stdout.contains("CREATE TABLE Orders"));
    assert!(!stdout.contains("Products"));
}

#[tokio::test]
async fn test_sql_command() {
    let (_tmp, config) = setup_test_env().await;

    let (stdout, stderr, success) =
        run_analyst(&config, &["sql", "SELECT COUNT(*) AS n FROM Products"]);
    assert!(success, "sql failed: {}", stderr);
    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["rows"][0]["n"], 3);
    assert_eq!(result["error"], serde_json::Value::Null);

    let (stdout, _, success) = run_analyst(&config, &["sql", "SELECT * FROM Nope"]);
    assert!(!success);
    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["error"], "no such table: Nope");
}

#[tokio::test]
async fn test_search_command() {
    let (_tmp, config) = setup_test_env().await;

    let (stdout, stderr, success) =
        run_analyst(&config, &["search", "beverages unopened returns", "--k", "1"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.starts_with("1. ["));
    assert!(stdout.contains("product_policy.md::chunk0"));
    assert!(!stdout.contains("2. ["));
    assert!(!stdout.contains("notes.txt"));
}

#[tokio::test]
async fn test_ask_command_emits_record() {
    let (_tmp, config) = setup_test_env().await;

    let (stdout, stderr, success) = run_analyst(
        &config,
        &["ask", "What is the AOV?", "--format-hint", "float", "--id", "aov-1"],
    );
    assert!(success, "ask failed: {}", stderr);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["id"], "aov-1");
    for key in ["final_answer", "sql", "confidence", "explanation", "citations"] {
        assert!(record.get(key).is_some(), "missing {}", key);
    }
    // no SQL could be generated, so the last execution failed
    assert_eq!(record["confidence"], 0.2);
}

#[tokio::test]
async fn test_ask_trace_includes_nodes() {
    let (_tmp, config) = setup_test_env().await;

    let (stdout, stderr, success) = run_analyst(&config, &["ask", "Top products?", "--trace"]);
    assert!(success, "ask failed: {}", stderr);
    let output: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let trace = output["state"]["trace"].as_array().unwrap();
    assert_eq!(trace[0], "router");
    assert_eq!(trace.last().unwrap(), "synthesizer");
    assert_eq!(output["state"]["classification"], "hybrid");
    assert_eq!(output["state"]["repair_count"], 2);
}

#[tokio::test]
async fn test_batch_writes_one_record_per_line() {
    let (tmp, config) = setup_test_env().await;

    let input = tmp.path().join("questions.jsonl");
    fs::write(
        &input,
        concat!(
            "{\"id\": \"rag_policy_beverages_return_days\", \"question\": \"Return window for unopened Beverages?\", \"format_hint\": \"int\"}\n",
            "\n",
            "this is not json\n",
            "{\"id\": \"missing_question\"}\n",
            "{\"id\": 4, \"question\": \"AOV in June 1997?\", \"format_hint\": \"float\"}\n",
        ),
    )
    .unwrap();
    let output = tmp.path().join("out/answers.jsonl");

    let (stdout, stderr, success) = run_analyst(
        &config,
        &[
            "batch",
            "--batch",
            input.to_str().unwrap(),
            "--out",
            output.to_str().unwrap(),
            "--jobs",
            "2",
            "--progress",
            "json",
        ],
    );
    assert!(success, "batch failed: {}", stderr);
    assert!(stdout.contains("questions: 4"));
    assert!(stderr.contains("\"event\":\"progress\""));

    let text = fs::read_to_string(&output).unwrap();
    let records: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 4);

    assert_eq!(records[0]["id"], "rag_policy_beverages_return_days");
    assert_eq!(records[1]["id"], serde_json::Value::Null);
    assert_eq!(records[1]["confidence"], 0.0);
    assert_eq!(records[2]["id"], "missing_question");
    assert_eq!(records[2]["confidence"], 0.0);
    assert!(records[2]["explanation"]
        .as_str()
        .unwrap()
        .starts_with("Error: "));
    assert_eq!(records[3]["id"], 4);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_analyst(&tmp.path().join("nope.toml"), &["schema"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
