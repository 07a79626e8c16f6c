//! `analyst schema` and `analyst sql`: look at the database the pipeline
//! queries, through the same gateway.

use anyhow::Result;

use crate::config::Config;
use crate::gateway::SqlGateway;

pub async fn run_schema(config: &Config, tables: &[String]) -> Result<()> {
    let gateway = SqlGateway::new(&config.db.path);
    let filter = if tables.is_empty() {
        None
    } else {
        Some(tables)
    };
    let schema = gateway.schema(filter).await?;
    if schema.is_empty() {
        println!("No tables.");
    } else {
        println!("{}", schema);
    }
    Ok(())
}

/// Prints the `QueryResult` as JSON. A failed statement is still printed
/// (with `error` set) and reported as a command failure.
pub async fn run_sql(config: &Config, sql: &str) -> Result<()> {
    let gateway = SqlGateway::new(&config.db.path);
    let result = gateway.execute(sql).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(error) = result.error.as_deref().filter(|e| !e.is_empty()) {
        anyhow::bail!("query failed: {}", error);
    }
    Ok(())
}
