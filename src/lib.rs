//! # Retail Analyst
//!
//! A hybrid question-answering engine for a retail database: questions are
//! answered from a documentation corpus (BM25 retrieval), from the SQLite
//! database (generated SQL with a bounded repair loop), or from both.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐
//! │ docs/*.md│──▶│ RankingIndex │──▶│             │
//! └──────────┘   └──────────────┘   │ Orchestrator│──▶ answer record
//! ┌──────────┐   ┌──────────────┐   │ (pipeline)  │
//! │  SQLite  │◀─▶│  SqlGateway  │◀─▶│             │
//! └──────────┘   └──────────────┘   └──────┬──────┘
//!                                          │ StructuredPredictor
//!                                    ┌─────▼─────┐
//!                                    │ Ollama /  │
//!                                    │ OpenAI    │
//!                                    └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! analyst schema                                  # inspect the database
//! analyst search "return window beverages"        # rank doc chunks
//! analyst ask "Top 3 products by revenue?" --format-hint "list[{product:str, revenue:float}]"
//! analyst batch --batch questions.jsonl --out answers.jsonl --jobs 4
//! analyst serve                                   # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Document splitting |
//! | [`corpus`] | Filesystem corpus loader |
//! | [`index`] | BM25 ranking index |
//! | [`gateway`] | SQLite introspection and execution |
//! | [`predict`] | Prediction port trait |
//! | [`llm`] | HTTP chat predictor (Ollama / OpenAI) |
//! | [`answer`] | Answer coercion to format hints |
//! | [`pipeline`] | Question-answering state machine |
//! | [`batch`] | JSON-lines batch runner |
//! | [`progress`] | Batch progress reporting |
//! | [`server`] | HTTP server |
//! | [`logging`] | Tracing setup |

pub mod answer;
pub mod ask;
pub mod batch;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod gateway;
pub mod index;
pub mod inspect;
pub mod llm;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod predict;
pub mod progress;
pub mod search;
pub mod server;
