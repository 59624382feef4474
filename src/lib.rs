//! # docpipe
//!
//! Batch analytics over CSV datasets backed by a document store.
//!
//! Each dataset pipeline loads a source file into a named collection
//! (replacing whatever it held), runs a fixed battery of declarative
//! aggregations against the store, and writes the results as a plain-text
//! run log. The telemetry dataset also exports its high-temperature
//! records as JSON.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │  CSV     │──▶│  Loader  │──▶│ DocumentStore│──▶│Aggregator│
//! │ utf-8 /  │   │ schema + │   │ SQLite / mem │   │ pipelines│
//! │ cp1252   │   │ encoding │   └──────────────┘   └────┬─────┘
//! └──────────┘   └──────────┘                           ▼
//!                                                 ┌──────────┐
//!                                                 │ Reporter │
//!                                                 │ log+JSON │
//!                                                 └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Typed values, documents, groups |
//! | [`schema`] | Per-dataset column typing and coercion |
//! | [`encoding`] | UTF-8 with Windows-1252 fallback |
//! | [`loader`] | Source file ingestion (full replace) |
//! | [`pipeline`] | Declarative aggregation pipelines |
//! | [`store`] | Document store trait and backends |
//! | [`aggregate`] | Runs analyses and derived metrics |
//! | [`report`] | Run log and JSON export |
//! | [`datasets`] | The telemetry and sales batteries |
//! | [`run`] | End-to-end orchestration |
//! | [`stats`] | Collection counts |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod aggregate;
pub mod config;
pub mod datasets;
pub mod db;
pub mod encoding;
pub mod error;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod run;
pub mod schema;
pub mod stats;
pub mod store;
