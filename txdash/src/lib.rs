//! Ingestion and aggregation engine for the card transaction dashboard.
//!
//! - `stream`: the scheduled producer that writes synthetic transactions
//! - `store`: the append-only SQLite table and its queries
//! - `query`: per-minute series, per-scheme stats and observed status codes
//! - `api`: axum routes exposing the read side as JSON
//! - `core`: configuration, shared state and errors

pub mod api;
pub mod core;
pub mod domain;
pub mod query;
pub mod store;
pub mod stream;
