//! Careline - hospital readmission risk service
//!
//! A deterministic, rule-based readmission risk scorer, LLM-phrased care
//! recommendations with a static fallback, and tenant-scoped patient
//! records on redb, served over an axum HTTP API.

pub mod ai;
pub mod cli;
pub mod config;
pub mod models;
pub mod scoring;
pub mod server;
pub mod store;
