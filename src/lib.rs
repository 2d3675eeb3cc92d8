//! # Paper Intake
//!
//! Duplicate-aware document intake for research projects.
//!
//! Every upload is scored against the completed documents of its project
//! before it is stored. Near-certain duplicates are blocked, likely ones are
//! offered a replacement, and replacements are executed and verified against
//! the store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────────┐   ┌──────────┐
//! │ CLI/HTTP │──▶│ upload       │──▶│ IntakeService      │──▶│  SQLite  │
//! │          │   │ validate +   │   │ resolver, replace  │   │ (sqlx)   │
//! └──────────┘   │ extract text │   │ (paper-intake-core)│   └──────────┘
//!                └──────────────┘   └───────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! intake init
//! intake upload --project thesis ./chapter-2.pdf
//! intake serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite document store |
//! | [`extract`] | Text extraction from PDF, DOCX and plain text |
//! | [`upload`] | Upload validation |
//! | [`service`] | Check, commit and replace operations |
//! | [`server`] | HTTP server |
//! | [`reconcile`] | Repair after interrupted replacements |
//! | [`error`] | Error taxonomy |
//!
//! Scoring, resolution and replacement live in the `paper-intake-core`
//! crate.

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod get;
pub mod migrate;
pub mod reconcile;
pub mod server;
pub mod service;
pub mod sqlite_store;
pub mod upload;
pub mod upload_cmd;
