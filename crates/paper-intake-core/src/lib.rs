//! # paper-intake core
//!
//! Runtime-free logic for the paper-intake upload pipeline: document models,
//! the [`store::DocumentStore`] abstraction, duplicate scoring, the duplicate
//! resolver and the replacement executor.
//!
//! This crate contains no tokio, sqlx, HTTP or filesystem dependencies. The
//! application crate supplies a concrete store and drives these functions
//! from its HTTP handlers and CLI commands.

pub mod models;
pub mod replace;
pub mod resolver;
pub mod similarity;
pub mod store;
