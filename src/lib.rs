//! Feature tree engine.
//!
//! A project's work is decomposed into a four-level tree
//! (epic → feature → sub-feature → task). The engine keeps sibling order,
//! rolls statuses up to ancestors, soft-deletes and restores nodes, creates
//! whole subtrees from placeholder-linked batches, searches with ancestor
//! context, and exports/imports trees as JSON, outline text or CSV.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod serialize;

pub use error::{BulkCreateError, TreeError, TreeResult};
