//! taskmill - markdown task extraction behind a scheduled plugin pipeline
//!
//! Documents are parsed by plugins (markdown checkboxes, canvas text nodes)
//! that run under a scheduler with priority queueing, per-plugin circuit
//! breakers, retries and fallback routing. Results are cached per document
//! generation.

pub mod cache;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod extract;
pub mod id;
pub mod plugin;
pub mod scheduler;

pub use error::{ParseError, Result, TaskmillError};
