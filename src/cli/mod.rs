//! CLI module for taskmill - command-line interface, file discovery and output.

pub mod batch;
pub mod commands;
pub mod files;
pub mod render;

pub use commands::Cli;
