//! CLI command definitions using clap.
//!
//! - parse: extract tasks from files, directories or globs
//! - config: print the resolved configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use taskmill::context::ParsePriority;
use taskmill::domain::PluginType;

/// taskmill - extract and schedule tasks from markdown notes
#[derive(Parser, Debug)]
#[command(name = "taskmill")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract tasks from documents
    Parse {
        /// Files, directories or glob patterns
        #[arg(required = true)]
        paths: Vec<String>,

        /// Force a plugin instead of choosing by file extension
        #[arg(short, long)]
        plugin: Option<PluginType>,

        /// Scheduling priority (high, normal, low)
        #[arg(long, default_value = "normal")]
        priority: ParsePriority,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["taskmill"]).is_err());
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["taskmill", "-c", "/path/to/taskmill.yml", "config"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/taskmill.yml")));
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["taskmill", "parse", "notes/*.md"]).unwrap();
        match cli.command {
            Commands::Parse {
                paths,
                plugin,
                priority,
                json,
            } => {
                assert_eq!(paths, vec!["notes/*.md".to_string()]);
                assert!(plugin.is_none());
                assert_eq!(priority, ParsePriority::Normal);
                assert!(!json);
            }
            _ => panic!("Expected parse command"),
        }
    }

    #[test]
    fn test_parse_with_options() {
        let cli = Cli::try_parse_from([
            "taskmill", "-v", "parse", "a.md", "b.canvas", "--plugin", "canvas", "--priority", "high", "--json",
        ])
        .unwrap();
        assert!(cli.is_verbose());
        match cli.command {
            Commands::Parse {
                paths,
                plugin,
                priority,
                json,
            } => {
                assert_eq!(paths.len(), 2);
                assert_eq!(plugin, Some(PluginType::Canvas));
                assert_eq!(priority, ParsePriority::High);
                assert!(json);
            }
            _ => panic!("Expected parse command"),
        }
    }

    #[test]
    fn test_parse_requires_paths() {
        assert!(Cli::try_parse_from(["taskmill", "parse"]).is_err());
    }

    #[test]
    fn test_unknown_plugin_rejected() {
        assert!(Cli::try_parse_from(["taskmill", "parse", "a.md", "--plugin", "pdf"]).is_err());
    }
}
