//! Configuration system for taskmill.
//!
//! One YAML file (./.taskmill.yml or ~/.config/taskmill/taskmill.yml) with
//! global sections plus per-plugin overrides layered onto the built-in
//! plugin registrations.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::{CacheConfig, GlobalConfig, SchedulerConfig};
pub use self::overrides::PluginOverrides;

mod global;
mod overrides;

/// Load and validate configuration from the standard search paths.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. .taskmill.yml in current directory (project config)
/// 3. ~/.config/taskmill/taskmill.yml (user config)
/// 4. Default values
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<GlobalConfig> {
    let config = GlobalConfig::load(explicit_path)?;
    config.validate()?;
    Ok(config)
}
