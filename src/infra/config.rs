use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Config files probed in the working directory, in priority order.
const CONFIG_FILES: [&str; 4] =
    ["argthread.toml", "argthread.yaml", "argthread.json", ".argthread.toml"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Glob patterns skipped while loading `dir/...` targets (in addition to .gitignore)
    pub ignore_patterns: Vec<String>,

    /// Skip a parameter/argument that is already present
    pub skip_exists: bool,

    /// Only files whose path matches are written or printed
    pub package_regexp: String,

    /// Load `_test.go` files (needed when a library is analyzed through its tests)
    pub include_tests: bool,

    /// Load imported packages that live inside the same module
    pub load_dependencies: bool,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            ignore_patterns: vec!["vendor/**".to_string(), "vendor".to_string()],
            skip_exists: true,
            package_regexp: ".*".to_string(),
            include_tests: true,
            load_dependencies: true,
        }
    }
}

/// Load configuration from the first config file found (or `explicit`) plus
/// `ARGTHREAD_*` environment variables.
pub fn load_config(explicit: Option<&Path>) -> Result<Config>
{
    let mut builder = config::Config::builder();

    if let Some(path) = explicit
    {
        builder = builder.add_source(config::File::from(path).required(true));
    }
    else
    {
        for path in &CONFIG_FILES
        {
            if Path::new(path).exists()
            {
                builder = builder.add_source(config::File::with_name(path));
                break;
            }
        }
    }

    // ARGTHREAD_SKIP_EXISTS=false, ARGTHREAD_PACKAGE_REGEXP=...
    builder = builder.add_source(
        config::Environment::with_prefix("ARGTHREAD")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("failed to parse configuration")?;

    Ok(parsed)
}
