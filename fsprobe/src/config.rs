//! File-backed defaults for the CLI. A TOML file at a path overridable by
//! an environment variable, every field defaulted so a missing or
//! unparsable file degrades to `Config::default()` rather than failing
//! startup.

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "/etc/fsprobe/fsprobe.toml";
const ENV_CONFIG_PATH: &str = "FSPROBE_CONFIG";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_dentry_resolution_mode")]
    pub dentry_resolution_mode: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default = "default_true")]
    pub paths_filtering: bool,
    #[serde(default = "default_true")]
    pub follow: bool,
    /// `None` means "no explicit event set configured"; the monitor (§4.6)
    /// then enables every event kind except `Modify`.
    #[serde(default)]
    pub events: Option<Vec<String>>,
    #[serde(default = "default_chan_size")]
    pub chan_size: usize,
    #[serde(default = "default_perf_buffer_size")]
    pub perf_buffer_size: usize,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub output: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dentry_resolution_mode: default_dentry_resolution_mode(),
            recursive: default_true(),
            paths_filtering: default_true(),
            follow: default_true(),
            events: None,
            chan_size: default_chan_size(),
            perf_buffer_size: default_perf_buffer_size(),
            format: default_format(),
            output: None,
        }
    }
}

fn default_dentry_resolution_mode() -> String {
    "perf_buffer".to_string()
}

fn default_true() -> bool {
    true
}

fn default_chan_size() -> usize {
    1000
}

fn default_perf_buffer_size() -> usize {
    128
}

fn default_format() -> String {
    "table".to_string()
}

impl Config {
    /// Loads configuration from file. The path can be overridden with the
    /// `FSPROBE_CONFIG` environment variable. If the file is missing or
    /// fails to parse, defaults are returned.
    pub fn load() -> Self {
        let path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = PathBuf::from(path);
        match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
            Err(_) => Config::default(),
        }
    }
}
