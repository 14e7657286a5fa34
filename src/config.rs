//! Run and selector settings.
//!
//! Both are plain serde structs with defaults for every field, so a JSON file
//! only needs to name what it overrides.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::error::Result;
use crate::rank::{RankPolicy, Significance};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub lag_order: usize,
    pub significance: Significance,
    pub policy: RankPolicy,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            lag_order: 1,
            significance: Significance::NinetyFive,
            policy: RankPolicy::LastMatch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub data_path: PathBuf,
    pub init_cash: f64,
    pub commission: f64,
    pub margin: Option<f64>,
    pub log_root: PathBuf,
    pub log_prefix: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::new(),
            init_cash: 100_000.0,
            commission: 0.0,
            margin: None,
            log_root: PathBuf::from("../backtests"),
            log_prefix: None,
        }
    }
}

impl RunConfig {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            ..Self::default()
        }
    }

    /// Data path with both kinds of separators replaced by `-`.
    pub fn feed_name(&self) -> String {
        self.data_path
            .to_string_lossy()
            .replace(['/', '\\'], "-")
    }

    /// `{log_root}/[{prefix}_]{strategy}_{feed}_{timestamp}`
    pub fn log_path(&self, strategy: &str, now: NaiveDateTime) -> PathBuf {
        let stamp = now.format("%Y-%m-%dT%H:%M:%S%.6f");
        let dir = match &self.log_prefix {
            Some(prefix) => format!("{prefix}_{strategy}_{}_{stamp}", self.feed_name()),
            None => format!("{strategy}_{}_{stamp}", self.feed_name()),
        };
        self.log_root.join(dir)
    }
}

/// Read a JSON settings file.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
