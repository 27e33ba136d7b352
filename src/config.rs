use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::MigrationError;

pub const DEFAULT_NUM_DAYS: u32 = 100;

/// Which legacy students a run copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionMode {
    /// Students created within the last `n` days.
    ByTime(u32),
    ByCourse(String),
    /// Every legacy student, inactive ones included.
    All,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScriptTarget {
    ByTime,
    ByCourse,
    All,
}

/// The config file as written by the operator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawConfig {
    pub workspace: PathBuf,
    #[serde(default = "default_preview")]
    pub preview: bool,
    #[serde(default)]
    pub target: Option<ScriptTarget>,
    #[serde(default = "default_num_days")]
    pub num_days: u32,
    #[serde(default)]
    pub course_id: String,
}

fn default_preview() -> bool {
    true
}

fn default_num_days() -> u32 {
    DEFAULT_NUM_DAYS
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub workspace: PathBuf,
    pub preview: bool,
    pub mode: SelectionMode,
}

impl RawConfig {
    pub fn resolve(self) -> Result<RunConfig, MigrationError> {
        let mode = match self.target {
            Some(ScriptTarget::ByTime) => SelectionMode::ByTime(self.num_days),
            Some(ScriptTarget::ByCourse) => {
                // Matched byte for byte; only an all-blank id is refused.
                if self.course_id.trim().is_empty() {
                    return Err(MigrationError::Configuration(
                        "target byCourse requires a non-empty courseId".into(),
                    ));
                }
                SelectionMode::ByCourse(self.course_id)
            }
            Some(ScriptTarget::All) => SelectionMode::All,
            None => {
                return Err(MigrationError::Configuration("no target selected".into()));
            }
        };
        Ok(RunConfig {
            workspace: self.workspace,
            preview: self.preview,
            mode,
        })
    }
}

pub fn parse_config(text: &str) -> anyhow::Result<RunConfig> {
    let raw: RawConfig = serde_json::from_str(text).context("config is invalid JSON")?;
    Ok(raw.resolve()?)
}

pub fn load_config(path: &Path) -> anyhow::Result<RunConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
    parse_config(&text)
        .with_context(|| format!("failed to load config {}", path.to_string_lossy()))
}
