// src/config.rs
//! Application configuration: a TOML file with serde defaults for every
//! knob, so an empty or missing file still yields a runnable setup. The
//! path comes from SCOUT_CONFIG_PATH, falling back to `config/scout.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::controller::ControllerCfg;
use crate::process::PipelineCfg;
use crate::subscribe::SchedulerCfg;

pub const DEFAULT_CONFIG_PATH: &str = "config/scout.toml";
pub const ENV_CONFIG_PATH: &str = "SCOUT_CONFIG_PATH";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoutConfig {
    #[serde(default)]
    pub controller: ControllerSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub storage: StorageSection,
}

impl ScoutConfig {
    /// Load using the env path or the default location. A missing file is a
    /// default config; a malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)
                .with_context(|| format!("parsing config at {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading config at {}", path.display())),
        }
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn controller_cfg(&self) -> ControllerCfg {
        let c = &self.controller;
        ControllerCfg {
            source_timeout: Duration::from_secs(c.source_timeout_secs),
            outer_deadline: match c.outer_deadline_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            max_attempts: c.max_attempts,
            retry_base: Duration::from_millis(c.retry_base_ms),
            max_results_per_source: c.max_results_per_source,
        }
    }

    pub fn pipeline_cfg(&self) -> PipelineCfg {
        let p = &self.pipeline;
        PipelineCfg {
            scoring_gate: p.scoring_gate,
            min_score: p.min_score,
            permissive_titles: p.permissive_titles,
            score_overflow_head: p.score_overflow_head,
            summary_top_n: p.summary_top_n,
        }
    }

    pub fn scheduler_cfg(&self) -> SchedulerCfg {
        SchedulerCfg {
            tick: Duration::from_secs(self.scheduler.tick_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    pub source_timeout_secs: u64,
    /// 0 disables the outer deadline.
    pub outer_deadline_secs: u64,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub max_results_per_source: usize,
}

impl Default for ControllerSection {
    fn default() -> Self {
        let d = ControllerCfg::default();
        Self {
            source_timeout_secs: d.source_timeout.as_secs(),
            outer_deadline_secs: d.outer_deadline.map(|d| d.as_secs()).unwrap_or(0),
            max_attempts: d.max_attempts,
            retry_base_ms: d.retry_base.as_millis() as u64,
            max_results_per_source: d.max_results_per_source,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub scoring_gate: usize,
    pub min_score: u8,
    pub permissive_titles: bool,
    pub score_overflow_head: bool,
    pub summary_top_n: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let d = PipelineCfg::default();
        Self {
            scoring_gate: d.scoring_gate,
            min_score: d.min_score,
            permissive_titles: d.permissive_titles,
            score_overflow_head: d.score_overflow_head,
            summary_top_n: d.summary_top_n,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub tick_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self { tick_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Subscription store location. Empty string selects the in-memory
    /// store.
    pub path: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: "data/subscriptions.json".to_string(),
        }
    }
}
