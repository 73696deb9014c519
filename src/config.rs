use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::guard::Shortcut;
use crate::modality::{Modality, QuestionSet};
use crate::policy::DEFAULT_MAX_VIOLATIONS;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DurationsBySecs {
    pub mcq: u32,
    pub coding: u32,
    pub interview: u32,
}

impl DurationsBySecs {
    pub fn for_modality(&self, modality: Modality) -> u32 {
        match modality {
            Modality::Mcq => self.mcq,
            Modality::Coding => self.coding,
            Modality::Interview => self.interview,
        }
    }
}

impl Default for DurationsBySecs {
    fn default() -> Self {
        Self {
            mcq: 600,
            coding: 1800,
            interview: 900,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub max_violations: u32,
    pub monitor_interval_ms: u64,
    pub blocked_shortcuts: Vec<Shortcut>,
    pub default_total_secs: DurationsBySecs,
    pub interview_answer_secs: u32,
    pub shuffle_questions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_violations: DEFAULT_MAX_VIOLATIONS,
            monitor_interval_ms: 1000,
            blocked_shortcuts: crate::guard::default_blocked_shortcuts(),
            default_total_secs: DurationsBySecs::default(),
            interview_answer_secs: crate::modality::interview::DEFAULT_ANSWER_SECS,
            shuffle_questions: false,
        }
    }
}

impl Config {
    /// Build a validated session configuration. `total_secs` overrides the
    /// per-modality default.
    pub fn session_config(
        &self,
        questions: QuestionSet,
        total_secs: Option<u32>,
    ) -> Result<SessionConfig> {
        let total_seconds =
            total_secs.unwrap_or_else(|| self.default_total_secs.for_modality(questions.modality()));
        let config = SessionConfig {
            max_violations: self.max_violations,
            total_seconds,
            monitor_interval: Duration::from_millis(self.monitor_interval_ms),
            blocked_shortcuts: self.blocked_shortcuts.clone(),
            questions,
        };
        config.validate()?;
        Ok(config)
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "proctor") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("proctor_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), error = %err, "ignoring unreadable config")
                }
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
