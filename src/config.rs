use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result as AnyhowResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

pub const QUALIFIER: &str = "org";
pub const ORGANIZATION: &str = "Modkeeper";
pub const APPLICATION: &str = "Modkeeper";

const CONFIG_FILE: &str = "launcher.toml";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    /// Application version recorded by the last run that reached the main window.
    pub last_version: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub game_path: Option<PathBuf>,
    pub user_path: Option<PathBuf>,
}

impl GeneralConfig {
    /// `"."` is how the file spells "no override".
    pub fn user_path(&self) -> Option<&Path> {
        self.user_path.as_deref().filter(|p| *p != Path::new("."))
    }
}

impl AppConfig {
    pub fn load_from(config_path: &Path) -> Self {
        match fs::read_to_string(config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Ignoring invalid config {}: {}", config_path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, config_path: &Path) -> AnyhowResult<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(config_path, contents)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        Ok(())
    }

    /// Whether the recorded version matches `current`. A fresh install counts as the same.
    pub fn same_version(&self, current: &str) -> bool {
        self.last_version.as_deref().is_none_or(|v| v == current)
    }
}

pub fn get_config_path() -> Option<PathBuf> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .map(|proj_dirs| proj_dirs.config_dir().join(CONFIG_FILE))
}
