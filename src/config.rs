use crate::bg3::{BundlePaths, GamePaths};
use anyhow::{Context as _, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Remembered between runs so the game does not have to be located again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub game_root: Option<PathBuf>,
    #[serde(default)]
    pub larian_dir: Option<PathBuf>,
    #[serde(skip)]
    path: PathBuf,
}

impl ToolConfig {
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_in(&base_data_dir()?)
    }

    pub fn load_or_create_in(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).context("create app data dir")?;
        let path = dir.join("config.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            match serde_json::from_str::<ToolConfig>(&raw) {
                Ok(mut config) => {
                    config.path = path;
                    return Ok(config);
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "discard unreadable config");
                }
            }
        }

        let config = ToolConfig {
            path,
            ..ToolConfig::default()
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(&self.path, raw).context("write app config")?;
        Ok(())
    }

    pub fn remember(&mut self, paths: &GamePaths) -> Result<()> {
        self.game_root = Some(paths.game_root.clone());
        self.larian_dir = Some(paths.larian_dir.clone());
        self.save()
    }
}

fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("bg3-modsharer"))
}

/// Everything an install or uninstall touches, resolved up front.
#[derive(Debug, Clone)]
pub struct Context {
    pub paths: GamePaths,
    pub bundle: BundlePaths,
}

impl Context {
    pub fn new(paths: GamePaths, bundle_root: &Path) -> Self {
        Self {
            paths,
            bundle: BundlePaths::new(bundle_root),
        }
    }
}
