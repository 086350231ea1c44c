//! Client configuration: server URL, bearer tokens, and cache settings.
//!
//! Layout and load/save idiom carried over from the teacher's `config.rs`
//! (`ProjectDirs`-based config path, TOML on disk); the field set is
//! reworked for a mount-based cache client rather than a two-way sync daemon.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub server_url: Option<String>,
    pub server_name: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub cache_dir: Option<String>,
    pub cache_budget_bytes: Option<u64>,
}

impl Config {
    fn project_dirs() -> anyhow::Result<ProjectDirs> {
        ProjectDirs::from("com", "driftbox", "driftbox")
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        let proj_dirs = Self::project_dirs()?;
        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;
        set_dir_permissions(config_dir)?;
        Ok(config_dir.join("config.toml"))
    }

    /// Default cache directory when `--cache-dir` isn't given and none is saved.
    pub fn default_cache_dir() -> anyhow::Result<PathBuf> {
        let proj_dirs = Self::project_dirs()?;
        Ok(proj_dirs.cache_dir().to_path_buf())
    }

    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Config::default())
        }
    }

    /// Persist, then tighten permissions to 0600 since this file carries
    /// bearer tokens.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        set_file_permissions(&path)?;
        Ok(())
    }

    pub fn require_auth(&self) -> anyhow::Result<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("not logged in. Run: driftbox login"))
    }

    pub fn require_server(&self) -> anyhow::Result<&str> {
        self.server_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no server configured. Run: driftbox login --server <url>"))
    }

    pub fn cache_dir_or_default(&self) -> anyhow::Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Self::default_cache_dir(),
        }
    }
}

#[cfg(unix)]
fn set_file_permissions(path: &std::path::Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &std::path::Path) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &std::path::Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &std::path::Path) -> anyhow::Result<()> {
    Ok(())
}
