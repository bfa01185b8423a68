use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::constants;

const APPLICATION: &str = "piptube";
const PREFS_FILE: &str = "prefs.toml";

/// User preferences stored in `prefs.toml`. Every field is optional and falls
/// back to the embedded constants.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  pub refresh_cooldown_minutes: Option<u64>,
  pub cache_max_megabytes: Option<u64>,
  /// Player executable used for playback (default: `mpv`).
  pub player: Option<String>,
  pub search_page_size: Option<usize>,
}

impl Config {
  pub fn load() -> Self {
    project_dirs().map_or_else(Self::default, |dirs| Self::load_from(&dirs.config_dir().join(PREFS_FILE)))
  }

  /// Missing or malformed file ⇒ defaults.
  pub fn load_from(path: &Path) -> Self {
    std::fs::read_to_string(path).ok().and_then(|content| toml::from_str(&content).ok()).unwrap_or_default()
  }

  pub fn save(&self) -> Result<PathBuf> {
    let dirs = project_dirs().context("No home directory to store preferences in")?;
    let path = dirs.config_dir().join(PREFS_FILE);
    self.save_to(&path)?;
    Ok(path)
  }

  pub fn save_to(&self, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
      std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let content = toml::to_string(self).context("Failed to serialize preferences")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
  }

  pub fn refresh_cooldown(&self) -> Duration {
    self.refresh_cooldown_minutes.map_or_else(|| constants().refresh_cooldown(), |m| Duration::from_secs(m * 60))
  }

  pub fn cache_max_bytes(&self) -> u64 {
    self.cache_max_megabytes.map_or(constants().feed_cache_max_bytes, |mb| mb * 1024 * 1024)
  }

  pub fn player(&self) -> &str {
    self.player.as_deref().unwrap_or("mpv")
  }

  pub fn search_page_size(&self) -> usize {
    self.search_page_size.unwrap_or(constants().search_page_size).max(1)
  }
}

fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", APPLICATION)
}

/// Well-known on-disk locations. Falls back to the working directory when no
/// home directory can be determined.
#[derive(Debug, Clone)]
pub struct Paths {
  pub subscription_file: PathBuf,
  pub cache_dir: PathBuf,
  pub log_dir: PathBuf,
}

impl Paths {
  pub fn discover() -> Self {
    match project_dirs() {
      Some(dirs) => Self {
        subscription_file: dirs.config_dir().join("subscription.json"),
        cache_dir: dirs.cache_dir().to_path_buf(),
        log_dir: dirs.data_dir().join("logs"),
      },
      None => {
        let base = PathBuf::from(format!(".{APPLICATION}"));
        Self {
          subscription_file: base.join("subscription.json"),
          cache_dir: base.join("cache"),
          log_dir: base.join("logs"),
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_come_from_constants() {
    let config = Config::default();
    assert_eq!(config.refresh_cooldown(), Duration::from_secs(30 * 60));
    assert_eq!(config.cache_max_bytes(), 100 * 1024 * 1024);
    assert_eq!(config.player(), "mpv");
    assert_eq!(config.search_page_size(), constants().search_page_size);
  }

  #[test]
  fn overrides_parse_from_toml() {
    let config: Config = toml::from_str("refresh_cooldown_minutes = 5\ncache_max_megabytes = 1\nplayer = \"vlc\"").unwrap();
    assert_eq!(config.refresh_cooldown(), Duration::from_secs(300));
    assert_eq!(config.cache_max_bytes(), 1024 * 1024);
    assert_eq!(config.player(), "vlc");
  }

  #[test]
  fn saved_prefs_load_back() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested").join(PREFS_FILE);
    assert_eq!(Config::load_from(&path), Config::default());

    let config = Config { player: Some("vlc".into()), refresh_cooldown_minutes: Some(10), ..Config::default() };
    config.save_to(&path).unwrap();
    assert_eq!(Config::load_from(&path), config);

    std::fs::write(&path, "player = [").unwrap();
    assert_eq!(Config::load_from(&path), Config::default());
  }

  #[test]
  fn zero_page_size_is_clamped() {
    let config = Config { search_page_size: Some(0), ..Config::default() };
    assert_eq!(config.search_page_size(), 1);
  }
}
