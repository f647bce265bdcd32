use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

const CONFIG_FILE: &str = "config.toml";
const PREFERENCES_FILE: &str = "preferences.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub audio: AudioConfig,
    pub preferences: PreferencesConfig,
    /// Directory the config was read from (or would have been).
    #[serde(skip)]
    pub dir: PathBuf,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the Supabase project holding the `exercises` table.
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Local JSON catalog, used instead of `url` when set.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub buffer_size: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 48000,
            buffer_size: 512,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    pub path: Option<PathBuf>,
}

impl Config {
    /// Preference file: explicit path, else next to the config file.
    pub fn preferences_path(&self) -> PathBuf {
        self.preferences
            .path
            .clone()
            .unwrap_or_else(|| self.dir.join(PREFERENCES_FILE))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("KEYLAB_CATALOG_URL").filter(|v| !v.is_empty()) {
            self.catalog.url = Some(url);
        }
        if let Some(key) = var("KEYLAB_CATALOG_KEY").filter(|v| !v.is_empty()) {
            self.catalog.api_key = Some(key);
        }
    }
}

/// `$XDG_CONFIG_HOME/keylab`, else `$HOME/.config/keylab`, else the working directory.
pub fn default_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg).join("keylab");
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".config").join("keylab");
    }
    PathBuf::from(".")
}

/// Load config from `path`, or from the default location when `None`.
/// A missing file yields defaults; environment overrides are applied last.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_dir().join(CONFIG_FILE),
    };
    let mut config = read(&path)?;
    config.apply_env(|name| std::env::var(name).ok());
    Ok(config)
}

fn read(path: &Path) -> anyhow::Result<Config> {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config {
            dir,
            ..Config::default()
        });
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut config: Config =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    config.dir = dir;
    Ok(config)
}
