use std::path::{Path, PathBuf};

use anyhow::Context;

/// A scoped string key-value store for UI preferences.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Preferences kept as a flat TOML table on disk. Rewritten on every `set`.
///
/// Values are written as strings; hand-edited booleans read back as
/// `"true"`/`"false"`. A file that does not parse is left alone.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> anyhow::Result<toml::Table> {
        if !self.path.exists() {
            return Ok(toml::Table::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(match self.read()?.remove(key) {
            Some(toml::Value::String(value)) => Some(value),
            Some(toml::Value::Boolean(flag)) => Some(flag.to_string()),
            Some(other) => {
                log::warn!("Ignoring preference {key} = {other}");
                None
            }
            None => None,
        })
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut table = self.read()?;
        table.insert(key.to_string(), toml::Value::String(value.to_string()));
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, toml::to_string(&table)?)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

/// In-process store.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    values: std::collections::BTreeMap<String, String>,
}

#[cfg(test)]
impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Whether the lessons panel is open. Defaults to open; anything other
/// than `"false"` (including read errors) counts as open.
pub struct LessonsPanel<S> {
    store: S,
}

impl<S: PreferenceStore> LessonsPanel<S> {
    pub const KEY: &'static str = "lessons-open";

    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get(&self) -> bool {
        match self.store.get(Self::KEY) {
            Ok(value) => value.as_deref() != Some("false"),
            Err(e) => {
                log::warn!("Failed to read preferences: {e:#}");
                true
            }
        }
    }

    /// Persist the choice; failures are logged and otherwise ignored.
    pub fn set(&mut self, open: bool) {
        if let Err(e) = self.store.set(Self::KEY, if open { "true" } else { "false" }) {
            log::warn!("Failed to save preferences: {e:#}");
        }
    }
}
