//! Light/dark preference with pluggable persistence.

use crate::error::ThemeError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub trait ThemePersistence {
    /// The stored preference, `None` when nothing was saved yet.
    fn load(&self) -> Result<Option<bool>, ThemeError>;
    fn save(&mut self, dark: bool) -> Result<(), ThemeError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ThemeFile {
    dark: bool,
}

/// JSON file holding `{"dark": bool}`.
#[derive(Debug, Clone)]
pub struct FileThemePersistence {
    path: PathBuf,
}

impl FileThemePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ThemePersistence for FileThemePersistence {
    fn load(&self) -> Result<Option<bool>, ThemeError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(serde_json::from_str::<ThemeFile>(&text)?.dark)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&mut self, dark: bool) -> Result<(), ThemeError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(&ThemeFile { dark })?)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryThemePersistence {
    pub stored: Option<bool>,
}

impl ThemePersistence for MemoryThemePersistence {
    fn load(&self) -> Result<Option<bool>, ThemeError> {
        Ok(self.stored)
    }

    fn save(&mut self, dark: bool) -> Result<(), ThemeError> {
        self.stored = Some(dark);
        Ok(())
    }
}

pub struct ThemeStore<P: ThemePersistence> {
    dark: bool,
    persistence: P,
}

impl<P: ThemePersistence> ThemeStore<P> {
    /// Start from the persisted flag, else `system_prefers_dark`. An unreadable
    /// store is logged and treated as empty.
    pub fn new(persistence: P, system_prefers_dark: bool) -> Self {
        let dark = match persistence.load() {
            Ok(stored) => stored.unwrap_or(system_prefers_dark),
            Err(err) => {
                warn!("ignoring stored theme: {err}");
                system_prefers_dark
            }
        };
        Self { dark, persistence }
    }

    pub fn is_dark(&self) -> bool {
        self.dark
    }

    pub fn set_dark(&mut self, dark: bool) -> Result<(), ThemeError> {
        self.dark = dark;
        self.persistence.save(dark)
    }

    pub fn toggle(&mut self) -> Result<bool, ThemeError> {
        self.set_dark(!self.dark)?;
        Ok(self.dark)
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }
}
