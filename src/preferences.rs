use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::PathBuf;

/// User preferences. Every field has a default, so a missing or unreadable
/// file always yields a fully-initialized record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Gates all narration; checked at speak time.
    pub screen_reader_enabled: bool,
    pub sidebar_open_default: bool,
    pub model_temperature: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            screen_reader_enabled: false,
            sidebar_open_default: true,
            model_temperature: 0.7,
        }
    }
}

/// Persistent preference store, read by every component and written only on
/// explicit user toggles. Storage failure is non-fatal: the store logs the
/// degradation once and keeps serving the in-memory snapshot for the rest of
/// the process lifetime.
pub struct PreferenceStore {
    current: RefCell<Preferences>,
    degraded: Cell<bool>,
    path: Option<PathBuf>,
}

impl PreferenceStore {
    /// Load from disk, falling back to defaults if the file is missing or
    /// invalid.
    pub fn load() -> Self {
        let path = Self::default_path();
        let current = match path.as_deref().map(fs::read_to_string) {
            Some(Ok(data)) => serde_json::from_str(&data).unwrap_or_else(|e| {
                log::warn!("Unreadable preferences, using defaults: {e}");
                Preferences::default()
            }),
            _ => Preferences::default(),
        };
        Self {
            current: RefCell::new(current),
            degraded: Cell::new(false),
            path,
        }
    }

    /// Directory: ~/.config/image-seek/
    fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("image-seek").join("preferences.json"))
    }

    pub fn get(&self) -> Preferences {
        self.current.borrow().clone()
    }

    /// Apply a mutation and return the new snapshot. The record is persisted
    /// before the in-memory value is replaced, so no reader ever observes a
    /// half-applied change.
    pub fn update(&self, mutate: impl FnOnce(&mut Preferences)) -> Preferences {
        let mut next = self.current.borrow().clone();
        mutate(&mut next);
        if !self.degraded.get() {
            if let Err(e) = self.persist(&next) {
                log::warn!("Preference storage unavailable, continuing in-memory only: {e}");
                self.degraded.set(true);
            }
        }
        *self.current.borrow_mut() = next.clone();
        next
    }

    /// Write to a temp file, then rename over the target, so a crash can
    /// never leave a half-written record behind.
    fn persist(&self, prefs: &Preferences) -> Result<(), Box<dyn std::error::Error>> {
        let path = self.path.as_deref().ok_or("no config directory")?;
        let dir = path.parent().ok_or("no config directory")?;
        fs::create_dir_all(dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(prefs)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Store with no backing file, for tests.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            current: RefCell::new(Preferences::default()),
            degraded: Cell::new(true),
            path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_fully_initialized() {
        let p = Preferences::default();
        assert!(!p.screen_reader_enabled);
        assert!(p.sidebar_open_default);
        assert!((p.model_temperature - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn corrupt_json_falls_back_to_defaults() {
        let parsed: Preferences =
            serde_json::from_str("{\"screen_reader_enabled\": true}").unwrap();
        assert!(parsed.screen_reader_enabled);
        // Missing fields filled in from defaults.
        assert!(parsed.sidebar_open_default);

        let bad: Result<Preferences, _> = serde_json::from_str("not json");
        assert!(bad.is_err());
    }

    #[test]
    fn update_returns_new_snapshot_even_without_storage() {
        let store = PreferenceStore::in_memory();
        let snapshot = store.update(|p| p.screen_reader_enabled = true);
        assert!(snapshot.screen_reader_enabled);
        assert!(store.get().screen_reader_enabled);
    }

    #[test]
    fn update_persists_and_round_trips() {
        let dir = std::env::temp_dir().join(format!("image-seek-test-{}", std::process::id()));
        let path = dir.join("preferences.json");
        let store = PreferenceStore {
            current: RefCell::new(Preferences::default()),
            degraded: Cell::new(false),
            path: Some(path.clone()),
        };
        store.update(|p| p.model_temperature = 0.3);

        let data = fs::read_to_string(&path).unwrap();
        let reloaded: Preferences = serde_json::from_str(&data).unwrap();
        assert!((reloaded.model_temperature - 0.3).abs() < f64::EPSILON);
        let _ = fs::remove_dir_all(&dir);
    }
}
