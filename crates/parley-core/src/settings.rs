use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ParleyError;
use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::session::{DEFAULT_SERVER_URL, SessionConfig};

const SETTINGS_FILE: &str = "settings.json";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub last_room: Option<String>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Connection attempt timeout in seconds. Absent means no timeout.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_name: None,
            server_url: default_server_url(),
            last_room: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            connect_timeout_secs: None,
        }
    }
}

impl Settings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            server_url: self.server_url.clone(),
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Settings persisted as JSON in the client's data directory.
///
/// A missing or unreadable file yields defaults. Save failures are logged
/// and otherwise ignored; the in-memory value stays authoritative.
pub struct SettingsStore {
    settings: Mutex<Settings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let file_path = data_dir.as_ref().join(SETTINGS_FILE);
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn get(&self) -> Settings {
        self.lock().clone()
    }

    pub fn set_display_name(&self, name: Option<String>) {
        self.lock().display_name = name;
        self.save();
    }

    pub fn set_server_url(&self, url: String) {
        self.lock().server_url = url;
        self.save();
    }

    pub fn set_last_room(&self, room: Option<String>) {
        self.lock().last_room = room;
        self.save();
    }

    pub fn set_history_limit(&self, limit: usize) {
        self.lock().history_limit = limit;
        self.save();
    }

    pub fn set_connect_timeout_secs(&self, secs: Option<u64>) {
        self.lock().connect_timeout_secs = secs;
        self.save();
    }

    fn lock(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self) {
        if let Err(e) = self.try_save() {
            tracing::warn!("{e}");
        }
    }

    fn try_save(&self) -> Result<(), ParleyError> {
        let settings = self.get();
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ParleyError::Settings(format!("create {}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(&settings)
            .map_err(|e| ParleyError::Settings(format!("encode: {e}")))?;
        std::fs::write(&self.file_path, json)
            .map_err(|e| ParleyError::Settings(format!("write {}: {e}", self.file_path.display())))
    }

    fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring corrupt settings {}: {e}", path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert_eq!(s.display_name, None);
        assert_eq!(s.server_url, DEFAULT_SERVER_URL);
        assert_eq!(s.last_room, None);
        assert_eq!(s.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(s.session_config(), SessionConfig::default());
    }

    #[test]
    fn test_new_creates_defaults_when_no_file() {
        let dir = temp_dir();
        let store = SettingsStore::new(dir.path());
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn test_set_display_name_persists() {
        let dir = temp_dir();
        {
            let store = SettingsStore::new(dir.path());
            store.set_display_name(Some("Alice".to_string()));
        }
        let store = SettingsStore::new(dir.path());
        assert_eq!(store.get().display_name, Some("Alice".to_string()));
    }

    #[test]
    fn test_server_and_room_persist() {
        let dir = temp_dir();
        {
            let store = SettingsStore::new(dir.path());
            store.set_server_url("wss://chat.example.com/ws".to_string());
            store.set_last_room(Some("lobby".to_string()));
            store.set_history_limit(50);
        }
        let s = SettingsStore::new(dir.path()).get();
        assert_eq!(s.server_url, "wss://chat.example.com/ws");
        assert_eq!(s.last_room, Some("lobby".to_string()));
        assert_eq!(s.history_limit, 50);
    }

    #[test]
    fn test_connect_timeout_maps_to_session_config() {
        let dir = temp_dir();
        let store = SettingsStore::new(dir.path());
        store.set_connect_timeout_secs(Some(10));
        assert_eq!(
            store.get().session_config().connect_timeout,
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_save_creates_missing_dir() {
        let dir = temp_dir();
        let nested = dir.path().join("a").join("b");
        let store = SettingsStore::new(&nested);
        store.set_last_room(Some("lobby".to_string()));
        assert!(nested.join(SETTINGS_FILE).exists());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = temp_dir();
        fs::write(dir.path().join(SETTINGS_FILE), "not json!!!").unwrap();
        let store = SettingsStore::new(dir.path());
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn test_partial_json_uses_serde_defaults() {
        let dir = temp_dir();
        fs::write(dir.path().join(SETTINGS_FILE), r#"{"display_name":"Eve"}"#).unwrap();
        let store = SettingsStore::new(dir.path());
        let s = store.get();
        assert_eq!(s.display_name, Some("Eve".to_string()));
        assert_eq!(s.server_url, DEFAULT_SERVER_URL);
        assert_eq!(s.history_limit, DEFAULT_HISTORY_LIMIT);
    }
}
