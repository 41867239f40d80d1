//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use sk_core::{RecoveryConfig, RecoveryPreset, SensitiveDataConfig};
use sk_store::StorageOptions;

/// Workspace-local config file name, looked up in the workspace root.
pub const WORKSPACE_CONFIG_FILE: &str = ".sk.toml";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding session files, the index and backups.
    pub sessions_dir: PathBuf,
    pub session: SessionSettings,
    pub recovery: RecoverySettings,
    pub filter: SensitiveDataConfig,
}

/// `[session]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub auto_save_interval_secs: u64,
    /// Oldest sessions beyond this count are deleted when a new one is created.
    pub max_sessions: usize,
    pub create_backups: bool,
    /// How many recent sessions restoration considers.
    pub max_candidates: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auto_save_interval_secs: 30,
            max_sessions: 50,
            create_backups: true,
            max_candidates: 10,
        }
    }
}

impl SessionSettings {
    pub const fn auto_save_interval(&self) -> Duration {
        Duration::from_secs(self.auto_save_interval_secs)
    }
}

/// `[recovery]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub preset: RecoveryPreset,
    pub auto_cleanup: bool,
    pub cleanup_age_secs: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            preset: RecoveryPreset::Normal,
            auto_cleanup: true,
            cleanup_age_secs: 24 * 60 * 60,
        }
    }
}

impl RecoverySettings {
    /// The preset's numbers with the cleanup overrides applied.
    pub const fn recovery_config(&self) -> RecoveryConfig {
        let mut config = self.preset.config();
        config.auto_cleanup = self.auto_cleanup;
        config.cleanup_age = Duration::from_secs(self.cleanup_age_secs);
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            sessions_dir: data_dir.join("sessions"),
            session: SessionSettings::default(),
            recovery: RecoverySettings::default(),
            filter: SensitiveDataConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::load_for_workspace(config_path, None)
    }

    /// Loads configuration for a workspace.
    ///
    /// Layers, later wins: defaults, the user `config.toml`, `config_path`,
    /// `<workspace_root>/.sk.toml`, then `SK_*` environment variables with
    /// `__` separating nested keys (`SK_SESSION__MAX_SESSIONS=5`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_for_workspace(
        config_path: Option<&Path>,
        workspace_root: Option<&Path>,
    ) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        if let Some(root) = workspace_root {
            figment = figment.merge(Toml::file(root.join(WORKSPACE_CONFIG_FILE)));
        }

        figment = figment.merge(Env::prefixed("SK_").split("__"));

        figment.extract()
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    pub const fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            create_backups: self.session.create_backups,
        }
    }
}

/// Returns the platform-specific config directory for sk.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("sk"))
}

/// Returns the platform-specific data directory for sk.
///
/// On Linux: `~/.local/share/sk`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("sk"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn default_sessions_dir_is_under_data_dir() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.sessions_dir(), data_dir.join("sessions"));
        assert_eq!(config.session.max_sessions, 50);
        assert_eq!(config.session.auto_save_interval(), Duration::from_secs(30));
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "sessions_dir = \"/tmp/sk-test\"\n[session]\nmax_sessions = 5\n[recovery]\npreset = \"strict\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.sessions_dir, PathBuf::from("/tmp/sk-test"));
        assert_eq!(config.session.max_sessions, 5);
        assert!(config.session.create_backups);
        assert_eq!(config.recovery.recovery_config().max_retries, 2);
    }

    #[test]
    fn workspace_file_overrides_explicit_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[session]\nmax_sessions = 5\nmax_candidates = 3\n").unwrap();
        let workspace = temp.path().join("proj");
        fs::create_dir(&workspace).unwrap();
        fs::write(
            workspace.join(WORKSPACE_CONFIG_FILE),
            "[session]\nmax_sessions = 7\n[filter]\npreserve_workspace_paths = true\n",
        )
        .unwrap();

        let config = Config::load_for_workspace(Some(&path), Some(&workspace)).unwrap();
        assert_eq!(config.session.max_sessions, 7);
        assert_eq!(config.session.max_candidates, 3);
        assert!(config.filter.preserve_workspace_paths);
        assert_eq!(config.filter.categories.len(), 6);
    }

    #[test]
    fn recovery_overrides_apply_to_preset() {
        let settings = RecoverySettings {
            preset: RecoveryPreset::Lenient,
            auto_cleanup: false,
            cleanup_age_secs: 60,
        };
        let config = settings.recovery_config();
        assert_eq!(config.max_retries, 5);
        assert!(!config.auto_cleanup);
        assert_eq!(config.cleanup_age, Duration::from_secs(60));
    }
}
