use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use mirrorchat_widget::WidgetSettings;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

pub const SETTINGS_DIRECTORY_NAME: &str = "mirrorchat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "MIRRORCHAT_";
pub const CONFIG_PATH_ENV: &str = "MIRRORCHAT_CONFIG";
pub const DEFAULT_AGENT_DELAY_MS: u64 = 300;
pub const DEFAULT_ECHO_PREFIX: &str = "echo: ";
pub const DEFAULT_MAX_INPUT_CHARS: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliSettings {
    #[serde(default)]
    pub widget: WidgetSettings,
    /// Pause before the echo agent answers, to make the pending state visible.
    #[serde(default = "default_agent_delay_ms")]
    pub agent_delay_ms: u64,
    #[serde(default = "default_echo_prefix")]
    pub echo_prefix: String,
    /// Longer messages are marked as failed instead of answered.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            widget: WidgetSettings::default(),
            agent_delay_ms: default_agent_delay_ms(),
            echo_prefix: default_echo_prefix(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl CliSettings {
    pub fn normalized(mut self) -> Self {
        self.widget = self.widget.normalized();
        if self.max_input_chars == 0 {
            self.max_input_chars = default_max_input_chars();
        }
        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<CliSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".mirrorchat"))
    }

    /// `MIRRORCHAT_CONFIG` when set, otherwise the per-user config file.
    pub fn default_config_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::default_config_dir().join(SETTINGS_FILE_NAME))
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<CliSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: CliSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &Path) -> CliSettings {
        if !path.exists() {
            tracing::info!(path = %path.display(), "settings file not found, using defaults");
        }

        // Nested keys use a double underscore: MIRRORCHAT_WIDGET__COLLECTION=support.
        let figment = Figment::from(Serialized::defaults(CliSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"));

        match figment.extract::<CliSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "failed to parse settings, using defaults"
                );
                CliSettings::default()
            }
        }
    }

    /// Writes a sibling temp file and renames it over the config file.
    fn persist(&self, settings: &CliSettings) -> Result<(), SettingsError> {
        ensure!(
            !self.config_path.is_dir(),
            ConfigPathIsDirectorySnafu {
                stage: "check-mirrorchat-config-path",
                path: self.config_path.clone(),
            }
        );

        if let Some(parent) = self.config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateConfigDirSnafu {
                stage: "create-mirrorchat-config-dir",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(EncodeSettingsSnafu {
            stage: "encode-cli-settings",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteTempFileSnafu {
            stage: "write-mirrorchat-settings-temp",
            path: temp_path.clone(),
        })?;

        if let Err(source) = std::fs::rename(&temp_path, &self.config_path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(SettingsError::ReplaceConfig {
                stage: "replace-mirrorchat-settings",
                path: self.config_path.clone(),
                source,
            });
        }

        tracing::info!(
            path = %self.config_path.display(),
            collection = %settings.widget.collection,
            "saved chat settings"
        );
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("config path {path:?} is a directory; pass a settings file on `{stage}`"))]
    ConfigPathIsDirectory { stage: &'static str, path: PathBuf },
    #[snafu(display("cannot create config directory {path:?} on `{stage}`: {source}"))]
    CreateConfigDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot encode chat settings on `{stage}`: {source}"))]
    EncodeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("cannot write {path:?} on `{stage}`: {source}"))]
    WriteTempFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot replace settings file {path:?} on `{stage}`: {source}"))]
    ReplaceConfig {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

fn default_agent_delay_ms() -> u64 {
    DEFAULT_AGENT_DELAY_MS
}

fn default_echo_prefix() -> String {
    DEFAULT_ECHO_PREFIX.to_string()
}

fn default_max_input_chars() -> usize {
    DEFAULT_MAX_INPUT_CHARS
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let store = SettingsStore::new(PathBuf::from("absent.json"));
            assert_eq!(*store.settings(), CliSettings::default());
            Ok(())
        });
    }

    #[test]
    fn file_and_environment_layers_merge_over_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "settings.json",
                r#"{"widget": {"collection": " support "}, "echo_prefix": "bot: "}"#,
            )?;
            jail.set_env("MIRRORCHAT_AGENT_DELAY_MS", "5");
            jail.set_env("MIRRORCHAT_WIDGET__ORDER_KEY", "createdAt");

            let settings = SettingsStore::new(PathBuf::from("settings.json")).settings();
            assert_eq!(settings.widget.collection, "support");
            assert_eq!(settings.widget.order_key, "createdAt");
            assert_eq!(settings.widget.container_id, "chat-box");
            assert_eq!(settings.echo_prefix, "bot: ");
            assert_eq!(settings.agent_delay_ms, 5);
            Ok(())
        });
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("settings.json", r#"{"agent_delay_ms": "soon"}"#)?;
            let settings = SettingsStore::new(PathBuf::from("settings.json")).settings();
            assert_eq!(settings.agent_delay_ms, DEFAULT_AGENT_DELAY_MS);
            Ok(())
        });
    }

    #[test]
    fn update_persists_and_swaps_settings() {
        Jail::expect_with(|_jail| {
            let path = PathBuf::from("nested/settings.json");
            let store = SettingsStore::new(path.clone());
            let mut settings = (*store.settings()).clone();
            settings.echo_prefix = "re: ".to_string();
            settings.max_input_chars = 0;

            store.update(settings).map_err(|error| error.to_string())?;

            assert_eq!(store.settings().echo_prefix, "re: ");
            assert_eq!(store.settings().max_input_chars, DEFAULT_MAX_INPUT_CHARS);
            let reloaded = SettingsStore::new(path).settings();
            assert_eq!(reloaded.echo_prefix, "re: ");
            assert!(!PathBuf::from("nested/settings.json.tmp").exists());
            Ok(())
        });
    }

    #[test]
    fn saving_to_a_directory_is_rejected_and_keeps_settings() {
        Jail::expect_with(|_jail| {
            std::fs::create_dir("chat-config").map_err(|error| error.to_string())?;
            let store = SettingsStore::new(PathBuf::from("chat-config"));
            let mut settings = (*store.settings()).clone();
            settings.echo_prefix = "re: ".to_string();

            let error = store.update(settings).unwrap_err();

            assert!(matches!(error, SettingsError::ConfigPathIsDirectory { .. }));
            assert!(error.to_string().contains("is a directory"));
            assert_eq!(store.settings().echo_prefix, DEFAULT_ECHO_PREFIX);
            assert!(!PathBuf::from("chat-config.json.tmp").exists());
            Ok(())
        });
    }
}
