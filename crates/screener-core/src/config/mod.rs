use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::capture::CommandCapture;
use crate::constants::{defaults, endpoints, models, prompts, storage};
use crate::error::{Result, ScreenerError};
use crate::llm::{ModelClient, OllamaClient};

/// Application settings, loaded once at startup. Runtime changes produce a
/// new `Settings` value instead of mutating a shared one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ollama: OllamaSettings,
    pub capture: CaptureSettings,
    pub storage: StorageSettings,
    pub ui: UiSettings,
    pub actions: Vec<ActionPreset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub ping_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Shell command with `{output}` and optional `{region}` placeholders.
    pub command: Option<String>,
    pub min_width: u32,
    pub min_height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub sessions_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub theme: String,
}

/// A named prompt offered as a quick action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPreset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub prompt: String,
}

impl ActionPreset {
    fn new(name: &str, description: &str, prompt: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            prompt: prompt.to_string(),
        }
    }
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: endpoints::OLLAMA_BASE_URL.to_string(),
            model: models::DEFAULT_MODEL.to_string(),
            timeout_secs: defaults::TIMEOUT_SECS,
            ping_timeout_secs: defaults::PING_TIMEOUT_SECS,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            command: None,
            min_width: defaults::MIN_SELECTION_WIDTH,
            min_height: defaults::MIN_SELECTION_HEIGHT,
        }
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            theme: defaults::THEME.to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama: OllamaSettings::default(),
            capture: CaptureSettings::default(),
            storage: StorageSettings::default(),
            ui: UiSettings::default(),
            actions: default_actions(),
        }
    }
}

pub fn default_actions() -> Vec<ActionPreset> {
    vec![
        ActionPreset::new("describe", "Describe the selection", prompts::DESCRIBE),
        ActionPreset::new("extract_text", "Extract visible text", prompts::EXTRACT_TEXT),
        ActionPreset::new("explain_code", "Explain code or terminal output", prompts::EXPLAIN_CODE),
        ActionPreset::new("translate", "Translate visible text to English", prompts::TRANSLATE),
    ]
}

fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(storage::APP_DIR)
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(storage::APP_DIR)
            .join(storage::CONFIG_FILE)
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Reads settings from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| toml::from_str::<Settings>(&content).map_err(|e| e.to_string()));
        match parsed {
            Ok(settings) => settings.validated(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ScreenerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replaces out-of-range values with defaults.
    fn validated(mut self) -> Self {
        if !defaults::THEMES.contains(&self.ui.theme.as_str()) {
            warn!(theme = %self.ui.theme, "Unknown theme, falling back to {}", defaults::THEME);
            self.ui.theme = defaults::THEME.to_string();
        }
        if self.ollama.timeout_secs == 0 {
            warn!("Ollama timeout of 0s is not usable, using {}s", defaults::TIMEOUT_SECS);
            self.ollama.timeout_secs = defaults::TIMEOUT_SECS;
        }
        if self.actions.is_empty() {
            self.actions = default_actions();
        }
        self
    }

    pub fn with_theme(&self, theme: &str) -> Result<Self> {
        if !defaults::THEMES.contains(&theme) {
            return Err(ScreenerError::Config(format!(
                "unknown theme '{}', expected one of: {}",
                theme,
                defaults::THEMES.join(", ")
            )));
        }
        let mut next = self.clone();
        next.ui.theme = theme.to_string();
        Ok(next)
    }

    pub fn with_model(&self, model: &str) -> Result<Self> {
        let model = model.trim();
        if model.is_empty() {
            return Err(ScreenerError::Config("model name is empty".into()));
        }
        let mut next = self.clone();
        next.ollama.model = model.to_string();
        Ok(next)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.storage
            .sessions_dir
            .clone()
            .unwrap_or_else(|| app_data_dir().join(storage::SESSIONS_DIR))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.storage
            .log_dir
            .clone()
            .unwrap_or_else(|| app_data_dir().join(storage::LOGS_DIR))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.timeout_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.ping_timeout_secs)
    }

    pub fn action(&self, name: &str) -> Option<&ActionPreset> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// The action used when no prompt or action name is given.
    pub fn default_action(&self) -> Option<&ActionPreset> {
        self.action(defaults::MANUAL_ACTION).or_else(|| self.actions.first())
    }

    pub fn build_model_client(&self) -> Arc<dyn ModelClient> {
        Arc::new(OllamaClient::from_settings(self))
    }

    /// Configured capture command, or the first screenshot tool found on `PATH`.
    pub fn build_capture_command(&self) -> Result<CommandCapture> {
        match &self.capture.command {
            Some(template) => Ok(CommandCapture::new(template.clone())),
            None => CommandCapture::detect().ok_or_else(|| {
                ScreenerError::Config(
                    "no screenshot tool found; set [capture].command or pass --image".into(),
                )
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.ollama.model, "gemma3:4b");
        assert_eq!(settings.ollama.timeout_secs, 180);
        assert_eq!(settings.ollama.ping_timeout_secs, 10);
        assert_eq!(settings.ui.theme, "dark");
        assert_eq!(settings.capture.min_width, 10);
        assert_eq!(settings.default_action().map(|a| a.name.as_str()), Some("describe"));
        assert_eq!(settings.actions.len(), 4);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ollama]\nmodel = \"llava:13b\"\n\n[ui]\ntheme = \"neon\"\n").unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.ollama.model, "llava:13b");
        assert_eq!(settings.ollama.base_url, "http://localhost:11434");
        assert_eq!(settings.ui.theme, "dark");
        assert_eq!(settings.actions.len(), 4);
    }

    #[test]
    fn test_unparsable_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
        assert_eq!(Settings::load_from(&dir.path().join("missing.toml")), Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut settings = Settings::default().with_theme("light").unwrap();
        settings.capture.command = Some("grim -g {region} {output}".into());
        settings.storage.sessions_dir = Some(dir.path().join("sessions"));
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn test_with_theme_and_model_replace_wholesale() {
        let settings = Settings::default();
        let next = settings.with_model(" llava ").unwrap();
        assert_eq!(next.ollama.model, "llava");
        assert_eq!(settings.ollama.model, "gemma3:4b");
        assert!(settings.with_theme("neon").is_err());
        assert!(settings.with_model("  ").is_err());
    }

    #[test]
    fn test_custom_actions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[[actions]]\nname = \"summarize\"\nprompt = \"Summarize this.\"\n",
        )
        .unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.actions.len(), 1);
        assert_eq!(settings.default_action().map(|a| a.name.as_str()), Some("summarize"));
        assert!(settings.action("describe").is_none());
    }
}
