//! Configuration types for the assistant.
//!
//! Loaded from `config.toml` (see [`crate::laila_dirs::config_file`]). Every
//! section is `#[serde(default)]`, so a partial or empty file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AssistantError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Hosted completion API.
    pub llm: LlmConfig,
    /// Shell execution boundary.
    pub shell: ShellConfig,
    /// Desktop automation scripts.
    pub automation: AutomationConfig,
    /// Wake-word listener and speech playback.
    pub voice: VoiceConfig,
    /// Step-up confirmation for high-risk commands.
    pub authorization: AuthorizationConfig,
    /// Video lookup for media commands.
    pub search: laila_search::SearchConfig,
    /// Where state and sessions are kept.
    pub storage: StorageConfig,
}

/// OpenAI-compatible completion API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API root, without the `/v1/...` suffix.
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_owned(),
            model: "gpt-4o-mini".to_owned(),
            api_key_env: "OPENAI_API_KEY".to_owned(),
            max_tokens: 1024,
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

/// Limits applied around shell execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Wall-clock limit per command.
    pub timeout_secs: u64,
    /// Captured output cap per stream, in bytes.
    pub max_output_bytes: usize,
    /// Displayed output cap, in characters.
    pub display_chars: usize,
    /// Spoken summary cap for ordinary commands.
    pub speak_chars: usize,
    /// Spoken summary cap for unrephrased system queries.
    pub info_speak_chars: usize,
    /// Cap on raw error text shown to the user.
    pub error_chars: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_output_bytes: 512 * 1024,
            display_chars: 2000,
            speak_chars: 150,
            info_speak_chars: 200,
            error_chars: 300,
        }
    }
}

/// Messaging automation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Application the messaging script drives.
    pub messaging_app: String,
    pub timeout_secs: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            messaging_app: "WhatsApp".to_owned(),
            timeout_secs: 30,
        }
    }
}

/// Wake-word listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Start listening when the chat starts.
    pub enabled: bool,
    /// Accepted spellings of the wake word as recognisers transcribe it.
    pub wake_words: Vec<String>,
    /// Minimum recogniser confidence for a wake match.
    pub min_confidence: f32,
    /// Delay before re-arming after a session ends.
    pub restart_delay_ms: u64,
    /// Poll interval while waiting for speech playback to finish.
    pub speaking_poll_ms: u64,
    /// Text-to-speech program; each utterance is a fresh process.
    pub tts_program: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wake_words: crate::voice::wake::DEFAULT_WAKE_WORDS
                .iter()
                .map(|w| (*w).to_owned())
                .collect(),
            min_confidence: 0.5,
            restart_delay_ms: 300,
            speaking_poll_ms: 250,
            tts_program: "say".to_owned(),
        }
    }
}

/// Step-up confirmation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Passphrase required on the last high-risk step. Empty blocks all
    /// high-risk commands.
    pub passphrase: String,
}

/// Persistence locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data root; `None` uses [`crate::laila_dirs::data_dir`].
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(crate::laila_dirs::data_dir)
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir().join("state.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir().join("sessions")
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AssistantError::Config(e.to_string()))
    }

    /// Load from `path` when it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AssistantError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::laila_dirs::config_file()
    }

    /// Reject values that would make the assistant misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.shell.timeout_secs == 0 {
            return Err(AssistantError::Config(
                "shell.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.automation.timeout_secs == 0 {
            return Err(AssistantError::Config(
                "automation.timeout_secs must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.voice.min_confidence) {
            return Err(AssistantError::Config(
                "voice.min_confidence must be between 0 and 1".into(),
            ));
        }
        if self.voice.wake_words.iter().all(|w| w.trim().is_empty()) {
            return Err(AssistantError::Config(
                "voice.wake_words must contain at least one word".into(),
            ));
        }
        self.search
            .validate()
            .map_err(|e| AssistantError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AssistantConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.shell.timeout_secs, 15);
        assert_eq!(config.shell.max_output_bytes, 512 * 1024);
        assert_eq!(config.shell.display_chars, 2000);
        assert_eq!(config.automation.timeout_secs, 30);
        assert!((config.voice.min_confidence - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.voice.restart_delay_ms, 300);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: AssistantConfig = toml::from_str("").unwrap();
        assert_eq!(config, AssistantConfig::default());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: AssistantConfig = toml::from_str(
            r#"
            [llm]
            model = "gpt-4o"

            [authorization]
            passphrase = "open sesame"
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.authorization.passphrase, "open sesame");
        assert_eq!(config.shell, ShellConfig::default());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AssistantConfig::default();
        config.voice.restart_delay_ms = 500;
        config.storage.data_dir = Some(dir.path().join("data"));
        config.save_to_file(&path).unwrap();

        let loaded = AssistantConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = AssistantConfig::from_file(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_or_default_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AssistantConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AssistantConfig::default());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(matches!(
            AssistantConfig::from_file(&path),
            Err(AssistantError::Config(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_confidence() {
        let mut config = AssistantConfig::default();
        config.voice.min_confidence = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_confidence"));
    }

    #[test]
    fn storage_paths_follow_data_dir() {
        let storage = StorageConfig {
            data_dir: Some(PathBuf::from("/var/lib/laila")),
        };
        assert_eq!(storage.state_file(), PathBuf::from("/var/lib/laila/state.json"));
        assert_eq!(storage.sessions_dir(), PathBuf::from("/var/lib/laila/sessions"));
    }
}
