//! Persisted settings and per-call provider configuration.
//!
//! [`Settings`] is what lives on disk (and in environment fallbacks).
//! [`ProviderConfig`] is the validated, immutable view of it that a single
//! generation call uses. Settings are re-read for every call so edits take
//! effect immediately.

use crate::error::{AppError, Result};
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_LOCAL_URL: &str = "https://localhost:8000";
pub const DEFAULT_LOCAL_MODEL: &str = "llava:7b";
pub const DEFAULT_LOCAL_API_PATH: &str = "/api/generate";

/// Settings keys that an environment variable seeds when the stored value
/// is missing or empty.
const ENV_FALLBACKS: [(&str, &str); 4] = [
    ("apiProvider", "API_PROVIDER"),
    ("openaiApiKey", "OPENAI_API_KEY"),
    ("googleApiKey", "GOOGLE_API_KEY"),
    ("localServerUrl", "OLLAMA_URL"),
];

/// The AI backend selected by the `apiProvider` setting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "local")]
    Local,
}

impl ProviderKind {
    /// Identifier used in settings and on the command line.
    pub fn id(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OpenAi => "OpenAI",
            Self::Gemini => "Gemini",
            Self::Local => "Local server",
        };
        f.write_str(name)
    }
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            "local" | "ollama" => Ok(Self::Local),
            other => Err(AppError::config(format!("Unknown API provider: {other}"))),
        }
    }
}

fn default_hotkey() -> String {
    if cfg!(target_os = "macos") {
        "Cmd+F12".to_string()
    } else {
        "Ctrl+F12".to_string()
    }
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_gemini_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}

fn default_local_url() -> String {
    DEFAULT_LOCAL_URL.to_string()
}

fn default_local_model() -> String {
    DEFAULT_LOCAL_MODEL.to_string()
}

fn default_local_api_path() -> String {
    DEFAULT_LOCAL_API_PATH.to_string()
}

/// User-configurable settings persisted between sessions.
///
/// Stored as JSON in the user's config directory
/// (e.g. `~/.config/screen-prompt/settings.json` on Linux). Every field has a
/// default so older or partial files still load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub api_provider: ProviderKind,
    #[serde(default, rename = "openaiApiKey")]
    pub openai_api_key: String,
    #[serde(default = "default_openai_model", rename = "openaiModel")]
    pub openai_model: String,
    #[serde(default = "default_openai_base_url", rename = "openaiBaseUrl")]
    pub openai_base_url: String,
    #[serde(default)]
    pub google_api_key: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    #[serde(default = "default_local_url")]
    pub local_server_url: String,
    #[serde(default = "default_local_model")]
    pub ollama_model_name: String,
    #[serde(default = "default_local_api_path")]
    pub ollama_api_path: String,
    /// Free-form JSON object merged into local requests; empty means none.
    #[serde(default)]
    pub ollama_custom_options: String,
    #[serde(default = "default_hotkey", rename = "captureHotkey")]
    pub capture_hotkey: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_provider: ProviderKind::default(),
            openai_api_key: String::new(),
            openai_model: default_openai_model(),
            openai_base_url: default_openai_base_url(),
            google_api_key: String::new(),
            gemini_model: default_gemini_model(),
            gemini_base_url: default_gemini_base_url(),
            local_server_url: default_local_url(),
            ollama_model_name: default_local_model(),
            ollama_api_path: default_local_api_path(),
            ollama_custom_options: String::new(),
            capture_hotkey: default_hotkey(),
        }
    }
}

impl Settings {
    /// Builds settings from the stored JSON object.
    ///
    /// Keys listed in [`ENV_FALLBACKS`] that are absent or empty are seeded
    /// from `lookup` before serde fills the remaining defaults. Stored values
    /// always win.
    fn from_stored(mut stored: Map<String, Value>, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for (key, var) in ENV_FALLBACKS {
            let stored_value = stored.get(key).and_then(Value::as_str).map(str::trim);
            if stored_value.is_some_and(|v| !v.is_empty()) {
                continue;
            }
            let Some(value) = lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
                continue;
            };

            let value = if key == "apiProvider" {
                match value.parse::<ProviderKind>() {
                    Ok(kind) => kind.id().to_string(),
                    Err(_) => {
                        warn!(value = %value, "Ignoring unknown {}", var);
                        continue;
                    }
                }
            } else {
                value
            };
            debug!(key, var, "Seeding setting from environment");
            stored.insert(key.to_string(), Value::String(value));
        }

        serde_json::from_value(Value::Object(stored)).unwrap_or_else(|e| {
            warn!(error = %e, "Settings contain invalid values, using defaults");
            Settings::default()
        })
    }

    /// Stores a new capture hotkey after a minimal shape check.
    ///
    /// The hotkey must combine at least one modifier with a key
    /// (`Ctrl+F12`). Registration with the OS is not the core's concern.
    pub fn set_capture_hotkey(&mut self, hotkey: &str) -> Result<()> {
        let parts: Vec<&str> = hotkey.split('+').map(str::trim).collect();
        if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(AppError::config(
                "Invalid hotkey. Must include a modifier (Ctrl/Cmd/Alt/Shift) and a key.",
            ));
        }
        self.capture_hotkey = parts.join("+");
        Ok(())
    }

    /// Returns whether the active provider has the credentials it needs.
    pub fn has_credentials(&self) -> bool {
        match self.api_provider {
            ProviderKind::OpenAi => !self.openai_api_key.trim().is_empty(),
            ProviderKind::Gemini => !self.google_api_key.trim().is_empty(),
            ProviderKind::Local => {
                !self.local_server_url.trim().is_empty()
                    && !self.ollama_model_name.trim().is_empty()
            }
        }
    }
}

/// Source of [`Settings`], consulted at the start of every generation call.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Settings>;
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// Settings persisted as JSON in the user's config directory.
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    /// Opens the store at the platform config location.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("", "screen-prompt", "screen-prompt")
            .ok_or_else(|| AppError::config("Could not determine a config directory"))?;
        let config_dir = dirs.config_dir();
        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
        }
        Ok(Self::at(config_dir.join("settings.json")))
    }

    /// Opens the store at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl FileSettingsStore {
    fn load_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Settings {
        Settings::from_stored(self.read_stored(), lookup)
    }

    /// The stored JSON object, or an empty one when there is nothing usable.
    fn read_stored(&self) -> Map<String, Value> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No settings file, using defaults");
                return Map::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Settings file unreadable, using defaults");
                return Map::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(Value::Object(stored)) => stored,
            Ok(_) => {
                warn!(path = %self.path.display(), "Settings file is not a JSON object, using defaults");
                Map::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Settings file is corrupt, using defaults");
                Map::new()
            }
        }
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<Settings> {
        let _ = dotenvy::dotenv();
        Ok(self.load_with(|var| std::env::var(var).ok()))
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

/// In-process settings, for tests and headless embedding.
#[derive(Default)]
pub struct MemorySettingsStore {
    settings: Mutex<Settings>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }

    /// Applies an in-place edit, as a settings form would.
    pub fn update(&self, edit: impl FnOnce(&mut Settings)) {
        edit(&mut self.settings.lock());
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Settings> {
        Ok(self.settings.lock().clone())
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        *self.settings.lock() = settings.clone();
        Ok(())
    }
}

/// Validated configuration for one generation call.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderConfig {
    OpenAi {
        api_key: String,
        model: String,
        base_url: Url,
    },
    Gemini {
        api_key: String,
        model: String,
        base_url: Url,
    },
    Local {
        endpoint: Url,
        model: String,
        /// Raw user JSON; parsed (leniently) by the adapter.
        custom_options: Option<String>,
    },
}

impl ProviderConfig {
    /// Resolves the active provider's configuration from settings.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NoConfiguration`] when a field the provider needs
    /// is empty or an endpoint is not a valid URL.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        match settings.api_provider {
            ProviderKind::OpenAi => Ok(Self::OpenAi {
                api_key: required(ProviderKind::OpenAi, &settings.openai_api_key, "API key is not set")?,
                model: model_or_default(&settings.openai_model, DEFAULT_OPENAI_MODEL),
                base_url: parse_url(ProviderKind::OpenAi, &settings.openai_base_url)?,
            }),
            ProviderKind::Gemini => Ok(Self::Gemini {
                api_key: required(ProviderKind::Gemini, &settings.google_api_key, "API key is not set")?,
                model: model_or_default(&settings.gemini_model, DEFAULT_GEMINI_MODEL),
                base_url: parse_url(ProviderKind::Gemini, &settings.gemini_base_url)?,
            }),
            ProviderKind::Local => {
                let base = required(ProviderKind::Local, &settings.local_server_url, "server URL is not set")?;
                let model = required(ProviderKind::Local, &settings.ollama_model_name, "model name is not set")?;
                let endpoint = join_endpoint(&base, &settings.ollama_api_path);
                let custom_options = Some(settings.ollama_custom_options.trim())
                    .filter(|o| !o.is_empty())
                    .map(str::to_string);

                Ok(Self::Local {
                    endpoint: parse_url(ProviderKind::Local, &endpoint)?,
                    model,
                    custom_options,
                })
            }
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::OpenAi { .. } => ProviderKind::OpenAi,
            Self::Gemini { .. } => ProviderKind::Gemini,
            Self::Local { .. } => ProviderKind::Local,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi { model, .. } | Self::Gemini { model, .. } | Self::Local { model, .. } => model,
        }
    }
}

fn required(provider: ProviderKind, value: &str, detail: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::NoConfiguration {
            provider,
            detail: detail.to_string(),
        });
    }
    Ok(value.to_string())
}

fn model_or_default(model: &str, default: &str) -> String {
    let model = model.trim();
    let chosen = if model.is_empty() { default } else { model };
    chosen.to_string()
}

fn parse_url(provider: ProviderKind, raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).map_err(|e| AppError::NoConfiguration {
        provider,
        detail: format!("invalid endpoint URL '{raw}': {e}"),
    })
}

/// `{baseURL}{apiPath}` with exactly one slash between the two.
fn join_endpoint(base: &str, path: &str) -> String {
    let path = path.trim();
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_settings_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"apiProvider":"gemini","googleApiKey":"g-key"}"#).unwrap();
        assert_eq!(settings.api_provider, ProviderKind::Gemini);
        assert_eq!(settings.google_api_key, "g-key");
        assert_eq!(settings.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(settings.ollama_api_path, DEFAULT_LOCAL_API_PATH);
    }

    #[test]
    fn settings_use_camel_case_keys_on_disk() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        for key in [
            "apiProvider",
            "openaiApiKey",
            "googleApiKey",
            "localServerUrl",
            "ollamaModelName",
            "ollamaApiPath",
            "ollamaCustomOptions",
            "captureHotkey",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn env_fallback_never_overrides_stored_values() {
        let stored = json!({ "openaiApiKey": "stored", "googleApiKey": "" });
        let Value::Object(stored) = stored else { unreachable!() };

        let settings = Settings::from_stored(stored, |var| match var {
            "OPENAI_API_KEY" => Some("from-env".into()),
            "GOOGLE_API_KEY" => Some("google-env".into()),
            _ => None,
        });

        assert_eq!(settings.openai_api_key, "stored");
        assert_eq!(settings.google_api_key, "google-env");
    }

    #[test]
    fn fresh_install_is_seeded_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::at(dir.path().join("settings.json"));

        let settings = store.load_with(|var| match var {
            "OLLAMA_URL" => Some("http://10.0.0.5:11434".into()),
            "API_PROVIDER" => Some("Ollama".into()),
            _ => None,
        });

        assert_eq!(settings.local_server_url, "http://10.0.0.5:11434");
        assert_eq!(settings.api_provider, ProviderKind::Local);
        assert_eq!(settings.ollama_model_name, DEFAULT_LOCAL_MODEL);
    }

    #[test]
    fn keys_missing_from_file_are_seeded_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::at(dir.path().join("settings.json"));
        fs::write(store.path(), r#"{"localServerUrl":"http://stored:8000","ollamaModelName":"llava"}"#).unwrap();

        let settings = store.load_with(|var| match var {
            "OLLAMA_URL" => Some("http://env:11434".into()),
            "API_PROVIDER" => Some("gemini".into()),
            "GOOGLE_API_KEY" => Some("g-env".into()),
            _ => None,
        });

        assert_eq!(settings.local_server_url, "http://stored:8000");
        assert_eq!(settings.api_provider, ProviderKind::Gemini);
        assert_eq!(settings.google_api_key, "g-env");
    }

    #[test]
    fn unknown_provider_in_environment_is_ignored() {
        let settings = Settings::from_stored(Map::new(), |var| {
            (var == "API_PROVIDER").then(|| "claude".to_string())
        });
        assert_eq!(settings.api_provider, ProviderKind::OpenAi);
    }

    #[test]
    fn hotkey_requires_modifier_and_key() {
        let mut settings = Settings::default();
        assert!(settings.set_capture_hotkey("F12").is_err());
        assert!(settings.set_capture_hotkey("Ctrl+").is_err());
        settings.set_capture_hotkey("Alt + Shift + P").unwrap();
        assert_eq!(settings.capture_hotkey, "Alt+Shift+P");
    }

    #[test]
    fn missing_api_key_is_no_configuration() {
        let settings = Settings::default();
        let err = ProviderConfig::from_settings(&settings).unwrap_err();
        assert!(matches!(
            err,
            AppError::NoConfiguration { provider: ProviderKind::OpenAi, .. }
        ));
    }

    #[test]
    fn local_endpoint_joins_base_and_path() {
        let settings = Settings {
            api_provider: ProviderKind::Local,
            local_server_url: "http://127.0.0.1:11434/".into(),
            ollama_api_path: "/api/generate".into(),
            ..Settings::default()
        };
        let config = ProviderConfig::from_settings(&settings).unwrap();
        match config {
            ProviderConfig::Local { endpoint, model, custom_options } => {
                assert_eq!(endpoint.as_str(), "http://127.0.0.1:11434/api/generate");
                assert_eq!(model, DEFAULT_LOCAL_MODEL);
                assert!(custom_options.is_none());
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn local_requires_url_and_model() {
        let mut settings = Settings {
            api_provider: ProviderKind::Local,
            local_server_url: String::new(),
            ..Settings::default()
        };
        match ProviderConfig::from_settings(&settings) {
            Err(AppError::NoConfiguration { provider, detail }) => {
                assert_eq!(provider, ProviderKind::Local);
                assert_eq!(detail, "server URL is not set");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        settings.local_server_url = DEFAULT_LOCAL_URL.into();
        settings.ollama_model_name = "  ".into();
        assert!(matches!(
            ProviderConfig::from_settings(&settings),
            Err(AppError::NoConfiguration { provider: ProviderKind::Local, .. })
        ));

        settings.ollama_model_name = "llava".into();
        settings.local_server_url = "not a url".into();
        assert!(matches!(
            ProviderConfig::from_settings(&settings),
            Err(AppError::NoConfiguration { provider: ProviderKind::Local, .. })
        ));
    }

    #[test]
    fn file_store_round_trips_and_tolerates_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::at(dir.path().join("nested").join("settings.json"));

        let mut settings = store.load_with(no_env);
        settings.api_provider = ProviderKind::Local;
        settings.ollama_custom_options = r#"{"num_ctx":4096}"#.into();
        store.save(&settings).unwrap();

        let reloaded = store.load_with(no_env);
        assert_eq!(reloaded.api_provider, ProviderKind::Local);
        assert_eq!(reloaded.ollama_custom_options, r#"{"num_ctx":4096}"#);

        fs::write(store.path(), "{ not json").unwrap();
        let fallback = store.load_with(no_env);
        assert_eq!(fallback.api_provider, ProviderKind::OpenAi);
    }

    #[test]
    fn provider_kind_parses_aliases() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Local);
        assert!("claude".parse::<ProviderKind>().is_err());
    }
}
