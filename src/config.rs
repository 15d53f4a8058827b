use crate::error::{BillError, Result};
use serde::Deserialize;
use std::{fmt, fs, path::Path, str::FromStr};
use toml_edit::{DocumentMut, Item, Table, value};

pub const DEFAULT_CONFIG_PATH: &str = "bill_ledger.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub vision: VisionSection,
}

fn default_db_path() -> String {
    "bills.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            vision: VisionSection::default(),
        }
    }
}

/// Which hosted vision model reads the bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Together,
    Gemini,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Together => "together",
            Provider::Gemini => "gemini",
        }
    }

    /// Environment variable consulted when the config file carries no key.
    pub fn key_env_var(self) -> &'static str {
        match self {
            Provider::Together => "TOGETHER_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = BillError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "together" => Ok(Provider::Together),
            "gemini" => Ok(Provider::Gemini),
            other => Err(BillError::Config(format!(
                "unknown provider {other:?} (expected \"together\" or \"gemini\")"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VisionSection {
    #[serde(default = "default_provider")]
    pub provider: Provider,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "EndpointConfig::together")]
    pub together: EndpointConfig,
    #[serde(default = "EndpointConfig::gemini")]
    pub gemini: EndpointConfig,
}

fn default_provider() -> Provider {
    Provider::Together
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for VisionSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            timeout_secs: default_timeout_secs(),
            together: EndpointConfig::together(),
            gemini: EndpointConfig::gemini(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl EndpointConfig {
    fn together() -> Self {
        Self {
            base_url: "https://api.together.xyz/v1".to_string(),
            model: "meta-llama/Llama-3.2-11B-Vision-Instruct-Turbo".to_string(),
            api_key: None,
        }
    }

    fn gemini() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key: None,
        }
    }
}

/// Everything one pipeline run needs to reach the selected model.
#[derive(Debug, Clone)]
pub struct VisionSettings {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load `path`, or fall back to the built-in defaults if it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BillError::Config(e.to_string()))
    }

    /// Resolve the selected provider into concrete settings, reading the API key
    /// from the config first and from the provider's env var second.
    pub fn vision_settings(&self) -> Result<VisionSettings> {
        self.vision_settings_with(|name| std::env::var(name).ok())
    }

    fn vision_settings_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<VisionSettings> {
        let provider = self.vision.provider;
        let endpoint = match provider {
            Provider::Together => &self.vision.together,
            Provider::Gemini => &self.vision.gemini,
        };

        let api_key = endpoint
            .api_key
            .clone()
            .or_else(|| env(provider.key_env_var()))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                BillError::Config(format!(
                    "no API key for {provider}: set {} or vision.{provider}.api_key",
                    provider.key_env_var()
                ))
            })?;

        Ok(VisionSettings {
            provider,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            model: endpoint.model.clone(),
            api_key,
            timeout_secs: self.vision.timeout_secs,
        })
    }

    /// Persist the provider choice, leaving the rest of the file as written.
    pub fn set_provider(path: impl AsRef<Path>, provider: Provider) -> Result<()> {
        let content = if path.as_ref().exists() {
            fs::read_to_string(&path)?
        } else {
            String::new()
        };
        let mut doc = content
            .parse::<DocumentMut>()
            .map_err(|e| BillError::Config(e.to_string()))?;

        if !doc.contains_table("vision") {
            doc["vision"] = Item::Table(Table::new());
        }
        doc["vision"]["provider"] = value(provider.as_str());

        fs::write(&path, doc.to_string())?;
        Ok(())
    }
}
