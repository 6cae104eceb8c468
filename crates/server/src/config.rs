use std::path::{Path, PathBuf};

use anyhow::Context;
use quillbook_ai::AiSettings;
use quillbook_core::EngineUsed;
use quillbook_extract::DEFAULT_MAX_UPLOAD_BYTES;
use serde::Deserialize;

const CONFIG_ENV: &str = "QUILLBOOK_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "quillbook.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    /// Per file.
    pub max_upload_bytes: usize,
    pub ai: AiSettings,
    pub extraction: ExtractionConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            database_path: PathBuf::from("quillbook.db"),
            jwt_secret: String::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            ai: AiSettings::default(),
            extraction: ExtractionConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub engine: EngineUsed,
    /// Overrides `ai.model` for extraction calls only.
    pub model: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { engine: EngineUsed::Ocr, model: None }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub burst: u32,
    pub interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { burst: 1, interval_ms: 2000 }
    }
}

impl Config {
    /// Load from `$QUILLBOOK_CONFIG` or `./quillbook.toml`, falling back to
    /// defaults when the file does not exist, then apply env overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup("QUILLBOOK_JWT_SECRET") {
            self.jwt_secret = secret;
        }
        if let Some(key) = lookup("QUILLBOOK_AI_API_KEY") {
            self.ai.api_key = key;
        }
    }

    /// AI settings for extraction calls, with the extraction model applied.
    pub fn extraction_ai(&self) -> AiSettings {
        let mut settings = self.ai.clone();
        if let Some(model) = &self.extraction.model {
            settings.model = model.clone();
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.rate_limit.burst, 1);
        assert_eq!(config.rate_limit.interval_ms, 2000);
        assert_eq!(config.extraction.engine, EngineUsed::Ocr);
        assert_eq!(config.ai.model, "gpt-4o-mini");
    }

    #[test]
    fn sections_are_read() {
        let config: Config = toml::from_str(
            r#"
            bind_addr = "0.0.0.0:3000"
            database_path = "/var/lib/quillbook/data.db"

            [ai]
            base_url = "http://localhost:11434/v1"
            model = "llama3"

            [extraction]
            engine = "text-engine"
            model = "gpt-4o"

            [rate_limit]
            burst = 3
            interval_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.database_path, PathBuf::from("/var/lib/quillbook/data.db"));
        assert_eq!(config.ai.base_url, "http://localhost:11434/v1");
        assert_eq!(config.ai.timeout_secs, 60);
        assert_eq!(config.extraction.engine, EngineUsed::Text);
        assert_eq!(config.extraction_ai().model, "gpt-4o");
        assert_eq!(config.ai.model, "llama3");
        assert_eq!(config.rate_limit.burst, 3);
    }

    #[test]
    fn env_overrides_secrets() {
        let mut config: Config = toml::from_str(r#"jwt_secret = "from-file""#).unwrap();
        config.apply_env(|key| match key {
            "QUILLBOOK_JWT_SECRET" => Some("from-env".to_string()),
            _ => None,
        });
        assert_eq!(config.jwt_secret, "from-env");
        assert_eq!(config.ai.api_key, "");
    }
}
