use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub cooldown: CooldownSettings,
    #[serde(default)]
    pub correlation: CorrelationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    pub api_base: String,
    pub gateway_base: String,
    /// Environment variable the bot token is read from. The token never
    /// lives in the config file.
    pub bot_token_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownSettings {
    pub max_uses: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationSettings {
    /// "memory" or "sqlite".
    pub backend: String,
    #[serde(default)]
    pub db_path: String,
    pub ttl_secs: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            gateway_base: "http://127.0.0.1:8081".to_string(),
            bot_token_env: "BOT_TOKEN".to_string(),
        }
    }
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            max_uses: 2,
            window_secs: 15,
        }
    }
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            db_path: String::new(),
            ttl_secs: 300,
        }
    }
}

pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join("config.toml")
}

pub fn load_settings(config_dir: &Path) -> Result<Settings> {
    let path = config_path(config_dir);
    if !path.exists() {
        return Ok(Settings::default());
    }

    let text = std::fs::read_to_string(&path).map_err(|e| Error::InvalidConfig {
        message: format!("config read failed: {e}"),
    })?;

    let settings = parse_settings(&text).map_err(|e| Error::InvalidConfig {
        message: format!("config invalid: {e}"),
    })?;
    validate_settings(&settings)?;
    Ok(settings)
}

pub fn parse_settings(text: &str) -> std::result::Result<Settings, toml::de::Error> {
    toml::from_str(text)
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.telegram.api_base.trim().is_empty() {
        return Err(Error::InvalidConfig {
            message: "telegram.api_base must not be empty".to_string(),
        });
    }
    if settings.telegram.gateway_base.trim().is_empty() {
        return Err(Error::InvalidConfig {
            message: "telegram.gateway_base must not be empty".to_string(),
        });
    }
    if settings.telegram.bot_token_env.trim().is_empty() {
        return Err(Error::InvalidConfig {
            message: "telegram.bot_token_env must not be empty".to_string(),
        });
    }

    if settings.cooldown.max_uses < 1 {
        return Err(Error::InvalidConfig {
            message: "cooldown.max_uses must be >= 1".to_string(),
        });
    }
    if settings.cooldown.window_secs < 1 {
        return Err(Error::InvalidConfig {
            message: "cooldown.window_secs must be >= 1".to_string(),
        });
    }

    if settings.correlation.ttl_secs < 1 {
        return Err(Error::InvalidConfig {
            message: "correlation.ttl_secs must be >= 1".to_string(),
        });
    }
    match settings.correlation.backend.trim() {
        "memory" => {}
        "sqlite" => {
            if settings.correlation.db_path.trim().is_empty() {
                return Err(Error::InvalidConfig {
                    message: "correlation.db_path must be set for backend \"sqlite\""
                        .to_string(),
                });
            }
        }
        other => {
            return Err(Error::InvalidConfig {
                message: format!(
                    "correlation.backend must be \"memory\" or \"sqlite\" (got {other:?})"
                ),
            });
        }
    }

    Ok(())
}
