use std::{env, fmt, path::PathBuf, str::FromStr};

use async_trait::async_trait;
use channel_twitch::{DEFAULT_SERVER, TwitchConfig, normalize_channel};
use dashmap::DashMap;
use thiserror::Error;
use tracing::{error, info};

use crate::{
    feature::BotIdentity,
    gate::{DEFAULT_FLUSHES_PER_WINDOW, GateSettings},
    logger::LogConfig,
};

const PREFIX: &str = "WISHMASTER_";
const DEFAULT_MSG_LIMIT: u32 = 20;
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_MAX_LOG_AGE_DAYS: usize = 10;

#[async_trait]
pub trait ConfigManagerType: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    fn clone_box(&self) -> Box<dyn ConfigManagerType>;
    fn debug_box(&self) -> String;
}

pub struct ConfigManager(pub Box<dyn ConfigManagerType>);

impl ConfigManager {
    /// Value of `key`, `None` when unset or blank.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .await
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        ConfigManager(self.0.clone_box())
    }
}

impl fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

/// What became of the `.env` file an [`EnvConfigManager`] was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFileStatus {
    NotRequested,
    Loaded,
    Missing,
    Failed(String),
}

/// Reads the process environment, seeded from a `.env` file when present.
/// How loading the file went is reported by [`EnvConfigManager::log_status`].
#[derive(Clone, Debug)]
pub struct EnvConfigManager {
    env_file: Option<PathBuf>,
    status: EnvFileStatus,
}

impl EnvConfigManager {
    pub fn new(env_file: Option<PathBuf>) -> Box<Self> {
        let status = match &env_file {
            None => EnvFileStatus::NotRequested,
            Some(path) if !path.exists() => EnvFileStatus::Missing,
            Some(path) => match dotenvy::from_path(path) {
                Ok(()) => EnvFileStatus::Loaded,
                Err(e) => EnvFileStatus::Failed(e.to_string()),
            },
        };
        Box::new(Self { env_file, status })
    }

    pub fn status(&self) -> &EnvFileStatus {
        &self.status
    }

    pub fn log_status(&self) {
        let Some(path) = &self.env_file else {
            return;
        };
        match &self.status {
            EnvFileStatus::Loaded => info!("Loaded .env from {}", path.display()),
            EnvFileStatus::Missing => info!("no .env at {}, using the environment only", path.display()),
            EnvFileStatus::Failed(e) => error!("could not load .env from {}: {e}", path.display()),
            EnvFileStatus::NotRequested => {}
        }
    }
}

#[async_trait]
impl ConfigManagerType for EnvConfigManager {
    async fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        match &self.env_file {
            Some(path) => format!("EnvConfigManager({})", path.display()),
            None => "EnvConfigManager".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapConfigManager {
    map: DashMap<String, String>,
}

impl MapConfigManager {
    pub fn new() -> Box<Self> {
        Box::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.map.remove(key);
    }
}

#[async_trait]
impl ConfigManagerType for MapConfigManager {
    async fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        format!("MapConfigManager({} entries)", self.map.len())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(String),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid { key: String, value: String, reason: String },
}

fn key(name: &str) -> String {
    format!("{PREFIX}{name}")
}

async fn required(config: &ConfigManager, name: &str) -> Result<String, ConfigError> {
    let key = key(name);
    config.get(&key).await.ok_or(ConfigError::Missing(key))
}

async fn parsed<T>(config: &ConfigManager, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let key = key(name);
    match config.get(&key).await {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            reason: e.to_string(),
            key,
            value,
        }),
    }
}

async fn positive(config: &ConfigManager, name: &str, default: u32) -> Result<u32, ConfigError> {
    let value = parsed(config, name, default).await?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            key: key(name),
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

async fn flag(config: &ConfigManager, name: &str, default: bool) -> Result<bool, ConfigError> {
    let key = key(name);
    let Some(value) = config.get(&key).await else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value,
            reason: "expected true or false".into(),
        }),
    }
}

/// Everything the bot needs to start.
#[derive(Clone)]
pub struct BotConfig {
    pub server: String,
    pub nickname: String,
    pub password: String,
    /// Always `#`-prefixed and lower case.
    pub channel: String,
    pub msg_limit_per_30_sec: u32,
    pub flushes_per_window: u32,
    pub log: LogConfig,
    /// Account with bet admin rights.
    pub owner: String,
    pub answers_file: Option<PathBuf>,
    pub loopback_trigger: Option<String>,
}

impl BotConfig {
    pub async fn load(config: &ConfigManager) -> Result<Self, ConfigError> {
        let nickname = required(config, "NICKNAME").await?;
        let password = required(config, "PASSWORD").await?;
        let channel = normalize_channel(&required(config, "CHANNEL").await?);
        let owner = match config.get(&key("OWNER")).await {
            Some(owner) => owner,
            None => channel.trim_start_matches('#').to_string(),
        };

        let log_dir = match flag(config, "LOG_FILE", true).await? {
            true => Some(PathBuf::from(
                config
                    .get(&key("LOG_DIR"))
                    .await
                    .unwrap_or_else(|| DEFAULT_LOG_DIR.into()),
            )),
            false => None,
        };
        let log = LogConfig {
            log_level: config
                .get(&key("LOG_LEVEL"))
                .await
                .unwrap_or_else(|| LogConfig::default().log_level),
            console: flag(config, "LOG_CONSOLE", true).await?,
            log_dir,
            max_log_age_days: parsed(config, "MAX_LOG_AGE_DAYS", DEFAULT_MAX_LOG_AGE_DAYS).await?,
        };

        Ok(Self {
            server: config
                .get(&key("SERVER"))
                .await
                .unwrap_or_else(|| DEFAULT_SERVER.into()),
            nickname,
            password,
            channel,
            msg_limit_per_30_sec: positive(config, "MSG_LIMIT_PER_30_SEC", DEFAULT_MSG_LIMIT).await?,
            flushes_per_window: positive(config, "FLUSHES_PER_WINDOW", DEFAULT_FLUSHES_PER_WINDOW).await?,
            log,
            owner,
            answers_file: config.get(&key("ANSWERS_FILE")).await.map(PathBuf::from),
            loopback_trigger: config.get(&key("LOOPBACK_TRIGGER")).await,
        })
    }

    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            flushes_per_window: self.flushes_per_window,
            ..GateSettings::new(self.msg_limit_per_30_sec)
        }
    }

    pub fn identity(&self) -> BotIdentity {
        BotIdentity::new(&self.nickname, &self.channel)
    }

    pub fn twitch(&self) -> TwitchConfig {
        TwitchConfig {
            server: self.server.clone(),
            nickname: self.nickname.clone(),
            password: self.password.clone(),
        }
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("server", &self.server)
            .field("nickname", &self.nickname)
            .field("password", &"***")
            .field("channel", &self.channel)
            .field("msg_limit_per_30_sec", &self.msg_limit_per_30_sec)
            .field("flushes_per_window", &self.flushes_per_window)
            .field("log", &self.log)
            .field("owner", &self.owner)
            .field("answers_file", &self.answers_file)
            .field("loopback_trigger", &self.loopback_trigger)
            .finish()
    }
}
