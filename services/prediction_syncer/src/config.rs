use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};
use std::{env, num::NonZeroU32, str::FromStr, time::Duration};

use crate::error::ConfigError;
use crate::model::SeasonType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub competitions: Vec<String>,
    pub calls_per_minute: NonZeroU32,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub throttle_delay_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.football-data.org/v4".to_string(),
            api_key: String::new(),
            competitions: vec!["CL".to_string()],
            calls_per_minute: nonzero!(10u32),
            request_timeout_secs: 10,
            max_attempts: 3,
            throttle_delay_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base_url: String,
    pub channel_chat_id: Option<i64>,
    pub web_app_url: String,
    pub bot_web_app_url: String,
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base_url: "https://api.telegram.org".to_string(),
            channel_chat_id: None,
            web_app_url: String::new(),
            bot_web_app_url: String::new(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreviewConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationConfig {
    pub reminder_lookahead_hours: i64,
    pub concurrency: usize,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub default_language: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            reminder_lookahead_hours: 24,
            concurrency: 10,
            batch_size: 50,
            batch_pause_ms: 1000,
            default_language: "en".to_string(),
        }
    }
}

impl NotificationConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub sync_interval_secs: u64,
    pub settle_interval_secs: u64,
    pub season_interval_secs: u64,
    pub notify_interval_secs: u64,
    pub recap_interval_secs: u64,
    pub rotating_season_types: Vec<SeasonType>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 900,
            settle_interval_secs: 600,
            season_interval_secs: 3600,
            notify_interval_secs: 3600,
            recap_interval_secs: 21600,
            rotating_season_types: vec![SeasonType::Monthly],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncerConfig {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub telegram: TelegramConfig,
    pub preview: PreviewConfig,
    pub notifications: NotificationConfig,
    pub schedule: ScheduleConfig,
}

fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

fn parse_list<T: FromStr>(key: &str, raw: &str) -> Result<Vec<T>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<T>().map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value: item.to_string(),
            })
        })
        .collect()
}

impl SyncerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(url) = env::var("DATABASE_URL") {
            config.database.url = Some(url);
        }
        if let Some(max) = parse_var("DATABASE_MAX_CONNECTIONS")? {
            config.database.max_connections = max;
        }

        if let Ok(base_url) = env::var("FOOTBALL_API_BASE_URL") {
            config.provider.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Ok(api_key) = env::var("FOOTBALL_API_KEY") {
            config.provider.api_key = api_key;
        }
        if let Ok(raw) = env::var("FOOTBALL_COMPETITIONS") {
            config.provider.competitions = parse_list("FOOTBALL_COMPETITIONS", &raw)?;
        }
        if let Some(budget) = parse_var::<u32>("FOOTBALL_CALLS_PER_MINUTE")? {
            config.provider.calls_per_minute =
                NonZeroU32::new(budget).ok_or_else(|| ConfigError::Invalid {
                    key: "FOOTBALL_CALLS_PER_MINUTE".to_string(),
                    value: budget.to_string(),
                })?;
        }
        if let Some(timeout) = parse_var("FOOTBALL_TIMEOUT_SECS")? {
            config.provider.request_timeout_secs = timeout;
        }
        if let Some(attempts) = parse_var("FOOTBALL_MAX_ATTEMPTS")? {
            config.provider.max_attempts = attempts;
        }
        if let Some(delay) = parse_var("FOOTBALL_THROTTLE_DELAY_SECS")? {
            config.provider.throttle_delay_secs = delay;
        }

        if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
            config.telegram.bot_token = token;
        }
        if let Ok(base_url) = env::var("TELEGRAM_API_BASE_URL") {
            config.telegram.api_base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(chat_id) = parse_var("TELEGRAM_CHANNEL_CHAT_ID")? {
            config.telegram.channel_chat_id = Some(chat_id);
        }
        if let Ok(url) = env::var("WEB_APP_URL") {
            config.telegram.web_app_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = env::var("BOT_WEB_APP_URL") {
            config.telegram.bot_web_app_url = url;
        }
        if let Some(timeout) = parse_var("TELEGRAM_TIMEOUT_SECS")? {
            config.telegram.request_timeout_secs = timeout;
        }

        if let Ok(url) = env::var("IMAGE_PREVIEW_URL") {
            config.preview.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(timeout) = parse_var("IMAGE_PREVIEW_TIMEOUT_SECS")? {
            config.preview.request_timeout_secs = timeout;
        }

        if let Some(hours) = parse_var("REMINDER_LOOKAHEAD_HOURS")? {
            config.notifications.reminder_lookahead_hours = hours;
        }
        if let Some(concurrency) = parse_var::<usize>("NOTIFY_CONCURRENCY")? {
            config.notifications.concurrency = concurrency.max(1);
        }
        if let Some(batch_size) = parse_var::<usize>("NOTIFY_BATCH_SIZE")? {
            config.notifications.batch_size = batch_size.max(1);
        }
        if let Some(pause) = parse_var("NOTIFY_BATCH_PAUSE_MS")? {
            config.notifications.batch_pause_ms = pause;
        }
        if let Ok(language) = env::var("DEFAULT_LANGUAGE") {
            config.notifications.default_language = language;
        }

        if let Some(secs) = parse_var("SYNC_INTERVAL_SECS")? {
            config.schedule.sync_interval_secs = secs;
        }
        if let Some(secs) = parse_var("SETTLE_INTERVAL_SECS")? {
            config.schedule.settle_interval_secs = secs;
        }
        if let Some(secs) = parse_var("SEASON_INTERVAL_SECS")? {
            config.schedule.season_interval_secs = secs;
        }
        if let Some(secs) = parse_var("NOTIFY_INTERVAL_SECS")? {
            config.schedule.notify_interval_secs = secs;
        }
        if let Some(secs) = parse_var("RECAP_INTERVAL_SECS")? {
            config.schedule.recap_interval_secs = secs;
        }
        if let Ok(raw) = env::var("ROTATING_SEASON_TYPES") {
            config.schedule.rotating_season_types = parse_list("ROTATING_SEASON_TYPES", &raw)?;
        }

        Ok(config)
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database
            .url
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("DATABASE_URL".to_string()))
    }
}
