use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::env;
use std::time::Duration;

pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const CACHE_SWEEP_PERIOD: Duration = Duration::from_secs(10 * 60);
pub const SCHEDULED_ATTEMPTS: u32 = 3;
pub const PREVIEW_ATTEMPTS: u32 = 2;
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const SCHEDULED_DEADLINE: Duration = Duration::from_secs(120);
pub const PREVIEW_DEADLINE: Duration = Duration::from_secs(30);
pub const TRENDING_LIMIT: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct LibraryConnection {
    pub url: String,
    pub api_key: String,
}

impl LibraryConnection {
    fn from_parts(url: Option<String>, api_key: Option<String>) -> Option<Self> {
        let url = url?.trim().trim_end_matches('/').to_string();
        let api_key = api_key?.trim().to_string();
        if url.is_empty() || api_key.is_empty() {
            return None;
        }
        Some(Self { url, api_key })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrendingToggles {
    pub anticipated_shows: bool,
    pub watched_shows: bool,
    pub anticipated_movies: bool,
    pub watched_movies: bool,
}

impl TrendingToggles {
    pub fn any(&self) -> bool {
        self.anticipated_shows || self.watched_shows || self.anticipated_movies || self.watched_movies
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sonarr: Option<LibraryConnection>,
    pub radarr: Option<LibraryConnection>,
    pub trakt_client_id: Option<String>,
    pub trending: TrendingToggles,
    pub show_unmonitored: bool,
    pub show_upgraded: bool,
    pub days_back: i64,
    pub days_ahead: i64,
    pub history_page_size: u32,
    pub schedule_day: String,
    pub schedule_time: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub batch_size: usize,
    pub outbox_dir: String,
    pub bind_addr: String,
    pub api_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset and blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let recipients = get("EMAIL_RECIPIENTS")
            .map(|raw| {
                raw.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            sonarr: LibraryConnection::from_parts(get("SONARR_URL"), get("SONARR_API_KEY")),
            radarr: LibraryConnection::from_parts(get("RADARR_URL"), get("RADARR_API_KEY")),
            trakt_client_id: get("TRAKT_CLIENT_ID").map(|v| v.trim().to_string()),
            trending: TrendingToggles {
                anticipated_shows: parse_bool(get("TRAKT_ANTICIPATED_SHOWS"), "TRAKT_ANTICIPATED_SHOWS")?,
                watched_shows: parse_bool(get("TRAKT_WATCHED_SHOWS"), "TRAKT_WATCHED_SHOWS")?,
                anticipated_movies: parse_bool(get("TRAKT_ANTICIPATED_MOVIES"), "TRAKT_ANTICIPATED_MOVIES")?,
                watched_movies: parse_bool(get("TRAKT_WATCHED_MOVIES"), "TRAKT_WATCHED_MOVIES")?,
            },
            show_unmonitored: parse_bool(get("SHOW_UNMONITORED"), "SHOW_UNMONITORED")?,
            show_upgraded: parse_bool(get("SHOW_UPGRADED"), "SHOW_UPGRADED")?,
            days_back: parse_number(get("DAYS_BACK"), "DAYS_BACK", 7)?,
            days_ahead: parse_number(get("DAYS_AHEAD"), "DAYS_AHEAD", 7)?,
            history_page_size: parse_number(get("HISTORY_PAGE_SIZE"), "HISTORY_PAGE_SIZE", 50)?,
            schedule_day: get("SCHEDULE_DAY").unwrap_or_else(|| "sun".to_string()),
            schedule_time: get("SCHEDULE_TIME").unwrap_or_else(|| "09:00".to_string()),
            recipients,
            subject: get("EMAIL_SUBJECT").unwrap_or_else(|| "Your weekly media digest".to_string()),
            batch_size: parse_number(get("EMAIL_BATCH_SIZE"), "EMAIL_BATCH_SIZE", 50)?,
            outbox_dir: get("OUTBOX_DIR").unwrap_or_else(|| "outbox".to_string()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8787".to_string()),
            api_token: get("API_TOKEN"),
        };

        if config.days_back < 1 || config.days_ahead < 1 {
            anyhow::bail!("DAYS_BACK and DAYS_AHEAD must be at least 1");
        }
        if config.history_page_size == 0 || config.batch_size == 0 {
            anyhow::bail!("HISTORY_PAGE_SIZE and EMAIL_BATCH_SIZE must be positive");
        }
        Ok(config)
    }

    pub fn trending_enabled(&self) -> bool {
        self.trakt_client_id.is_some() && self.trending.any()
    }

    pub fn redacted(&self) -> RedactedConfig {
        RedactedConfig {
            sonarr_url: self.sonarr.as_ref().map(|c| c.url.clone()),
            sonarr_configured: self.sonarr.is_some(),
            radarr_url: self.radarr.as_ref().map(|c| c.url.clone()),
            radarr_configured: self.radarr.is_some(),
            trakt_configured: self.trakt_client_id.is_some(),
            trending: self.trending,
            show_unmonitored: self.show_unmonitored,
            show_upgraded: self.show_upgraded,
            days_back: self.days_back,
            days_ahead: self.days_ahead,
            schedule_day: self.schedule_day.clone(),
            schedule_time: self.schedule_time.clone(),
            recipient_count: self.recipients.len(),
            subject: self.subject.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RedactedConfig {
    pub sonarr_url: Option<String>,
    pub sonarr_configured: bool,
    pub radarr_url: Option<String>,
    pub radarr_configured: bool,
    pub trakt_configured: bool,
    pub trending: TrendingToggles,
    pub show_unmonitored: bool,
    pub show_upgraded: bool,
    pub days_back: i64,
    pub days_ahead: i64,
    pub schedule_day: String,
    pub schedule_time: String,
    pub recipient_count: usize,
    pub subject: String,
}

fn parse_bool(value: Option<String>, key: &str) -> Result<bool> {
    let Some(raw) = value else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{} must be a boolean, got '{}'", key, other)),
    }
}

fn parse_number<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number", key)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn library_source_needs_both_url_and_key() {
        let config = config_from(&[
            ("SONARR_URL", "http://sonarr:8989/"),
            ("SONARR_API_KEY", "abc"),
            ("RADARR_URL", "http://radarr:7878"),
        ])
        .unwrap();
        let sonarr = config.sonarr.expect("sonarr configured");
        assert_eq!(sonarr.url, "http://sonarr:8989");
        assert!(config.radarr.is_none());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[("SONARR_URL", "  "), ("SONARR_API_KEY", "abc")]).unwrap();
        assert!(config.sonarr.is_none());
    }

    #[test]
    fn trending_needs_toggle_and_client_id() {
        let config = config_from(&[("TRAKT_WATCHED_SHOWS", "true")]).unwrap();
        assert!(!config.trending_enabled());
        let config = config_from(&[("TRAKT_CLIENT_ID", "cid")]).unwrap();
        assert!(!config.trending_enabled());
        let config = config_from(&[("TRAKT_CLIENT_ID", "cid"), ("TRAKT_WATCHED_SHOWS", "yes")]).unwrap();
        assert!(config.trending_enabled());
    }

    #[test]
    fn defaults_and_recipient_list() {
        let config = config_from(&[("EMAIL_RECIPIENTS", "a@example.com, ,b@example.com")]).unwrap();
        assert_eq!(config.recipients, vec!["a@example.com", "b@example.com"]);
        assert_eq!(config.days_back, 7);
        assert_eq!(config.history_page_size, 50);
        assert_eq!(config.schedule_day, "sun");
        assert!(!config.show_unmonitored);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn rejects_garbage_values() {
        assert!(config_from(&[("SHOW_UPGRADED", "maybe")]).is_err());
        assert!(config_from(&[("DAYS_BACK", "seven")]).is_err());
        assert!(config_from(&[("DAYS_AHEAD", "0")]).is_err());
    }

    #[test]
    fn redacted_view_hides_keys() {
        let config = config_from(&[("RADARR_URL", "http://radarr"), ("RADARR_API_KEY", "secret")]).unwrap();
        let json = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"radarr_configured\":true"));
    }
}
