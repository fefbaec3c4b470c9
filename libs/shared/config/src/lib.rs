use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_port: u16,
    pub notification_webhook_url: Option<String>,
    pub notification_poll_interval_secs: u64,
    pub notification_max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "medislot.db".to_string(),
            jwt_secret: String::new(),
            server_port: 3000,
            notification_webhook_url: None,
            notification_poll_interval_secs: 30,
            notification_max_attempts: 3,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("DATABASE_URL not set, using {}", defaults.database_url);
                    defaults.database_url.clone()
                }),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, using empty value");
                    String::new()
                }),
            server_port: parse_or("SERVER_PORT", defaults.server_port),
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .or_else(|| {
                    warn!("NOTIFICATION_WEBHOOK_URL not set, notifications will only be logged");
                    None
                }),
            notification_poll_interval_secs: parse_or(
                "NOTIFICATION_POLL_INTERVAL_SECS",
                defaults.notification_poll_interval_secs,
            ),
            notification_max_attempts: parse_or(
                "NOTIFICATION_MAX_ATTEMPTS",
                defaults.notification_max_attempts,
            ),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.database_url.is_empty() && !self.jwt_secret.is_empty()
    }

    pub fn is_webhook_configured(&self) -> bool {
        self.notification_webhook_url.is_some()
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
