//! Application configuration loaded from environment variables.

use lending::{ServiceConfig, SmtpSettings};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset selects the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `CONFLICT_RETRIES`: retries after a write conflict (default: `1`)
/// - `NOTIFY_SENDER`: notification sender address (default: `"loans@localhost"`)
/// - `NOTIFY_QUEUE_CAPACITY`: notification queue bound (default: `256`)
/// - `SMTP_HOST`: SMTP relay host; unset logs emails instead of sending them
/// - `SMTP_PORT`: SMTP relay port (default: `587`)
/// - `SMTP_USER`, `SMTP_PASSWORD`: relay credentials (optional)
/// - `SMTP_STARTTLS`: upgrade with STARTTLS (default: `true`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub conflict_retries: u32,
    pub notify_sender: String,
    pub notify_queue_capacity: usize,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_starttls: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: env_opt("DATABASE_URL"),
            database_max_connections: env_or(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            conflict_retries: env_or("CONFLICT_RETRIES", defaults.conflict_retries),
            notify_sender: std::env::var("NOTIFY_SENDER").unwrap_or(defaults.notify_sender),
            notify_queue_capacity: env_or("NOTIFY_QUEUE_CAPACITY", defaults.notify_queue_capacity),
            smtp_host: env_opt("SMTP_HOST"),
            smtp_port: env_or("SMTP_PORT", defaults.smtp_port),
            smtp_user: env_opt("SMTP_USER"),
            smtp_password: env_opt("SMTP_PASSWORD"),
            smtp_starttls: env_or("SMTP_STARTTLS", defaults.smtp_starttls),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the loan service settings.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            conflict_retries: self.conflict_retries,
            sender: self.notify_sender.clone(),
            queue_capacity: self.notify_queue_capacity,
        }
    }

    /// Returns the SMTP relay settings, or `None` when no host is configured.
    pub fn smtp_settings(&self) -> Option<SmtpSettings> {
        let host = self.smtp_host.clone()?;

        Some(SmtpSettings {
            host,
            port: self.smtp_port,
            user: self.smtp_user.clone(),
            password: self.smtp_password.clone(),
            starttls: self.smtp_starttls,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let service = ServiceConfig::default();

        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 5,
            conflict_retries: service.conflict_retries,
            notify_sender: service.sender,
            notify_queue_capacity: service.queue_capacity,
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            smtp_starttls: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.database_max_connections, 5);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_service_config() {
        let config = Config {
            conflict_retries: 3,
            notify_sender: "ops@example.com".to_string(),
            notify_queue_capacity: 16,
            ..Config::default()
        };
        let service = config.service_config();
        assert_eq!(service.conflict_retries, 3);
        assert_eq!(service.sender, "ops@example.com");
        assert_eq!(service.queue_capacity, 16);
    }

    #[test]
    fn test_smtp_settings() {
        assert!(Config::default().smtp_settings().is_none());

        let config = Config {
            smtp_host: Some("smtp.example.com".to_string()),
            smtp_user: Some("mailer".to_string()),
            smtp_password: Some("secret".to_string()),
            ..Config::default()
        };
        let smtp = config.smtp_settings().unwrap();
        assert_eq!(smtp.host, "smtp.example.com");
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.user.as_deref(), Some("mailer"));
        assert_eq!(smtp.password.as_deref(), Some("secret"));
        assert!(smtp.starttls);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
    }
}
