use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::extractor::ScrapeSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Source blog
    pub blog_base_url: String,
    pub rss_feed_url: String,

    // Scraping
    pub scrape: ScrapeSettings,
    pub scrape_interval: Option<Duration>,

    // Database
    pub database_path: PathBuf,

    // Web Server
    pub web_host: String,
    pub web_port: u16,
    pub public_base_url: String,
    pub blog_title: String,
    pub blog_description: String,
    pub admin_password_hash: Option<String>,

    // Mail
    pub mail: MailSettings,
}

/// SMTP relay settings. An empty host puts the notifier in log-only mode.
#[derive(Debug, Clone, Default)]
pub struct MailSettings {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_starttls: bool,
    pub from: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let scrape_interval = match parse_env_u64("SCRAPE_INTERVAL_SECS", 0)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            // Source blog
            blog_base_url: required_env("BLOG_BASE_URL")?,
            rss_feed_url: required_env("RSS_FEED_URL")?,

            // Scraping
            scrape: ScrapeSettings {
                chrome_path: optional_env("CHROME_PATH"),
                max_pages: parse_env_u32("SCRAPE_MAX_PAGES", 50)?,
                navigation_timeout: Duration::from_secs(parse_env_u64(
                    "NAVIGATION_TIMEOUT_SECS",
                    30,
                )?),
                selector_timeout: Duration::from_secs(parse_env_u64("SELECTOR_TIMEOUT_SECS", 5)?),
                scroll_step_px: parse_env_u32("SCROLL_STEP_PX", 100)?,
                scroll_interval: Duration::from_millis(parse_env_u64("SCROLL_INTERVAL_MS", 100)?),
                scroll_max_steps: parse_env_u32("SCROLL_MAX_STEPS", 500)?,
                detail_settle: Duration::from_millis(parse_env_u64("DETAIL_SETTLE_MS", 3000)?),
                ..ScrapeSettings::default()
            },
            scrape_interval,

            // Database
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/blog.sqlite")),

            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 3000)?,
            public_base_url: env_or_default("PUBLIC_BASE_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            blog_title: env_or_default("BLOG_TITLE", "Blog"),
            blog_description: env_or_default("BLOG_DESCRIPTION", "Latest updates from the blog"),
            admin_password_hash: optional_env("ADMIN_PASSWORD_HASH"),

            // Mail
            mail: MailSettings {
                smtp_host: optional_env("SMTP_HOST"),
                smtp_port: parse_env_u16("SMTP_PORT", 587)?,
                smtp_username: optional_env("SMTP_USERNAME"),
                smtp_password: optional_env("SMTP_PASSWORD"),
                smtp_starttls: parse_env_bool("SMTP_STARTTLS", true)?,
                from: env_or_default("EMAIL_FROM", "Blog Newsletter <noreply@localhost>"),
            },
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("BLOG_BASE_URL", &self.blog_base_url),
            ("RSS_FEED_URL", &self.rss_feed_url),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: format!("not a valid URL: '{value}'"),
                });
            }
        }
        if self.scrape.max_pages == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SCRAPE_MAX_PAGES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.scrape.scroll_step_px == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SCROLL_STEP_PX".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.mail.from.parse::<lettre::message::Mailbox>().is_err() {
            return Err(ConfigError::InvalidValue {
                name: "EMAIL_FROM".to_string(),
                message: format!("not a valid mailbox: '{}'", self.mail.from),
            });
        }
        Ok(())
    }

    /// Configuration with every field populated, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            blog_base_url: "https://blog.example.com/blog".to_string(),
            rss_feed_url: "https://blog.example.com/blog-feed.xml".to_string(),
            scrape: ScrapeSettings::default(),
            scrape_interval: None,
            database_path: PathBuf::from(":memory:"),
            web_host: "127.0.0.1".to_string(),
            web_port: 3000,
            public_base_url: "https://blog.example.com".to_string(),
            blog_title: "Test Blog".to_string(),
            blog_description: "Posts for testing".to_string(),
            admin_password_hash: None,
            mail: MailSettings {
                smtp_port: 587,
                smtp_starttls: true,
                from: "Test Blog <noreply@example.com>".to_string(),
                ..MailSettings::default()
            },
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}
