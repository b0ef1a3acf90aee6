//! Runtime configuration loaded from the environment (and `.env` via dotenvy).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_TEMPLATE_DIR: &str = "./uploads/templates";
const DEFAULT_ZAMZAR_ENDPOINT: &str = "https://api.zamzar.com/v1";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_LETTER_TIMEOUT_SECS: u64 = 60;

/// Which conversion backend turns rendered documents into PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterKind {
    Remote,
    Local,
}

impl FromStr for ConverterKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "remote" | "zamzar" => Ok(Self::Remote),
            "local" | "soffice" | "libreoffice" => Ok(Self::Local),
            other => Err(anyhow!("unknown PDF_CONVERTER '{}', expected remote or local", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteConverterConfig {
    pub api_key: String,
    pub endpoint: String,
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct LocalConverterConfig {
    pub soffice_bin: String,
}

#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub kind: ConverterKind,
    pub remote: RemoteConverterConfig,
    pub local: LocalConverterConfig,
}

/// Credentials for the Cloudinary image store used for template logos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub template_dir: PathBuf,
    pub converter: ConverterConfig,
    pub cloudinary: Option<CloudinaryConfig>,
    pub letter_timeout: Duration,
    pub expose_error_details: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = required_secret("JWT_SECRET", env::var("JWT_SECRET").ok())?;
        let kind = match env::var("PDF_CONVERTER") {
            Ok(value) => value.parse()?,
            Err(_) => ConverterKind::Remote,
        };

        let api_key = env::var("ZAMZAR_API_KEY").unwrap_or_default();
        if kind == ConverterKind::Remote && api_key.is_empty() {
            return Err(anyhow!("ZAMZAR_API_KEY must be set when PDF_CONVERTER=remote"));
        }

        let converter = ConverterConfig {
            kind,
            remote: RemoteConverterConfig {
                api_key,
                endpoint: env_or("ZAMZAR_ENDPOINT", DEFAULT_ZAMZAR_ENDPOINT),
                poll_interval: Duration::from_millis(parse_env(
                    "CONVERSION_POLL_INTERVAL_MS",
                    DEFAULT_POLL_INTERVAL_MS,
                )?),
                max_attempts: parse_env("CONVERSION_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            },
            local: LocalConverterConfig {
                soffice_bin: env_or("SOFFICE_BIN", "soffice"),
            },
        };

        let app_env = env_or("APP_ENV", "production");

        Ok(Self {
            database_url,
            bind_addr: env_or("BIND_ADDR", DEFAULT_BIND_ADDR),
            jwt_secret,
            template_dir: PathBuf::from(env_or("TEMPLATE_DIR", DEFAULT_TEMPLATE_DIR)),
            converter,
            cloudinary: CloudinaryConfig::from_env(),
            letter_timeout: Duration::from_secs(parse_env(
                "LETTER_TIMEOUT_SECS",
                DEFAULT_LETTER_TIMEOUT_SECS,
            )?),
            expose_error_details: app_env == "development",
        })
    }
}

impl CloudinaryConfig {
    /// Returns `None` unless all three credentials are present.
    pub fn from_env() -> Option<Self> {
        let cloud_name = env::var("CLOUDINARY_CLOUD_NAME").ok()?;
        let api_key = env::var("CLOUDINARY_API_KEY").ok()?;
        let api_secret = env::var("CLOUDINARY_API_SECRET").ok()?;
        if cloud_name.is_empty() || api_key.is_empty() || api_secret.is_empty() {
            log::warn!("Cloudinary credentials incomplete, template logos will be stored locally");
            return None;
        }
        Some(Self {
            cloud_name,
            api_key,
            api_secret,
        })
    }
}

/// Secrets have no default; a blank value is treated as unset.
fn required_secret(key: &str, value: Option<String>) -> anyhow::Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{} must be set", key))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid value for {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}
