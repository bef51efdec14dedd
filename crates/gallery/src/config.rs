use std::{env, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_UPLOADS_DIR: &str = "uploads";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3001";
const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Per-IP request ceilings applied by the HTTP layer.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    /// Requests allowed per window on every `/api` route.
    pub max_requests: u32,
    /// Uploads allowed per window, on top of the general limit.
    pub max_uploads: u32,
    /// Key clients by `X-Forwarded-For` rather than the socket peer. Only safe when
    /// a reverse proxy in front of the server overwrites that header.
    pub trust_proxy: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
            max_uploads: 20,
            trust_proxy: false,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let window = parse_var::<u64>("RATE_LIMIT_WINDOW_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.window);
        if window.is_zero() {
            return Err(ConfigError::InvalidVar("RATE_LIMIT_WINDOW_SECS"));
        }

        let max_requests =
            parse_var::<u32>("RATE_LIMIT_MAX_REQUESTS")?.unwrap_or(defaults.max_requests);
        if max_requests == 0 {
            return Err(ConfigError::InvalidVar("RATE_LIMIT_MAX_REQUESTS"));
        }

        let max_uploads =
            parse_var::<u32>("RATE_LIMIT_MAX_UPLOADS")?.unwrap_or(defaults.max_uploads);
        if max_uploads == 0 {
            return Err(ConfigError::InvalidVar("RATE_LIMIT_MAX_UPLOADS"));
        }

        let trust_proxy = parse_flag("TRUST_PROXY")?.unwrap_or(defaults.trust_proxy);

        Ok(Self {
            window,
            max_requests,
            max_uploads,
            trust_proxy,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GalleryConfig {
    pub listen_addr: String,
    /// The single flat directory holding originals, thumbnails and sidecars.
    pub uploads_dir: PathBuf,
    /// Prefix for the `url` and `thumbnail` fields of every record.
    pub public_base_url: String,
    pub cors_origins: Vec<String>,
    pub environment: Environment,
    pub max_upload_bytes: usize,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for environment variable `{0}`")]
    InvalidVar(&'static str),
}

impl GalleryConfig {
    /// Configuration with every default applied, rooted at `uploads_dir`.
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            uploads_dir: uploads_dir.into(),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            cors_origins: cors_origins(None),
            environment: Environment::Development,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            rate_limit: RateLimitConfig::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = match env::var("GALLERY_LISTEN_ADDR") {
            Ok(addr) if !addr.is_empty() => addr,
            _ => {
                let port = parse_var::<u16>("PORT")?.unwrap_or(DEFAULT_PORT);
                format!("0.0.0.0:{port}")
            }
        };

        let uploads_dir = env::var("GALLERY_UPLOADS_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_DIR));

        let public_base_url = normalize_base_url(
            &env::var("BASE_URL").unwrap_or_else(|_| DEFAULT_PUBLIC_BASE_URL.to_string()),
        );
        if public_base_url.is_empty() {
            return Err(ConfigError::InvalidVar("BASE_URL"));
        }

        let cors_origins = cors_origins(env::var("FRONTEND_URL").ok());

        let environment = env::var("GALLERY_ENV")
            .or_else(|_| env::var("NODE_ENV"))
            .map(|v| Environment::parse(&v))
            .unwrap_or(Environment::Development);

        let max_upload_bytes =
            parse_var::<usize>("GALLERY_MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        if max_upload_bytes == 0 {
            return Err(ConfigError::InvalidVar("GALLERY_MAX_UPLOAD_BYTES"));
        }

        let rate_limit = RateLimitConfig::from_env()?;

        tracing::info!(
            listen_addr = %listen_addr,
            uploads_dir = %uploads_dir.display(),
            public_base_url = %public_base_url,
            environment = environment.as_str(),
            "Gallery config loaded"
        );

        Ok(Self {
            listen_addr,
            uploads_dir,
            public_base_url,
            cors_origins,
            environment,
            max_upload_bytes,
            rate_limit,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar(name)),
        _ => Ok(None),
    }
}

fn parse_flag(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => flag_value(&value)
            .map(Some)
            .ok_or(ConfigError::InvalidVar(name)),
        _ => Ok(None),
    }
}

fn flag_value(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn cors_origins(frontend_url: Option<String>) -> Vec<String> {
    let mut origins = vec![DEFAULT_FRONTEND_ORIGIN.to_string()];
    if let Some(url) = frontend_url.map(|u| normalize_base_url(&u)) {
        if !url.is_empty() && !origins.contains(&url) {
            origins.push(url);
        }
    }
    origins
}
