//! API Configuration Module
//!
//! Two configuration groups, both loaded from environment variables with
//! defaults:
//! - [`ApiConfig`]: CORS, the global per-IP flood limiter and proxy trust
//! - [`ForgeConfig`]: tag cache, build naming, dispatch quota and artifact
//!   proxy behaviour
//!
//! GitHub connection settings live in `tagforge_github::GithubConfig`.

use std::str::FromStr;
use std::time::Duration;

use tagforge_core::ConfigError;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// HTTP hardening settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins.
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Flood Limiting Configuration
    // ========================================================================
    /// Whether the global per-IP limiter is enabled.
    pub rate_limit_enabled: bool,

    /// Requests per minute per client IP.
    pub rate_limit_per_minute: u32,

    /// Burst capacity.
    pub rate_limit_burst: u32,

    // ========================================================================
    // Client Identification
    // ========================================================================
    /// Honour `X-Forwarded-For` / `X-Real-IP` when identifying clients.
    pub trust_proxy_headers: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,

            rate_limit_enabled: true,
            rate_limit_per_minute: 120,
            rate_limit_burst: 20,

            trust_proxy_headers: false,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TAGFORGE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `TAGFORGE_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `TAGFORGE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `TAGFORGE_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `TAGFORGE_RATE_LIMIT_PER_MINUTE`: Requests per minute per IP (default: 120)
    /// - `TAGFORGE_RATE_LIMIT_BURST`: Burst capacity (default: 20)
    /// - `TAGFORGE_TRUST_PROXY_HEADERS`: "true" or "false" (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let cors_origins = lookup("TAGFORGE_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = lookup("TAGFORGE_CORS_ALLOW_CREDENTIALS")
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(defaults.cors_allow_credentials);

        let cors_max_age_secs = lookup("TAGFORGE_CORS_MAX_AGE_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        let rate_limit_enabled = lookup("TAGFORGE_RATE_LIMIT_ENABLED")
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.rate_limit_enabled);

        let rate_limit_per_minute = lookup("TAGFORGE_RATE_LIMIT_PER_MINUTE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rate_limit_per_minute);

        let rate_limit_burst = lookup("TAGFORGE_RATE_LIMIT_BURST")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rate_limit_burst);

        let trust_proxy_headers = lookup("TAGFORGE_TRUST_PROXY_HEADERS")
            .map(|s| matches!(s.to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(defaults.trust_proxy_headers);

        Self {
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs,
            rate_limit_enabled,
            rate_limit_per_minute,
            rate_limit_burst,
            trust_proxy_headers,
        }
    }
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

pub const DEFAULT_PROJECT_NAME: &str = "aseprite";
pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_ARTIFACT_FILENAME: &str = "aseprite.zip";

/// Behaviour of the tag cache, build aggregation, dispatching and the
/// artifact proxy.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// `<project>` in `Build <project> v<version>` run names.
    pub project_name: String,
    /// Git ref the build workflow is dispatched on.
    pub branch: String,
    pub tag_cache_ttl: Duration,
    pub artifact_cache_ttl: Duration,
    /// File name offered for the proxied artifact download.
    pub artifact_filename: String,
    /// Dispatches allowed per client per window.
    pub dispatch_limit: u32,
    /// Dispatch quota window, aligned to the Unix epoch.
    pub dispatch_window: Duration,
    /// How long an accepted dispatch blocks repeats of the same tag.
    pub dispatch_grace: Duration,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            tag_cache_ttl: Duration::from_secs(3600),
            artifact_cache_ttl: Duration::from_secs(3600),
            artifact_filename: DEFAULT_ARTIFACT_FILENAME.to_string(),
            dispatch_limit: 2,
            dispatch_window: Duration::from_secs(86400),
            dispatch_grace: Duration::from_secs(600),
        }
    }
}

impl ForgeConfig {
    /// Create ForgeConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TAGFORGE_PROJECT_NAME` (default: aseprite)
    /// - `TAGFORGE_BRANCH` (default: master)
    /// - `TAGFORGE_TAG_CACHE_TTL_SECS` (default: 3600)
    /// - `TAGFORGE_ARTIFACT_CACHE_TTL_SECS` (default: 3600)
    /// - `TAGFORGE_ARTIFACT_FILENAME` (default: aseprite.zip)
    /// - `TAGFORGE_DISPATCH_LIMIT` (default: 2)
    /// - `TAGFORGE_DISPATCH_WINDOW_SECS` (default: 86400)
    /// - `TAGFORGE_DISPATCH_GRACE_SECS` (default: 600)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable numbers are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let project_name = non_empty(&lookup, "TAGFORGE_PROJECT_NAME")?
            .unwrap_or(defaults.project_name);
        let branch = non_empty(&lookup, "TAGFORGE_BRANCH")?.unwrap_or(defaults.branch);
        let artifact_filename = non_empty(&lookup, "TAGFORGE_ARTIFACT_FILENAME")?
            .unwrap_or(defaults.artifact_filename);
        if artifact_filename.contains(['"', '/', '\\']) {
            return Err(ConfigError::InvalidValue {
                field: "TAGFORGE_ARTIFACT_FILENAME".to_string(),
                value: artifact_filename,
                reason: "must be a bare file name".to_string(),
            });
        }

        let tag_cache_ttl = parse_secs(&lookup, "TAGFORGE_TAG_CACHE_TTL_SECS")?
            .unwrap_or(defaults.tag_cache_ttl);
        let artifact_cache_ttl = parse_secs(&lookup, "TAGFORGE_ARTIFACT_CACHE_TTL_SECS")?
            .unwrap_or(defaults.artifact_cache_ttl);
        let dispatch_grace = parse_secs(&lookup, "TAGFORGE_DISPATCH_GRACE_SECS")?
            .unwrap_or(defaults.dispatch_grace);

        let dispatch_limit = parse::<u32, _>(&lookup, "TAGFORGE_DISPATCH_LIMIT")?
            .unwrap_or(defaults.dispatch_limit);
        if dispatch_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "TAGFORGE_DISPATCH_LIMIT".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let dispatch_window = parse_secs(&lookup, "TAGFORGE_DISPATCH_WINDOW_SECS")?
            .unwrap_or(defaults.dispatch_window);
        if dispatch_window.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "TAGFORGE_DISPATCH_WINDOW_SECS".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            project_name,
            branch,
            tag_cache_ttl,
            artifact_cache_ttl,
            artifact_filename,
            dispatch_limit,
            dispatch_window,
            dispatch_grace,
        })
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Err(ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw,
            reason: "must not be empty".to_string(),
        }),
        Some(raw) => Ok(Some(raw.trim().to_string())),
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse::<u64, _>(lookup, key)?.map(Duration::from_secs))
}
