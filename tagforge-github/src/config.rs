//! GitHub client configuration.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tagforge_core::ConfigError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BUILD_REPOSITORY: &str = "MathiasDPX/aseprite-bin";
pub const DEFAULT_PROJECT_REPOSITORY: &str = "aseprite/aseprite";
pub const DEFAULT_WORKFLOW: &str = "specific-version.yml";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

// ============================================================================
// TOKEN
// ============================================================================

/// Personal access token that never shows up in logs.
#[derive(Clone)]
pub struct GithubToken(SecretString);

impl GithubToken {
    /// Wrap a token, rejecting empty values.
    pub fn new(token: String) -> Result<Self, ConfigError> {
        if token.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "GITHUB_PAT".to_string(),
            });
        }
        Ok(Self(SecretString::new(token.into())))
    }

    /// Expose the token (only for building the Authorization header).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for GithubToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GithubToken([REDACTED])")
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Where and how to reach GitHub.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// REST API base URL.
    pub api_url: String,
    pub token: GithubToken,
    /// `owner/name` of the repository whose tags are listed.
    pub project_repository: String,
    /// `owner/name` of the repository running the build workflow.
    pub build_repository: String,
    /// Workflow file name or numeric id.
    pub workflow: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl GithubConfig {
    /// Configuration with defaults for everything but the token.
    pub fn new(token: GithubToken) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token,
            project_repository: DEFAULT_PROJECT_REPOSITORY.to_string(),
            build_repository: DEFAULT_BUILD_REPOSITORY.to_string(),
            workflow: DEFAULT_WORKFLOW.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `GITHUB_PAT`: access token (required)
    /// - `TAGFORGE_GITHUB_API_URL`: API base URL (default: https://api.github.com)
    /// - `TAGFORGE_PROJECT_REPOSITORY`: tag source repository (default: aseprite/aseprite)
    /// - `TAGFORGE_BUILD_REPOSITORY` or `REPOSITORY`: build repository (default: MathiasDPX/aseprite-bin)
    /// - `TAGFORGE_WORKFLOW`: workflow file (default: specific-version.yml)
    /// - `TAGFORGE_UPSTREAM_TIMEOUT_SECS`: request timeout (default: 20)
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("GITHUB_PAT").map_err(|_| ConfigError::MissingRequired {
            field: "GITHUB_PAT".to_string(),
        })?;

        let mut config = Self::new(GithubToken::new(token)?);

        if let Ok(url) = std::env::var("TAGFORGE_GITHUB_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(repo) = std::env::var("TAGFORGE_PROJECT_REPOSITORY") {
            config.project_repository = validate_repository("TAGFORGE_PROJECT_REPOSITORY", repo)?;
        }
        if let Ok(repo) = std::env::var("TAGFORGE_BUILD_REPOSITORY")
            .or_else(|_| std::env::var("REPOSITORY"))
        {
            config.build_repository = validate_repository("TAGFORGE_BUILD_REPOSITORY", repo)?;
        }
        if let Ok(workflow) = std::env::var("TAGFORGE_WORKFLOW") {
            config.workflow = workflow;
        }
        if let Ok(raw) = std::env::var("TAGFORGE_UPSTREAM_TIMEOUT_SECS") {
            let secs = raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                field: "TAGFORGE_UPSTREAM_TIMEOUT_SECS".to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            config.timeout = Duration::from_secs(secs.max(1));
        }

        Ok(config)
    }
}

/// Accept only `owner/name` repository identifiers.
pub fn validate_repository(field: &str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    let valid = match trimmed.split_once('/') {
        Some((owner, name)) => !owner.is_empty() && !name.is_empty() && !name.contains('/'),
        None => false,
    };
    if valid {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
            reason: "expected owner/name".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_rejects_empty() {
        assert!(GithubToken::new(String::new()).is_err());
        assert!(GithubToken::new("   ".to_string()).is_err());
    }

    #[test]
    fn test_token_debug_is_redacted() -> Result<(), ConfigError> {
        let token = GithubToken::new("ghp_supersecret".to_string())?;
        let debug = format!("{:?}", token);
        assert!(!debug.contains("supersecret"));
        assert_eq!(token.expose(), "ghp_supersecret");
        Ok(())
    }

    #[test]
    fn test_defaults() -> Result<(), ConfigError> {
        let config = GithubConfig::new(GithubToken::new("t".to_string())?);
        assert_eq!(config.api_url, "https://api.github.com");
        assert_eq!(config.project_repository, "aseprite/aseprite");
        assert_eq!(config.build_repository, "MathiasDPX/aseprite-bin");
        assert_eq!(config.workflow, "specific-version.yml");
        assert_eq!(config.timeout, Duration::from_secs(20));
        Ok(())
    }

    #[test]
    fn test_validate_repository() {
        assert!(validate_repository("f", "owner/name".to_string()).is_ok());
        assert!(validate_repository("f", " owner/name ".to_string()).is_ok());
        assert!(validate_repository("f", "owner".to_string()).is_err());
        assert!(validate_repository("f", "/name".to_string()).is_err());
        assert!(validate_repository("f", "a/b/c".to_string()).is_err());
    }
}
