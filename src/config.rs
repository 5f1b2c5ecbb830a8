//! Configuration loading from environment.
//!
//! Reads the remote API location, session cookie settings and listener
//! ports from environment variables. The protected path list can come from
//! a JSON file or a comma-separated variable.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TutorlyError};
use crate::matcher::{ProtectedPaths, DEFAULT_PROTECTED_PATHS};

/// Cookie name the auth provider issues by default.
pub const DEFAULT_SESSION_COOKIE: &str = "better-auth.session_token";
/// Session lookup endpoint on the remote API.
pub const DEFAULT_SESSION_ENDPOINT: &str = "/api/auth/get-session";
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WEB_PORT: u16 = 3000;

/// Main configuration for the Tutorly web server.
#[derive(Debug, Clone)]
pub struct TutorlyConfig {
    /// Base URL of the remote booking API, without trailing slash.
    pub api_url: String,
    /// Name of the session credential cookie.
    pub session_cookie: String,
    /// Path of the session lookup endpoint on the remote API.
    pub session_endpoint: String,
    /// Timeout for a single session lookup.
    pub session_timeout: Duration,
    /// Timeout for a single remote API call.
    pub api_timeout: Duration,
    /// Port for the web server.
    pub web_port: u16,
    /// Optional separate port for the health listener.
    pub health_port: Option<u16>,
    /// Whether cookies the server writes carry the `Secure` flag.
    pub cookie_secure: bool,
    /// Directory of static assets served as fallback.
    pub public_dir: Option<PathBuf>,
    /// Paths evaluated by the access gate.
    pub protected_paths: ProtectedPaths,
}

impl TutorlyConfig {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `API_URL` (or `NEXT_PUBLIC_API_URL`): remote booking API base URL
    ///
    /// Optional environment variables:
    /// - `SESSION_COOKIE_NAME`: session cookie (default: better-auth.session_token)
    /// - `SESSION_ENDPOINT`: session lookup path (default: /api/auth/get-session)
    /// - `SESSION_TIMEOUT_SECS`: session lookup timeout (default: 10)
    /// - `API_TIMEOUT_SECS`: remote API call timeout (default: 30)
    /// - `WEB_PORT`: listener port (default: 3000)
    /// - `HEALTH_PORT`: separate health listener port
    /// - `COOKIE_SECURE`: set `Secure` on cookies (default: false)
    /// - `PUBLIC_DIR`: static asset directory
    /// - `PROTECTED_PATHS_FILE`: JSON array of protected path patterns
    /// - `PROTECTED_PATHS`: comma-separated protected path patterns
    pub fn from_env() -> Result<Self> {
        let api_url = env::var("API_URL")
            .or_else(|_| env::var("NEXT_PUBLIC_API_URL"))
            .map_err(|_| TutorlyError::Config("API_URL not set".to_string()))?;
        let api_url = normalize_base_url(&api_url)?;

        let session_cookie = env::var("SESSION_COOKIE_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string());

        let session_endpoint = env::var("SESSION_ENDPOINT")
            .ok()
            .filter(|s| s.starts_with('/'))
            .unwrap_or_else(|| DEFAULT_SESSION_ENDPOINT.to_string());

        let session_timeout = Duration::from_secs(
            env::var("SESSION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS),
        );

        let api_timeout = Duration::from_secs(
            env::var("API_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_API_TIMEOUT_SECS),
        );

        let web_port = env::var("WEB_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_WEB_PORT);

        let health_port = env::var("HEALTH_PORT").ok().and_then(|s| s.parse().ok());

        let cookie_secure = env::var("COOKIE_SECURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);

        let public_dir = env::var("PUBLIC_DIR").ok().map(PathBuf::from);

        let protected_paths = load_protected_paths()?;

        Ok(Self {
            api_url,
            session_cookie,
            session_endpoint,
            session_timeout,
            api_timeout,
            web_port,
            health_port,
            cookie_secure,
            public_dir,
            protected_paths,
        })
    }

    /// Configuration pointing at `api_url` with every other value defaulted.
    pub fn for_api(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            session_endpoint: DEFAULT_SESSION_ENDPOINT.to_string(),
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            web_port: DEFAULT_WEB_PORT,
            health_port: None,
            cookie_secure: false,
            public_dir: None,
            protected_paths: ProtectedPaths::default(),
        }
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(TutorlyError::Config(format!(
            "API_URL must be an http(s) URL: {}",
            raw
        )));
    }
    Ok(trimmed.to_string())
}

/// Load protected paths from file or environment.
fn load_protected_paths() -> Result<ProtectedPaths> {
    if let Ok(path) = env::var("PROTECTED_PATHS_FILE") {
        return load_paths_from_file(&path);
    }

    let listed = parse_path_list("PROTECTED_PATHS");
    if listed.is_empty() {
        return ProtectedPaths::new(DEFAULT_PROTECTED_PATHS);
    }

    ProtectedPaths::new(listed)
}

/// Load patterns from a JSON file holding an array of strings.
fn load_paths_from_file(path: &str) -> Result<ProtectedPaths> {
    let path = Path::new(path);
    let content = fs::read_to_string(path).map_err(|e| {
        TutorlyError::Config(format!("Failed to read protected paths file: {}", e))
    })?;

    let patterns: Vec<String> = serde_json::from_str(&content).map_err(|e| {
        TutorlyError::Config(format!("Failed to parse protected paths file: {}", e))
    })?;

    ProtectedPaths::new(patterns)
}

/// Parse a comma-separated list from an environment variable.
fn parse_path_list(var_name: &str) -> Vec<String> {
    env::var(var_name)
        .ok()
        .map(|s| {
            s.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn normalize_strips_trailing_slash() {
        assert_eq!(
            normalize_base_url("https://api.example.com/").unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn normalize_rejects_non_http() {
        assert!(normalize_base_url("api.example.com").is_err());
        assert!(normalize_base_url("").is_err());
    }

    #[test]
    fn for_api_uses_defaults() {
        let config = TutorlyConfig::for_api("http://localhost:5000/");
        assert_eq!(config.api_url, "http://localhost:5000");
        assert_eq!(config.session_cookie, DEFAULT_SESSION_COOKIE);
        assert_eq!(config.session_endpoint, DEFAULT_SESSION_ENDPOINT);
        assert_eq!(config.web_port, DEFAULT_WEB_PORT);
        assert_eq!(config.api_timeout, Duration::from_secs(DEFAULT_API_TIMEOUT_SECS));
        assert!(config.protected_paths.matches("/logout"));
    }

    #[test]
    fn parse_path_list_empty() {
        let var_name = "TEST_TUTORLY_PATHS_EMPTY_41";
        env::remove_var(var_name);
        assert!(parse_path_list(var_name).is_empty());
    }

    #[test]
    fn parse_path_list_multiple() {
        let var_name = "TEST_TUTORLY_PATHS_MULTI_41";
        env::set_var(var_name, "/a, /b/:path*, ,/c");
        let result = parse_path_list(var_name);
        assert_eq!(result, vec!["/a", "/b/:path*", "/c"]);
        env::remove_var(var_name);
    }

    #[test]
    fn load_paths_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["/reports/:path*", "/logout"]"#).unwrap();

        let paths = load_paths_from_file(file.path().to_str().unwrap()).unwrap();
        assert!(paths.matches("/reports/q1"));
        assert!(paths.matches("/logout"));
        assert!(!paths.matches("/student-dashboard"));
    }

    #[test]
    fn load_paths_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let err = load_paths_from_file(missing.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn load_paths_from_malformed_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = load_paths_from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_path() -> impl Strategy<Value = String> {
        "/[a-z]{3,12}".prop_map(|s| s)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Every comma-separated entry survives parsing in order.
        #[test]
        fn prop_path_list_parsing(paths in prop::collection::vec(arb_path(), 1..8)) {
            let var_name = format!("TEST_TUTORLY_PROP_PATHS_{}", rand::random::<u32>());
            env::set_var(&var_name, paths.join(","));

            let parsed = parse_path_list(&var_name);
            env::remove_var(&var_name);

            prop_assert_eq!(paths, parsed);
        }
    }
}
