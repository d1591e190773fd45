use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{AuthError, AuthResult};

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_millis))
}

fn default_credentials_path() -> PathBuf {
    let base = env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(".admin-console").join("credentials.json")
}

/// Remote paths of the auth endpoints, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPaths {
    pub login: String,
    pub register: String,
    pub profile: String,
    pub change_password: String,
    pub users: String,
}

impl EndpointPaths {
    pub fn from_env() -> Self {
        Self {
            login: env_string("CONSOLE_PATH_LOGIN", "/auth/login"),
            register: env_string("CONSOLE_PATH_REGISTER", "/auth/register"),
            profile: env_string("CONSOLE_PATH_PROFILE", "/auth/profile"),
            change_password: env_string("CONSOLE_PATH_CHANGE_PASSWORD", "/auth/change-password"),
            users: env_string("CONSOLE_PATH_USERS", "/auth/users"),
        }
    }

    pub fn user(&self, id: &str) -> String {
        format!("{}/{}", self.users.trim_end_matches('/'), id)
    }
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            login: "/auth/login".into(),
            register: "/auth/register".into(),
            profile: "/auth/profile".into(),
            change_password: "/auth/change-password".into(),
            users: "/auth/users".into(),
        }
    }
}

/// Console configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub api_base_url: String,
    pub credentials_path: PathBuf,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub endpoints: EndpointPaths,
}

impl ConsoleConfig {
    pub fn from_env() -> AuthResult<Self> {
        let api_base_url = env_string("CONSOLE_API_URL", "http://localhost:5000/api");
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(AuthError::Config(format!(
                "CONSOLE_API_URL must be an http(s) URL, got '{api_base_url}'"
            )));
        }

        let credentials_path = env::var_os("CONSOLE_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_credentials_path);

        Ok(Self {
            api_base_url,
            credentials_path,
            request_timeout: env_duration_millis("CONSOLE_REQUEST_TIMEOUT_MS", 30_000),
            connect_timeout: env_duration_millis("CONSOLE_CONNECT_TIMEOUT_MS", 10_000),
            endpoints: EndpointPaths::from_env(),
        })
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_path_appends_id() {
        let paths = EndpointPaths::default();
        assert_eq!(paths.user("42"), "/auth/users/42");

        let trailing = EndpointPaths {
            users: "/v2/users/".into(),
            ..EndpointPaths::default()
        };
        assert_eq!(trailing.user("abc"), "/v2/users/abc");
    }

    #[test]
    fn builder_overrides_replace_env_values() {
        let config = ConsoleConfig {
            api_base_url: "http://localhost:5000/api".into(),
            credentials_path: PathBuf::from("/tmp/a.json"),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            endpoints: EndpointPaths::default(),
        }
        .with_api_base_url("https://school.example/api")
        .with_credentials_path("/tmp/b.json");

        assert_eq!(config.api_base_url, "https://school.example/api");
        assert_eq!(config.credentials_path, PathBuf::from("/tmp/b.json"));
    }
}
