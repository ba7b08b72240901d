//! Connection configuration for the client filesystem.

use std::time::Duration;

use crate::errors::{FsError, FsResult};

/// Default HTTP round-trip timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default scratch directory on the remote server.
pub const DEFAULT_TEMP_DIR: &str = "/tmp";

/// Settings for connecting to a WebDAV server.
///
/// Credentials are mutually exclusive: either a username/password pair or a
/// bearer token, never both. [`validate`](Config::validate) enforces this.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Base URL of the WebDAV server, e.g.
    /// `https://dav.example.com/remote.php/dav/files/user/`. Required.
    pub url: String,
    /// Username for HTTP Basic authentication.
    pub username: Option<String>,
    /// Password for HTTP Basic authentication.
    pub password: Option<String>,
    /// Bearer token, mutually exclusive with username/password.
    pub bearer_token: Option<String>,
    /// Round-trip timeout; [`DEFAULT_TIMEOUT`] when unset.
    pub timeout: Option<Duration>,
    /// Transport override. When unset a client is built with the
    /// configured timeout.
    pub http_client: Option<reqwest::blocking::Client>,
    /// Scratch directory path on the server; [`DEFAULT_TEMP_DIR`] when
    /// unset.
    pub temp_dir: Option<String>,
}

impl Config {
    pub fn new(url: impl Into<String>) -> Config {
        Config {
            url: url.into(),
            ..Config::default()
        }
    }

    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Config {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> Config {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Config {
        self.timeout = Some(timeout);
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<String>) -> Config {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn http_client(mut self, client: reqwest::blocking::Client) -> Config {
        self.http_client = Some(client);
        self
    }

    /// Check the configuration for the invariants the client relies on.
    pub fn validate(&self) -> FsResult<()> {
        if self.url.is_empty() {
            return Err(FsError::Config {
                field: "url".to_string(),
                reason: "url is required".to_string(),
            });
        }
        let has_basic = self.username.as_deref().is_some_and(|s| !s.is_empty())
            || self.password.as_deref().is_some_and(|s| !s.is_empty());
        let has_bearer = self.bearer_token.as_deref().is_some_and(|s| !s.is_empty());
        if has_basic && has_bearer {
            return Err(FsError::Config {
                field: "authentication".to_string(),
                reason: "bearer token and username/password are mutually exclusive".to_string(),
            });
        }
        Ok(())
    }
}
