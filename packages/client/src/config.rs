//! Client configuration.
//!
//! A [`ClientConfig`] is either built in code or read from a JSON file:
//!
//! ```json
//! {
//!   "endpoint": "https://xbus.example.com:4433",
//!   "ca_cert_file": "/etc/xbus/ca.pem",
//!   "cert_file": "/etc/xbus/client.pem",
//!   "key_file": "/etc/xbus/client-key.pem",
//!   "request_timeout_secs": 30,
//!   "watch_grace_secs": 5,
//!   "initial_watch": "current"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WATCH_GRACE_SECS: u64 = 5;

/// What a config watch with `revision <= 0` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialWatch {
    /// Return the current value right away if the key exists.
    #[default]
    Current,
    /// Block until the next write after the request reaches the server.
    NextChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the xbus server, e.g. `https://xbus.example.com:4433`
    pub endpoint: String,

    /// PEM bundle used to verify the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_file: Option<PathBuf>,

    /// Client certificate for mutual TLS; requires `key_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    /// Client private key for mutual TLS; requires `cert_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    /// Deadline for every non-watch request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Extra time a watch request is given on top of its server-side timeout
    #[serde(default = "default_watch_grace_secs")]
    pub watch_grace_secs: u64,

    #[serde(default)]
    pub initial_watch: InitialWatch,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_watch_grace_secs() -> u64 {
    DEFAULT_WATCH_GRACE_SECS
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ca_cert_file: None,
            cert_file: None,
            key_file: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            watch_grace_secs: DEFAULT_WATCH_GRACE_SECS,
            initial_watch: InitialWatch::default(),
        }
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Reading {}...", path.display());
        let text = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: ClientConfig = serde_json::from_str(&text)
            .map_err(|e| Error::config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_ca_cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_file = Some(path.into());
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        self.cert_file = Some(cert_file.into());
        self.key_file = Some(key_file.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_watch_grace(mut self, grace: Duration) -> Self {
        self.watch_grace_secs = grace.as_secs();
        self
    }

    pub fn with_initial_watch(mut self, initial_watch: InitialWatch) -> Self {
        self.initial_watch = initial_watch;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn watch_grace(&self) -> Duration {
        Duration::from_secs(self.watch_grace_secs)
    }

    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| Error::config(format!("invalid endpoint {:?}: {}", self.endpoint, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::config(format!(
                "unsupported endpoint scheme {:?}",
                other
            ))),
        }
    }

    /// Check the configuration without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        self.endpoint_url()?;
        match (&self.cert_file, &self.key_file) {
            (Some(_), None) => Err(Error::config("missing key file")),
            (None, Some(_)) => Err(Error::config("missing cert file")),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("http://localhost:4433");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.watch_grace(), Duration::from_secs(5));
        assert_eq!(config.initial_watch, InitialWatch::Current);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cert_without_key_is_rejected() {
        let mut config = ClientConfig::new("https://localhost:4433");
        config.cert_file = Some(PathBuf::from("client.pem"));
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration: missing key file");
    }

    #[test]
    fn key_without_cert_is_rejected() {
        let mut config = ClientConfig::new("https://localhost:4433");
        config.key_file = Some(PathBuf::from("client-key.pem"));
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration: missing cert file");
    }

    #[test]
    fn bad_endpoint_is_rejected() {
        assert!(ClientConfig::new("not a url").validate().is_err());
        assert!(ClientConfig::new("ftp://host/").validate().is_err());
    }

    #[test]
    fn load_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"endpoint": "https://xbus:4433", "initial_watch": "next_change"}}"#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.endpoint, "https://xbus:4433");
        assert_eq!(config.initial_watch, InitialWatch::NextChange);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.ca_cert_file.is_none());
    }

    #[test]
    fn load_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"endpoint": "https://xbus:4433", "cert_file": "/etc/xbus/client.pem"}}"#
        )
        .unwrap();

        let err = ClientConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = ClientConfig::from_file("/nonexistent/xbus.json").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
