//! Locating and loading the client configuration.

use std::env;
use std::path::PathBuf;

use xbus_client::ClientConfig;

use crate::commands::CliError;

const CONFIG_ENV: &str = "XBUS_CONFIG";

/// `explicit`, then `$XBUS_CONFIG`, then `<config dir>/xbus/config.json`.
fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
        .or_else(|| dirs::config_dir().map(|dir| dir.join("xbus").join("config.json")))
}

/// Build the client configuration from the file (if any) and the endpoint
/// override.
pub fn load(explicit: Option<PathBuf>, endpoint: Option<String>) -> Result<ClientConfig, CliError> {
    let from_file = match config_path(explicit.clone()) {
        Some(path) if path.exists() => Some(ClientConfig::from_file(&path)?),
        // A path given on the command line has to exist.
        Some(path) if explicit.is_some() => {
            return Err(CliError::Usage(format!(
                "configuration file {} does not exist",
                path.display()
            )))
        }
        _ => None,
    };

    let config = match (from_file, endpoint) {
        (Some(mut config), Some(endpoint)) => {
            config.endpoint = endpoint;
            config
        }
        (Some(config), None) => config,
        (None, Some(endpoint)) => ClientConfig::new(endpoint),
        (None, None) => {
            return Err(CliError::Usage(
                "no configuration file found; pass --endpoint or --config".to_string(),
            ))
        }
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn endpoint_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"endpoint": "https://from-file:4433"}}"#).unwrap();

        let config = load(
            Some(file.path().to_path_buf()),
            Some("http://override:4433".to_string()),
        )
        .unwrap();
        assert_eq!(config.endpoint, "http://override:4433");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load(Some(PathBuf::from("/nonexistent/xbus.json")), None).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[test]
    fn explicit_file_wins() {
        let path = config_path(Some(PathBuf::from("/etc/xbus.json")));
        assert_eq!(path, Some(PathBuf::from("/etc/xbus.json")));
    }
}
