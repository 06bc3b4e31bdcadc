use crate::error::{ClientError, ClientResult};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use url::Url;

/// Default HTTP timeout, matching the app's shared API client.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub checkout: CheckoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    /// App-registered return target for the hosted checkout.
    pub redirect_uri: String,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl AppConfig {
    pub fn new(base_url: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            backend: BackendConfig {
                base_url: base_url.into(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            },
            checkout: CheckoutConfig {
                redirect_uri: redirect_uri.into(),
            },
        }
    }

    /// Reject URLs that cannot be parsed and a zero timeout.
    pub fn validate(&self) -> ClientResult<()> {
        Url::parse(&self.backend.base_url).map_err(|err| {
            ClientError::Config(format!(
                "invalid backend.base_url '{}': {err}",
                self.backend.base_url
            ))
        })?;
        Url::parse(&self.checkout.redirect_uri).map_err(|err| {
            ClientError::Config(format!(
                "invalid checkout.redirect_uri '{}': {err}",
                self.checkout.redirect_uri
            ))
        })?;
        if self.backend.timeout_secs == 0 {
            return Err(ClientError::Config(
                "backend.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> ClientResult<AppConfig> {
    let mut builder = Config::builder()
        .add_source(File::with_name("companion").required(false))
        .add_source(Environment::with_prefix("COMPANION").separator("__"));

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        .build()
        .map_err(|err| ClientError::Config(err.to_string()))?;

    let parsed: AppConfig = config
        .try_deserialize()
        .map_err(|err| ClientError::Config(err.to_string()))?;

    parsed.validate()?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
[backend]
base_url = "https://api.example.com/api/v1/"

[checkout]
redirect_uri = "companion://checkout-complete"
"#,
        );

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.backend.base_url, "https://api.example.com/api/v1/");
        assert_eq!(config.backend.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.checkout.redirect_uri, "companion://checkout-complete");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let file = write_config(
            r#"
[backend]
base_url = "not a url"
timeout_secs = 5

[checkout]
redirect_uri = "companion://checkout-complete"
"#,
        );

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = AppConfig::new("http://localhost:5056", "companion://done");
        config.backend.timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
