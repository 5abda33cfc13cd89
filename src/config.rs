//! Connection configuration.

use serde::{Deserialize, Serialize};

/// S3 connection settings.
///
/// Built once by the calling layer and handed to
/// [`Session::acquire`](crate::session::Session::acquire). [`S3Config::from_env`]
/// mirrors the conventional AWS environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Region identifier
    #[serde(default = "default_region")]
    pub region: String,
    /// Endpoint override. Empty means the AWS endpoint derived from the region.
    /// MinIO: http://localhost:9000
    #[serde(default)]
    pub endpoint: String,
    /// Use plain HTTP for the derived default endpoint
    #[serde(default)]
    pub disable_ssl: bool,
    /// Path-style addressing (MinIO and similar stores need this)
    #[serde(default)]
    pub force_path_style: bool,
    /// Static Access Key ID. Empty means the default provider chain.
    #[serde(default)]
    pub access_key: String,
    /// Static Secret Access Key
    #[serde(default)]
    pub secret_key: String,
    /// Session token for temporary credentials
    #[serde(default)]
    pub security_token: String,
}

fn default_region() -> String {
    "eu-central-1".to_string()
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: String::new(),
            disable_ssl: false,
            force_path_style: false,
            access_key: String::new(),
            secret_key: String::new(),
            security_token: String::new(),
        }
    }
}

impl S3Config {
    /// Read the configuration from the environment.
    ///
    /// Unset variables keep their defaults. Malformed boolean values are
    /// treated as `false`, no error is surfaced.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(region) = std::env::var("AWS_REGION") {
            if !region.is_empty() {
                config.region = region;
            }
        }
        if let Ok(endpoint) = std::env::var("AWS_S3_ENDPOINT") {
            config.endpoint = endpoint;
        }
        config.disable_ssl = bool_env("AWS_S3_NO_SSL");
        config.force_path_style = bool_env("AWS_S3_FORCE_PATH_STYLE");
        if let Ok(key) = std::env::var("AWS_ACCESS_KEY_ID") {
            config.access_key = key;
        }
        if let Ok(secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
            config.secret_key = secret;
        }
        if let Ok(token) = std::env::var("AWS_SESSION_TOKEN") {
            config.security_token = token;
        }
        config
    }

    /// AWS endpoint derived from the region when no override is configured.
    pub(crate) fn default_endpoint(&self) -> String {
        let scheme = if self.disable_ssl { "http" } else { "https" };
        format!("{}://s3.{}.amazonaws.com", scheme, self.region)
    }
}

fn bool_env(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<bool>().ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = S3Config::default();
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.endpoint, "");
        assert!(!config.disable_ssl);
        assert!(!config.force_path_style);
    }

    #[test]
    fn default_endpoint_follows_region_and_scheme() {
        let config = S3Config {
            region: "us-east-1".to_string(),
            ..S3Config::default()
        };
        assert_eq!(config.default_endpoint(), "https://s3.us-east-1.amazonaws.com");

        let config = S3Config {
            disable_ssl: true,
            ..S3Config::default()
        };
        assert_eq!(config.default_endpoint(), "http://s3.eu-central-1.amazonaws.com");
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: S3Config = serde_json::from_str(
            r#"{"endpoint": "http://localhost:9000", "force_path_style": true}"#,
        )
        .unwrap();
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.endpoint, "http://localhost:9000");
        assert!(config.force_path_style);
    }

    #[test]
    fn malformed_booleans_parse_as_false() {
        std::env::set_var("S3_COURIER_TEST_FLAG", "yes");
        assert!(!bool_env("S3_COURIER_TEST_FLAG"));

        std::env::set_var("S3_COURIER_TEST_FLAG", "true");
        assert!(bool_env("S3_COURIER_TEST_FLAG"));

        std::env::remove_var("S3_COURIER_TEST_FLAG");
        assert!(!bool_env("S3_COURIER_TEST_FLAG"));
    }
}
