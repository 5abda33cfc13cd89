//! Session acquisition and per-bucket client construction.

use anyhow::anyhow;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::Region;

use crate::config::S3Config;
use crate::error::{BoxError, TransferError};
use crate::path::ObjectPath;
use crate::retry::RetryPolicy;

/// An authenticated, configured connection context.
///
/// Immutable after construction and stateless with respect to individual
/// transfers: one session may serve any number of concurrent operations.
pub struct Session {
    config: S3Config,
    credentials: Credentials,
}

impl Session {
    /// Establish a session and confirm reachability with a zero-result
    /// listing probe against the bucket named by `path`.
    ///
    /// Client construction and the probe are retried uniformly with
    /// increasing backoff. Every exhausted-retry exit carries the last
    /// failure as [`TransferError::Connection`].
    pub async fn acquire(config: S3Config, path: &str) -> Result<Self, TransferError> {
        let probe = ObjectPath::parse(path)?;
        let policy = RetryPolicy::default();

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!("attempt {} to open session for s3://{}", attempt, probe.bucket);

            match Self::connect(&config, &probe.bucket).await {
                Ok(session) => {
                    tracing::debug!("session established for s3://{}", probe.bucket);
                    return Ok(session);
                }
                Err(source) if attempt < policy.attempts => {
                    let pause = policy.backoff(attempt);
                    tracing::warn!(
                        "session attempt {} failed: {} (retrying in {:?})",
                        attempt,
                        source,
                        pause
                    );
                    tokio::time::sleep(pause).await;
                }
                Err(source) => {
                    return Err(TransferError::Connection {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    async fn connect(config: &S3Config, probe_bucket: &str) -> Result<Self, BoxError> {
        let session = Self {
            config: config.clone(),
            credentials: credentials(config)?,
        };

        let bucket = session.bucket(probe_bucket)?;
        let (_, code) = bucket
            .list_page(String::new(), None, None, None, Some(0))
            .await?;
        if code != 200 {
            return Err(anyhow!("health probe returned HTTP {}", code).into());
        }

        Ok(session)
    }

    /// Session over static credentials without the reachability probe, for
    /// exercising transfers against a local endpoint.
    #[cfg(test)]
    pub(crate) fn without_probe(config: S3Config) -> Self {
        let credentials = credentials(&config).expect("static credentials");
        Self {
            config,
            credentials,
        }
    }

    /// Client for one bucket under this session's configuration.
    pub(crate) fn bucket(&self, name: &str) -> Result<Box<Bucket>, BoxError> {
        let endpoint = if self.config.endpoint.is_empty() {
            self.config.default_endpoint()
        } else {
            self.config.endpoint.clone()
        };
        let region = Region::Custom {
            region: self.config.region.clone(),
            endpoint,
        };

        let bucket = Bucket::new(name, region, self.credentials.clone())?;
        Ok(if self.config.force_path_style {
            bucket.with_path_style()
        } else {
            bucket
        })
    }
}

fn credentials(config: &S3Config) -> Result<Credentials, BoxError> {
    let creds = if config.access_key.is_empty() {
        // Default provider chain: environment, then shared profile.
        Credentials::default()?
    } else {
        Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            if config.security_token.is_empty() {
                None
            } else {
                Some(&config.security_token)
            },
            None,
            None,
        )?
    };
    Ok(creds)
}
