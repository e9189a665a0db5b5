//! Explicit configuration handed to builders and clients.
//!
//! Values are populated once at process start (see [`crate::cmd::Args`]);
//! nothing in the library reads environment variables or local tool
//! configuration on its own.

use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_DATAPROC_ENDPOINT: &str = "https://dataproc.googleapis.com";
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

/// Project and region every request is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub project: String,
    pub region: String,
}

impl Environment {
    /// Build an environment from optional overrides, failing if either
    /// value is missing or blank.
    pub fn resolve(project: Option<String>, region: Option<String>) -> Result<Self> {
        let project = non_blank(project)
            .ok_or_else(|| Error::validation("no project given; pass --project or set CLOUDSDK_CORE_PROJECT"))?;
        let region = non_blank(region)
            .ok_or_else(|| Error::validation("no region given; pass --region or set CLOUDSDK_COMPUTE_REGION"))?;
        Ok(Self { project, region })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// HMAC key pair for the storage interoperability API.
#[derive(Debug, Clone)]
pub struct StorageCredentials {
    pub access_id: String,
    pub secret: String,
}

/// Endpoints and credentials for the remote APIs.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub dataproc_endpoint: String,
    pub storage_endpoint: String,
    pub access_token: Option<String>,
    pub storage_credentials: Option<StorageCredentials>,
    pub http_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            dataproc_endpoint: DEFAULT_DATAPROC_ENDPOINT.to_string(),
            storage_endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
            access_token: None,
            storage_credentials: None,
            http_timeout: Duration::from_secs(60),
        }
    }
}

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to sleep after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.base_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// How often and for how long to poll a remote resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Give up after this long. `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
        }
    }
}
