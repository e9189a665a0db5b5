//! Command-line surface: argument definitions and the per-command flows.

pub mod start;
pub mod stop;
pub mod submit;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::cancel::CancelToken;
use crate::config::{
    ApiConfig, Environment, PollPolicy, StorageCredentials, DEFAULT_DATAPROC_ENDPOINT,
    DEFAULT_STORAGE_ENDPOINT, DEFAULT_UPLOAD_CONCURRENCY,
};
use crate::dataproc::ClusterApi;
use crate::storage::BlobStore;
use crate::Result;

pub use start::StartArgs;
pub use stop::StopArgs;
pub use submit::SubmitArgs;

#[derive(Parser, Debug)]
#[command(version, about = "Start, stop and submit to Hail clusters on Dataproc", long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,

    /// Google project, overriding the ambient default.
    #[arg(long, global = true, env = "CLOUDSDK_CORE_PROJECT")]
    pub project: Option<String>,

    /// Google region, overriding the ambient default.
    #[arg(long, global = true, env = "CLOUDSDK_COMPUTE_REGION")]
    pub region: Option<String>,

    /// OAuth bearer token for the Dataproc API.
    #[arg(long, global = true, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// HMAC access id for the storage interoperability API.
    #[arg(long, global = true, env = "GCS_HMAC_ACCESS_ID", hide_env_values = true)]
    pub hmac_access_id: Option<String>,

    #[arg(long, global = true, env = "GCS_HMAC_SECRET", hide_env_values = true)]
    pub hmac_secret: Option<String>,

    #[arg(long, global = true, default_value = DEFAULT_DATAPROC_ENDPOINT)]
    pub dataproc_endpoint: String,

    #[arg(long, global = true, default_value = DEFAULT_STORAGE_ENDPOINT)]
    pub storage_endpoint: String,

    /// Seconds between status checks while waiting.
    #[arg(long, global = true, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: u64,

    /// Give up waiting after this many seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Maximum number of files uploaded at once.
    #[arg(long, global = true, default_value_t = DEFAULT_UPLOAD_CONCURRENCY)]
    pub upload_concurrency: usize,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a Dataproc cluster configured for Hail
    Start(StartArgs),
    /// Shut down a Dataproc cluster
    Stop(StopArgs),
    /// Submit a Python script to a running cluster
    Submit(SubmitArgs),
}

impl Args {
    pub fn environment(&self) -> Result<Environment> {
        Environment::resolve(self.project.clone(), self.region.clone())
    }

    pub fn api_config(&self) -> ApiConfig {
        let storage_credentials = match (&self.hmac_access_id, &self.hmac_secret) {
            (Some(access_id), Some(secret)) => Some(StorageCredentials {
                access_id: access_id.clone(),
                secret: secret.clone(),
            }),
            _ => None,
        };
        ApiConfig {
            dataproc_endpoint: self.dataproc_endpoint.clone(),
            storage_endpoint: self.storage_endpoint.clone(),
            access_token: self.access_token.clone(),
            storage_credentials,
            ..ApiConfig::default()
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval),
            deadline: self.timeout.map(Duration::from_secs),
        }
    }
}

/// Everything a command flow needs to talk to the outside world.
#[derive(Clone)]
pub struct Context {
    pub env: Environment,
    pub clusters: Arc<dyn ClusterApi>,
    pub store: Arc<dyn BlobStore>,
    pub poll: PollPolicy,
    pub cancel: CancelToken,
    pub upload_concurrency: usize,
}

/// Run one command, writing progress and outcome lines to `out`.
pub async fn dispatch(command: &Commands, ctx: &Context, out: &mut (dyn Write + Send)) -> Result<()> {
    match command {
        Commands::Start(args) => start::run(args, ctx, out).await,
        Commands::Stop(args) => stop::run(args, ctx, out).await,
        Commands::Submit(args) => submit::run(args, ctx, out).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_the_subcommand() {
        let args = Args::try_parse_from([
            "cloudtools",
            "stop",
            "cluster-a",
            "--project",
            "proj",
            "--region",
            "europe-west1",
            "--poll-interval",
            "2",
            "--timeout",
            "600",
        ])
        .unwrap();

        assert_eq!(
            args.environment().unwrap(),
            Environment {
                project: "proj".into(),
                region: "europe-west1".into(),
            }
        );
        assert_eq!(
            args.poll_policy(),
            PollPolicy {
                interval: Duration::from_secs(2),
                deadline: Some(Duration::from_secs(600)),
            }
        );
        match args.command {
            Commands::Stop(stop) => assert_eq!(stop.name, "cluster-a"),
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        assert!(Args::try_parse_from(["cloudtools", "stop", "c", "--poll-interval", "0"]).is_err());
    }

    #[test]
    fn storage_credentials_need_both_halves() {
        let args = Args::try_parse_from([
            "cloudtools",
            "stop",
            "c",
            "--hmac-access-id",
            "GOOG1",
            "--hmac-secret",
            "s3cr3t",
        ])
        .unwrap();
        let creds = args.api_config().storage_credentials.unwrap();
        assert_eq!(creds.access_id, "GOOG1");

        let mut args = args;
        args.hmac_secret = None;
        assert!(args.api_config().storage_credentials.is_none());
    }
}
