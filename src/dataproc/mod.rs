//! The managed cluster service: clusters and jobs.

pub mod model;
pub mod rest;

use async_trait::async_trait;

use crate::config::Environment;
use crate::payload::{ClusterSpec, JobSpec};
use crate::{RemoteResourceStatus, Result, State};

pub use rest::DataprocClient;

/// A cluster as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterInfo {
    pub name: String,
    pub status: RemoteResourceStatus,
    /// Staging bucket the provider created for this cluster.
    pub config_bucket: Option<String>,
}

impl From<model::ClusterResource> for ClusterInfo {
    fn from(resource: model::ClusterResource) -> Self {
        Self {
            status: resource.resource_status(),
            config_bucket: resource.config.and_then(|c| c.config_bucket),
            name: resource.cluster_name,
        }
    }
}

/// Handle on the long-running operation started by a create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub name: String,
}

/// Result of asking for a cluster to be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The provider started tearing the cluster down.
    Accepted,
    /// There was no such cluster; nothing to do.
    NotFound,
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<OperationHandle>;

    /// Delete a cluster. A missing cluster is [`DeleteOutcome::NotFound`],
    /// not an error.
    async fn delete_cluster(&self, name: &str) -> Result<DeleteOutcome>;

    /// Fetch one cluster. Fails with [`crate::Error::ResourceAbsent`] if
    /// it does not exist.
    async fn get_cluster(&self, name: &str) -> Result<ClusterInfo>;

    async fn list_clusters(&self) -> Result<Vec<ClusterInfo>>;

    /// Submit a job and return its id.
    async fn submit_job(&self, spec: &JobSpec) -> Result<String>;

    async fn get_job(&self, job_id: &str) -> Result<RemoteResourceStatus>;
}

/// Look a cluster up by name in the current listing.
pub async fn find_cluster(api: &dyn ClusterApi, name: &str) -> Result<Option<ClusterInfo>> {
    Ok(api
        .list_clusters()
        .await?
        .into_iter()
        .find(|c| c.name == name))
}

/// Status of a cluster being created. A cluster missing from the listing
/// is not visible yet and counts as pending.
pub async fn creation_status(api: &dyn ClusterApi, name: &str) -> Result<RemoteResourceStatus> {
    Ok(match find_cluster(api, name).await? {
        Some(cluster) => cluster.status,
        None => RemoteResourceStatus::new(name, State::Pending),
    })
}

/// Status of a cluster being deleted. A cluster missing from the listing
/// is gone.
pub async fn deletion_status(api: &dyn ClusterApi, name: &str) -> Result<RemoteResourceStatus> {
    Ok(match find_cluster(api, name).await? {
        Some(cluster) => cluster.status,
        None => RemoteResourceStatus::absent(name),
    })
}

pub fn cluster_console_url(name: &str, env: &Environment) -> String {
    format!(
        "https://console.cloud.google.com/dataproc/clusters/{}?project={}&region={}",
        name, env.project, env.region
    )
}

pub fn job_console_url(job_id: &str, env: &Environment) -> String {
    format!(
        "https://console.cloud.google.com/dataproc/jobs/{}?project={}&region={}",
        job_id, env.project, env.region
    )
}
