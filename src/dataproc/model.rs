//! Response shapes of the Dataproc v1 REST API, trimmed to the fields
//! this crate reads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::JobSpec;
use crate::{RemoteResourceStatus, State};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResource {
    pub cluster_name: String,
    #[serde(default)]
    pub config: Option<ClusterConfigResource>,
    /// Kept as raw JSON so an error status can be reported verbatim.
    #[serde(default)]
    pub status: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfigResource {
    #[serde(default)]
    pub config_bucket: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListClustersResponse {
    #[serde(default)]
    pub clusters: Vec<ClusterResource>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationResource {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResource {
    pub reference: JobReference,
    #[serde(default)]
    pub status: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest<'a> {
    pub job: &'a JobSpec,
    pub request_id: String,
}

/// Fold a Dataproc cluster state into [`State`].
pub fn cluster_state(raw: &str) -> State {
    match raw {
        "RUNNING" => State::Running,
        "ERROR" | "ERROR_DUE_TO_UPDATE" => State::Error,
        "DELETING" => State::Deleting,
        _ => State::Pending,
    }
}

/// Fold a Dataproc job state into [`State`].
pub fn job_state(raw: &str) -> State {
    match raw {
        "RUNNING" => State::Running,
        "DONE" => State::Done,
        "ERROR" | "ATTEMPT_FAILURE" | "CANCELLED" => State::Error,
        _ => State::Pending,
    }
}

fn status_of(id: &str, status: Option<&Value>, fold: fn(&str) -> State) -> RemoteResourceStatus {
    let raw = status
        .and_then(|s| s.get("state"))
        .and_then(Value::as_str)
        .map(String::from);
    let state = raw.as_deref().map(fold).unwrap_or(State::Pending);
    RemoteResourceStatus {
        id: id.to_string(),
        state,
        raw_state: raw,
        detail: if state == State::Error { status.cloned() } else { None },
    }
}

impl ClusterResource {
    pub fn resource_status(&self) -> RemoteResourceStatus {
        status_of(&self.cluster_name, self.status.as_ref(), cluster_state)
    }
}

impl JobResource {
    pub fn resource_status(&self) -> RemoteResourceStatus {
        status_of(&self.reference.job_id, self.status.as_ref(), job_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cluster_states() {
        assert_eq!(cluster_state("CREATING"), State::Pending);
        assert_eq!(cluster_state("UNKNOWN"), State::Pending);
        assert_eq!(cluster_state("UPDATING"), State::Pending);
        assert_eq!(cluster_state("RUNNING"), State::Running);
        assert_eq!(cluster_state("ERROR"), State::Error);
        assert_eq!(cluster_state("ERROR_DUE_TO_UPDATE"), State::Error);
        assert_eq!(cluster_state("DELETING"), State::Deleting);
    }

    #[test]
    fn job_states() {
        assert_eq!(job_state("PENDING"), State::Pending);
        assert_eq!(job_state("SETUP_DONE"), State::Pending);
        assert_eq!(job_state("RUNNING"), State::Running);
        assert_eq!(job_state("DONE"), State::Done);
        assert_eq!(job_state("CANCELLED"), State::Error);
        assert_eq!(job_state("ATTEMPT_FAILURE"), State::Error);
    }

    #[test]
    fn error_status_keeps_provider_payload() {
        let cluster: ClusterResource = serde_json::from_value(json!({
            "clusterName": "cluster-a",
            "config": {"configBucket": "dataproc-staging"},
            "status": {"state": "ERROR", "detail": "Insufficient quota"}
        }))
        .unwrap();

        let status = cluster.resource_status();
        assert_eq!(status.state, State::Error);
        assert_eq!(status.raw_state.as_deref(), Some("ERROR"));
        assert_eq!(status.detail, Some(json!({"state": "ERROR", "detail": "Insufficient quota"})));
    }

    #[test]
    fn missing_status_is_pending() {
        let cluster: ClusterResource =
            serde_json::from_value(json!({"clusterName": "cluster-a"})).unwrap();
        let status = cluster.resource_status();
        assert_eq!(status.state, State::Pending);
        assert_eq!(status.detail, None);
    }

    #[test]
    fn list_without_clusters_field_is_empty() {
        let list: ListClustersResponse = serde_json::from_value(json!({})).unwrap();
        assert!(list.clusters.is_empty());
        assert!(list.next_page_token.is_none());
    }
}
