use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{
    ClusterResource, JobResource, ListClustersResponse, OperationResource, SubmitJobRequest,
};
use super::{ClusterApi, ClusterInfo, DeleteOutcome, OperationHandle};
use crate::cancel::CancelToken;
use crate::config::{ApiConfig, Environment, RetryPolicy};
use crate::payload::{ClusterSpec, JobSpec};
use crate::retry::with_backoff;
use crate::{Error, RemoteResourceStatus, Result};

/// Client for the Dataproc v1 REST API, scoped to one project and region.
#[derive(Clone)]
pub struct DataprocClient {
    http: Client,
    base_url: String,
    env: Environment,
    access_token: Option<String>,
    retry: RetryPolicy,
    cancel: CancelToken,
}

impl DataprocClient {
    pub fn new(api: &ApiConfig, env: Environment, retry: RetryPolicy, cancel: CancelToken) -> Result<Self> {
        let http = Client::builder().timeout(api.http_timeout).build()?;
        Ok(Self {
            http,
            base_url: format!(
                "{}/v1/projects/{}/regions/{}",
                api.dataproc_endpoint.trim_end_matches('/'),
                env.project,
                env.region
            ),
            env,
            access_token: api.access_token.clone(),
            retry,
            cancel,
        })
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    fn clusters_url(&self) -> String {
        format!("{}/clusters", self.base_url)
    }

    fn cluster_url(&self, name: &str) -> String {
        format!("{}/clusters/{}", self.base_url, name)
    }

    fn jobs_url(&self) -> String {
        format!("{}/jobs", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request built by `request`, retrying transient failures, and
    /// decode a successful JSON answer.
    async fn call<T, F>(&self, what: &str, request: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let request = &request;
        with_backoff(what, &self.retry, &self.cancel, || async move {
            let response = self.authorize(request()).send().await?;
            let status = response.status();
            debug!(%status, "{what}");
            if status.is_success() {
                Ok(response.json::<T>().await?)
            } else {
                let body = response.text().await.unwrap_or_default();
                Err(remote_error(what, status, &body))
            }
        })
        .await
    }
}

/// Turn an error answer into [`Error::RemoteOperation`], keeping the
/// provider's JSON error body as detail when there is one.
fn remote_error(what: &str, status: StatusCode, body: &str) -> Error {
    let detail: Option<Value> = serde_json::from_str(body).ok();
    let message = detail
        .as_ref()
        .and_then(|d| d.pointer("/error/message"))
        .and_then(Value::as_str)
        .map(|m| format!("{what}: {m}"))
        .unwrap_or_else(|| format!("{what}: HTTP {status}"));
    Error::remote(status.as_u16(), message, detail)
}

fn is_not_found(err: &Error) -> bool {
    matches!(err, Error::RemoteOperation { status: Some(404), .. })
}

/// A missing cluster is already deleted.
fn delete_outcome(answer: Result<Value>) -> Result<DeleteOutcome> {
    match answer {
        Ok(_) => Ok(DeleteOutcome::Accepted),
        Err(e) if is_not_found(&e) => Ok(DeleteOutcome::NotFound),
        Err(e) => Err(e),
    }
}

/// Token of the page after `page`, if there is one.
fn next_page_token(page: &ListClustersResponse) -> Option<String> {
    page.next_page_token.clone().filter(|t| !t.is_empty())
}

#[async_trait]
impl ClusterApi for DataprocClient {
    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<OperationHandle> {
        // One id for every attempt so a retried create is not applied twice.
        let request_id = Uuid::new_v4().to_string();
        let url = self.clusters_url();
        let operation: OperationResource = self
            .call("create cluster", || {
                self.http
                    .post(&url)
                    .query(&[("requestId", request_id.as_str())])
                    .json(spec)
            })
            .await?;
        info!(operation = %operation.name, "cluster create accepted");
        Ok(OperationHandle {
            name: operation.name,
        })
    }

    async fn delete_cluster(&self, name: &str) -> Result<DeleteOutcome> {
        let url = self.cluster_url(name);
        delete_outcome(
            self.call::<Value, _>("delete cluster", || self.http.delete(&url))
                .await,
        )
    }

    async fn get_cluster(&self, name: &str) -> Result<ClusterInfo> {
        let url = self.cluster_url(name);
        match self
            .call::<ClusterResource, _>("get cluster", || self.http.get(&url))
            .await
        {
            Ok(cluster) => Ok(cluster.into()),
            Err(e) if is_not_found(&e) => Err(Error::ResourceAbsent(format!("cluster {name}"))),
            Err(e) => Err(e),
        }
    }

    async fn list_clusters(&self) -> Result<Vec<ClusterInfo>> {
        let url = self.clusters_url();
        let mut clusters = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page: ListClustersResponse = self
                .call("list clusters", || {
                    let request = self.http.get(&url);
                    match &page_token {
                        Some(token) => request.query(&[("pageToken", token.as_str())]),
                        None => request,
                    }
                })
                .await?;
            let next = next_page_token(&page);
            clusters.extend(page.clusters.into_iter().map(ClusterInfo::from));
            match next {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(clusters)
    }

    async fn submit_job(&self, spec: &JobSpec) -> Result<String> {
        let body = SubmitJobRequest {
            job: spec,
            request_id: Uuid::new_v4().to_string(),
        };
        let url = format!("{}:submit", self.jobs_url());
        let job: JobResource = self
            .call("submit job", || self.http.post(&url).json(&body))
            .await?;
        Ok(job.reference.job_id)
    }

    async fn get_job(&self, job_id: &str) -> Result<RemoteResourceStatus> {
        let url = format!("{}/{}", self.jobs_url(), job_id);
        let job: JobResource = self.call("get job", || self.http.get(&url)).await?;
        Ok(job.resource_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> DataprocClient {
        let api = ApiConfig {
            dataproc_endpoint: "https://dataproc.example.com/".into(),
            ..ApiConfig::default()
        };
        let env = Environment {
            project: "proj".into(),
            region: "us-central1".into(),
        };
        DataprocClient::new(&api, env, RetryPolicy::none(), CancelToken::new()).unwrap()
    }

    #[test]
    fn resource_urls() {
        let c = client();
        assert_eq!(
            c.clusters_url(),
            "https://dataproc.example.com/v1/projects/proj/regions/us-central1/clusters"
        );
        assert_eq!(
            c.cluster_url("cluster-a"),
            "https://dataproc.example.com/v1/projects/proj/regions/us-central1/clusters/cluster-a"
        );
        assert_eq!(
            c.jobs_url(),
            "https://dataproc.example.com/v1/projects/proj/regions/us-central1/jobs"
        );
    }

    #[test]
    fn google_error_body_is_decoded() {
        let body = json!({
            "error": {"code": 404, "message": "Not found: Cluster projects/proj/regions/r/clusters/x", "status": "NOT_FOUND"}
        });
        let err = remote_error("delete cluster", StatusCode::NOT_FOUND, &body.to_string());

        assert!(is_not_found(&err));
        assert_eq!(
            err.to_string(),
            "remote operation failed: delete cluster: Not found: Cluster projects/proj/regions/r/clusters/x"
        );
        assert_eq!(err.detail(), Some(&body));
    }

    #[test]
    fn delete_of_a_missing_cluster_is_not_an_error() {
        let not_found = remote_error("delete cluster", StatusCode::NOT_FOUND, "{}");
        assert_eq!(delete_outcome(Err(not_found)).unwrap(), DeleteOutcome::NotFound);
        assert_eq!(
            delete_outcome(Ok(json!({"name": "operations/x"}))).unwrap(),
            DeleteOutcome::Accepted
        );

        let forbidden = remote_error("delete cluster", StatusCode::FORBIDDEN, "{}");
        assert!(matches!(
            delete_outcome(Err(forbidden)),
            Err(Error::RemoteOperation { status: Some(403), .. })
        ));
    }

    #[test]
    fn paging_stops_on_a_missing_or_empty_token() {
        let page = |body: Value| -> ListClustersResponse { serde_json::from_value(body).unwrap() };

        assert_eq!(
            next_page_token(&page(json!({"clusters": [], "nextPageToken": "p2"}))),
            Some("p2".to_string())
        );
        assert_eq!(next_page_token(&page(json!({"nextPageToken": ""}))), None);
        assert_eq!(next_page_token(&page(json!({"clusters": []}))), None);
    }

    #[test]
    fn non_json_error_body_falls_back_to_status() {
        let err = remote_error("get job", StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert!(err.is_retryable());
        assert_eq!(err.detail(), None);
        assert_eq!(
            err.to_string(),
            "remote operation failed: get job: HTTP 502 Bad Gateway"
        );
    }
}
