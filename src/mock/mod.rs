//! In-memory stand-ins for the remote services.
//!
//! These implement [`ClusterApi`] and [`BlobStore`] with scripted
//! answers so the command flows can be driven without network access.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::dataproc::model::{cluster_state, job_state};
use crate::dataproc::{ClusterApi, ClusterInfo, DeleteOutcome, OperationHandle};
use crate::payload::{ClusterSpec, JobSpec};
use crate::storage::BlobStore;
use crate::utils::gs_uri;
use crate::{Error, RemoteResourceStatus, Result, State};

/////////////////////////////////////////////////////////////////////////////
// Object storage
/////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    /// Keys in the order they were written.
    writes: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, content: impl Into<Bytes>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), content.into());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// `gs://` URIs of every write, oldest first.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let content = tokio::fs::read(path).await.map_err(|e| Error::Transfer {
            path: path.display().to_string(),
            message: e.to_string(),
            retryable: false,
        })?;
        self.insert(bucket, key, content);
        self.writes.lock().unwrap().push(gs_uri(bucket, key));
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.object(bucket, key)
            .ok_or_else(|| Error::ResourceAbsent(gs_uri(bucket, key)))
    }
}

/////////////////////////////////////////////////////////////////////////////
// Cluster service
/////////////////////////////////////////////////////////////////////////////

/// What a scripted delete call answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReply {
    Accepted,
    NotFound,
    /// Fail with this HTTP status.
    Status(u16),
}

#[derive(Debug)]
pub struct MockDataproc {
    /// Successive `list_clusters` answers; the last one repeats.
    listings: Mutex<VecDeque<Vec<ClusterInfo>>>,
    clusters: Mutex<HashMap<String, ClusterInfo>>,
    /// Successive job states; the last one repeats.
    job_states: Mutex<VecDeque<String>>,
    delete_reply: Mutex<DeleteReply>,
    create_failure: Mutex<Option<u16>>,
    job_id: String,
    pub created: Mutex<Vec<ClusterSpec>>,
    pub deleted: Mutex<Vec<String>>,
    pub submitted: Mutex<Vec<JobSpec>>,
    pub list_calls: Mutex<u32>,
}

impl Default for MockDataproc {
    fn default() -> Self {
        Self {
            listings: Mutex::new(VecDeque::new()),
            clusters: Mutex::new(HashMap::new()),
            job_states: Mutex::new(VecDeque::new()),
            delete_reply: Mutex::new(DeleteReply::Accepted),
            create_failure: Mutex::new(None),
            job_id: "job-0001".to_string(),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            list_calls: Mutex::new(0),
        }
    }
}

/// A cluster in the given provider state.
pub fn cluster(name: &str, raw_state: &str) -> ClusterInfo {
    let state = cluster_state(raw_state);
    let mut status = RemoteResourceStatus::new(name, state);
    status.raw_state = Some(raw_state.to_string());
    if state == State::Error {
        status.detail = Some(serde_json::json!({"state": raw_state}));
    }
    ClusterInfo {
        name: name.to_string(),
        status,
        config_bucket: None,
    }
}

impl MockDataproc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue listings made of `(name, provider state)` pairs.
    pub fn script_listing(&self, listings: Vec<Vec<(&str, &str)>>) {
        let mut queue = self.listings.lock().unwrap();
        for listing in listings {
            queue.push_back(
                listing
                    .into_iter()
                    .map(|(name, state)| cluster(name, state))
                    .collect(),
            );
        }
    }

    /// Make `get_cluster(name)` answer with a running cluster using `bucket`.
    pub fn add_cluster(&self, name: &str, bucket: &str) {
        let mut info = cluster(name, "RUNNING");
        info.config_bucket = Some(bucket.to_string());
        self.clusters.lock().unwrap().insert(name.to_string(), info);
    }

    pub fn script_job_states(&self, states: &[&str]) {
        self.job_states
            .lock()
            .unwrap()
            .extend(states.iter().map(|s| s.to_string()));
    }

    pub fn reply_to_delete(&self, reply: DeleteReply) {
        *self.delete_reply.lock().unwrap() = reply;
    }

    pub fn fail_create(&self, status: u16) {
        *self.create_failure.lock().unwrap() = Some(status);
    }

    pub fn list_call_count(&self) -> u32 {
        *self.list_calls.lock().unwrap()
    }
}

fn next_sticky<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut queue = queue.lock().unwrap();
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait]
impl ClusterApi for MockDataproc {
    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<OperationHandle> {
        if let Some(status) = *self.create_failure.lock().unwrap() {
            return Err(Error::remote(status, "create cluster rejected", None));
        }
        self.created.lock().unwrap().push(spec.clone());
        Ok(OperationHandle {
            name: format!("operations/create-{}", spec.cluster_name),
        })
    }

    async fn delete_cluster(&self, name: &str) -> Result<DeleteOutcome> {
        self.deleted.lock().unwrap().push(name.to_string());
        match *self.delete_reply.lock().unwrap() {
            DeleteReply::Accepted => Ok(DeleteOutcome::Accepted),
            DeleteReply::NotFound => Ok(DeleteOutcome::NotFound),
            DeleteReply::Status(status) => Err(Error::remote(status, "delete cluster rejected", None)),
        }
    }

    async fn get_cluster(&self, name: &str) -> Result<ClusterInfo> {
        self.clusters
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ResourceAbsent(format!("cluster {name}")))
    }

    async fn list_clusters(&self) -> Result<Vec<ClusterInfo>> {
        *self.list_calls.lock().unwrap() += 1;
        Ok(next_sticky(&self.listings).unwrap_or_default())
    }

    async fn submit_job(&self, spec: &JobSpec) -> Result<String> {
        self.submitted.lock().unwrap().push(spec.clone());
        Ok(self.job_id.clone())
    }

    async fn get_job(&self, job_id: &str) -> Result<RemoteResourceStatus> {
        let raw = next_sticky(&self.job_states).unwrap_or_else(|| "PENDING".to_string());
        let state = job_state(&raw);
        let mut status = RemoteResourceStatus::new(job_id, state);
        if state == State::Error {
            status.detail = Some(serde_json::json!({"state": raw, "details": "job failed"}));
        }
        status.raw_state = Some(raw);
        Ok(status)
    }
}
