//! A small client for a managed Spark cluster service.
//!
//! The crate builds request payloads for creating clusters and submitting
//! jobs, stages local files to object storage, and waits on remote
//! resources until they settle. Cluster scheduling and storage are left
//! entirely to the cloud provider; everything here is request assembly
//! and polling.

pub mod build;
pub mod cancel;
pub mod cmd;
pub mod config;
pub mod dataproc;
pub mod error;
pub mod gcloud;
pub mod mock;
pub mod payload;
pub mod poll;
pub mod retry;
pub mod storage;
pub mod utils;

pub use error::{Error, Result};

/////////////////////////////////////////////////////////////////////////////
// Remote resource status
/////////////////////////////////////////////////////////////////////////////

/// The normalised lifecycle state of a remote cluster or job.
///
/// Provider-specific states are folded into these six; the raw provider
/// string is kept on [`RemoteResourceStatus`] for reporting.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum State {
    Pending,
    Running,
    Done,
    Error,
    Deleting,
    Absent,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Pending => "PENDING",
            State::Running => "RUNNING",
            State::Done => "DONE",
            State::Error => "ERROR",
            State::Deleting => "DELETING",
            State::Absent => "ABSENT",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot of a remote resource as seen by one status fetch.
#[derive(Clone, PartialEq, Debug)]
pub struct RemoteResourceStatus {
    /// Cluster name or job id.
    pub id: String,
    /// The normalised state.
    pub state: State,
    /// The state string reported by the provider, if any.
    pub raw_state: Option<String>,
    /// Opaque provider detail, populated for error states.
    pub detail: Option<serde_json::Value>,
}

impl RemoteResourceStatus {
    /// Construct a status with no provider detail attached.
    pub fn new(id: impl Into<String>, state: State) -> Self {
        Self {
            id: id.into(),
            state,
            raw_state: None,
            detail: None,
        }
    }

    /// A resource that could not be found.
    pub fn absent(id: impl Into<String>) -> Self {
        Self::new(id, State::Absent)
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}
