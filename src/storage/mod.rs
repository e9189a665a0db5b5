//! Object storage: staging local files next to a cluster.

pub mod gcs;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::utils::{base_name, gs_uri};
use crate::{Error, Result};

pub use gcs::GcsStore;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write the contents of `path` to `bucket/key`, replacing any
    /// existing object.
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()>;

    /// Read a whole object.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;
}

/// Upload `local_path` to `bucket` under its base name and return the
/// object's `gs://` URI.
///
/// An existing object with the same name is overwritten.
pub async fn upload(store: &dyn BlobStore, bucket: &str, local_path: &Path) -> Result<String> {
    let key = base_name(local_path)?;
    store.put_file(bucket, &key, local_path).await?;
    let uri = gs_uri(bucket, &key);
    info!(local = %local_path.display(), %uri, "uploaded");
    Ok(uri)
}

/// Upload several files with at most `concurrency` transfers in flight.
///
/// URIs are returned in the order of `paths`. The first failure cancels
/// the remaining transfers and is returned.
pub async fn stage_files(
    store: Arc<dyn BlobStore>,
    bucket: &str,
    paths: &[PathBuf],
    concurrency: usize,
) -> Result<Vec<String>> {
    warn_on_name_collisions(paths);

    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for (index, path) in paths.iter().cloned().enumerate() {
        let store = Arc::clone(&store);
        let permits = Arc::clone(&permits);
        let bucket = bucket.to_string();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|e| Error::Transfer {
                path: path.display().to_string(),
                message: e.to_string(),
                retryable: false,
            })?;
            let uri = upload(store.as_ref(), &bucket, &path).await?;
            Ok::<_, Error>((index, uri))
        });
    }

    let mut uris: Vec<Option<String>> = vec![None; paths.len()];
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(|e| Error::Transfer {
            path: "<staging task>".to_string(),
            message: e.to_string(),
            retryable: false,
        });
        match outcome.and_then(|r| r) {
            Ok((index, uri)) => uris[index] = Some(uri),
            Err(e) => {
                tasks.abort_all();
                return Err(e);
            }
        }
    }
    Ok(uris.into_iter().flatten().collect())
}

fn warn_on_name_collisions(paths: &[PathBuf]) {
    let mut seen = std::collections::HashSet::new();
    for path in paths {
        if let Ok(name) = base_name(path) {
            if !seen.insert(name.clone()) {
                warn!(%name, "several staged files share a name; the last upload wins");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryStore;

    #[tokio::test]
    async fn upload_keys_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.py");
        std::fs::write(&path, "print('hi')").unwrap();

        let store = MemoryStore::new();
        let uri = upload(&store, "staging", &path).await.unwrap();

        assert_eq!(uri, "gs://staging/job.py");
        assert_eq!(
            store.object("staging", "job.py").unwrap(),
            Bytes::from_static(b"print('hi')")
        );
    }

    #[tokio::test]
    async fn staged_uris_keep_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for name in ["c.txt", "a.txt", "b.txt", "d.txt", "e.txt"] {
            let path = dir.path().join(name);
            std::fs::write(&path, name).unwrap();
            paths.push(path);
        }

        let store = Arc::new(MemoryStore::new());
        let uris = stage_files(store.clone(), "staging", &paths, 2).await.unwrap();

        assert_eq!(
            uris,
            vec![
                "gs://staging/c.txt",
                "gs://staging/a.txt",
                "gs://staging/b.txt",
                "gs://staging/d.txt",
                "gs://staging/e.txt",
            ]
        );
        assert_eq!(store.object_count(), 5);
    }

    #[tokio::test]
    async fn missing_file_fails_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.txt");
        std::fs::write(&present, "a").unwrap();
        let missing = dir.path().join("missing.txt");

        let store = Arc::new(MemoryStore::new());
        let err = stage_files(store, "staging", &[present, missing], 4)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer { .. }));
    }
}
