//! Small helpers shared by the storage and command layers.

use std::path::Path;

use bytes::Bytes;

use crate::{Error, Result};

/// Read an entire [`Bytes`] buffer into a [`String`].
///
/// Returns an error if the buffer contains invalid UTF-8.
pub fn string_from_bytes(buf: Bytes) -> Result<String> {
    String::from_utf8(buf.to_vec())
        .map_err(|e| Error::validation(format!("expected UTF-8 text: {e}")))
}

/// The final component of `path`, used as the object name when staging.
pub fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(String::from)
        .ok_or_else(|| Error::validation(format!("{} has no file name", path.display())))
}

/// `gs://` URI of an object.
#[inline]
pub fn gs_uri(bucket: &str, key: &str) -> String {
    format!("gs://{bucket}/{key}")
}
