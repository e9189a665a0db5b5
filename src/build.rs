//! Hail build selection: which Spark/Hail versions a cluster or job uses
//! and where the matching artifacts live.

use clap::ValueEnum;
use tracing::debug;

use crate::storage::BlobStore;
use crate::utils::string_from_bytes;
use crate::{Error, Result};

/// Public bucket holding Hail builds and init scripts.
pub const HAIL_COMMON_BUCKET: &str = "hail-common";

/// Hash value meaning "whatever was built most recently".
pub const LATEST: &str = "latest";

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum SparkVersion {
    #[value(name = "2.0.2")]
    V2_0_2,
    #[value(name = "2.1.0")]
    V2_1_0,
}

impl SparkVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SparkVersion::V2_0_2 => "2.0.2",
            SparkVersion::V2_1_0 => "2.1.0",
        }
    }

    /// Dataproc image version that ships this Spark release.
    pub fn image_version(&self) -> &'static str {
        match self {
            SparkVersion::V2_0_2 => "1.1",
            SparkVersion::V2_1_0 => "preview",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum HailVersion {
    #[value(name = "0.1")]
    V0_1,
    Devel,
}

impl HailVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HailVersion::V0_1 => "0.1",
            HailVersion::Devel => "devel",
        }
    }
}

/// A fully resolved Hail build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRef {
    pub version: HailVersion,
    pub spark: SparkVersion,
    pub hash: String,
}

impl BuildRef {
    pub fn jar_name(&self) -> String {
        format!(
            "hail-{}-{}-Spark-{}.jar",
            self.version.as_str(),
            self.hash,
            self.spark.as_str()
        )
    }

    pub fn jar_uri(&self) -> String {
        format!(
            "gs://{HAIL_COMMON_BUCKET}/builds/{}/jars/{}",
            self.version.as_str(),
            self.jar_name()
        )
    }

    pub fn zip_uri(&self) -> String {
        format!(
            "gs://{HAIL_COMMON_BUCKET}/builds/{}/python/hail-{}-{}.zip",
            self.version.as_str(),
            self.version.as_str(),
            self.hash
        )
    }
}

/// Object key of the file naming the latest build for a version pair.
pub fn latest_hash_key(version: HailVersion, spark: SparkVersion) -> String {
    format!(
        "builds/{}/latest-hash-spark-{}.txt",
        version.as_str(),
        spark.as_str()
    )
}

/// Resolve `hash` to a concrete build.
///
/// Anything other than [`LATEST`] is taken verbatim; [`LATEST`] is looked
/// up in the public build bucket.
pub async fn resolve_build(
    store: &dyn BlobStore,
    version: HailVersion,
    spark: SparkVersion,
    hash: &str,
) -> Result<BuildRef> {
    let hash = if hash == LATEST {
        let key = latest_hash_key(version, spark);
        let content = string_from_bytes(store.get_object(HAIL_COMMON_BUCKET, &key).await?)?;
        let resolved = content.trim().to_string();
        if resolved.is_empty() {
            return Err(Error::validation(format!(
                "gs://{HAIL_COMMON_BUCKET}/{key} is empty"
            )));
        }
        debug!(%resolved, "resolved latest build hash");
        resolved
    } else {
        hash.to_string()
    };
    Ok(BuildRef {
        version,
        spark,
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> BuildRef {
        BuildRef {
            version: HailVersion::V0_1,
            spark: SparkVersion::V2_0_2,
            hash: "abc123".into(),
        }
    }

    #[test]
    fn artifact_locations() {
        let b = build();
        assert_eq!(b.jar_name(), "hail-0.1-abc123-Spark-2.0.2.jar");
        assert_eq!(
            b.jar_uri(),
            "gs://hail-common/builds/0.1/jars/hail-0.1-abc123-Spark-2.0.2.jar"
        );
        assert_eq!(
            b.zip_uri(),
            "gs://hail-common/builds/0.1/python/hail-0.1-abc123.zip"
        );
    }

    #[test]
    fn image_versions() {
        assert_eq!(SparkVersion::V2_0_2.image_version(), "1.1");
        assert_eq!(SparkVersion::V2_1_0.image_version(), "preview");
        assert_eq!(
            latest_hash_key(HailVersion::Devel, SparkVersion::V2_1_0),
            "builds/devel/latest-hash-spark-2.1.0.txt"
        );
    }
}
