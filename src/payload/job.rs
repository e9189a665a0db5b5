//! Job-submit request body for a PySpark job.

use serde::Serialize;

use super::properties::PropertyMap;

/// A jar the job runs against: where it lives and the name it is
/// localized under on the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarRef {
    pub uri: String,
    pub name: String,
}

/// Inputs to a job submission, after local files have been staged.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOptions {
    pub cluster_name: String,
    pub script_uri: String,
    pub jar: JarRef,
    pub zip_uri: String,
    /// Staged auxiliary files, in the order given by the user.
    pub file_uris: Vec<String>,
    pub archive_uris: Vec<String>,
    pub args: Vec<String>,
    /// Extra Spark properties, applied over the derived classpath ones.
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub placement: JobPlacement,
    pub pyspark_job: PySparkJob,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPlacement {
    pub cluster_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PySparkJob {
    pub main_python_file_uri: String,
    pub args: Vec<String>,
    pub python_file_uris: Vec<String>,
    pub jar_file_uris: Vec<String>,
    pub file_uris: Vec<String>,
    pub archive_uris: Vec<String>,
    pub properties: PropertyMap,
}

/// Spark properties putting `jar_name` on the driver and executor classpath.
pub fn classpath_properties(jar_name: &str) -> PropertyMap {
    let classpath = format!("./{jar_name}");
    [
        ("spark.driver.extraClassPath", classpath.clone()),
        ("spark.executor.extraClassPath", classpath),
    ]
    .into_iter()
    .collect()
}

/// Split a quoted argument string the way a shell would without quoting
/// rules: on runs of whitespace.
pub fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(String::from).collect()
}

pub fn build_job_spec(options: &JobOptions) -> JobSpec {
    let mut properties = classpath_properties(&options.jar.name);
    properties.merge(options.properties.clone());

    // The staged script always travels with the job's working files.
    let mut file_uris = Vec::with_capacity(options.file_uris.len() + 1);
    file_uris.push(options.script_uri.clone());
    file_uris.extend(options.file_uris.iter().cloned());

    JobSpec {
        placement: JobPlacement {
            cluster_name: options.cluster_name.clone(),
        },
        pyspark_job: PySparkJob {
            main_python_file_uri: options.script_uri.clone(),
            args: options.args.clone(),
            python_file_uris: vec![options.zip_uri.clone()],
            jar_file_uris: vec![options.jar.uri.clone()],
            file_uris,
            archive_uris: options.archive_uris.clone(),
            properties,
        },
    }
}
