//! Equivalent `gcloud` command lines for the requests this tool sends.
//!
//! These are printed for the operator before acting. List-valued flags
//! are joined with `,`; if any element itself contains a comma, the first
//! delimiter from [`ALTERNATE_DELIMITERS`] that appears in no element is
//! used instead and announced with gcloud's `^D^` prefix.

use itertools::Itertools;

use crate::config::Environment;
use crate::payload::{ClusterSpec, JobSpec, PropertyMap};
use crate::{Error, Result};

pub const ALTERNATE_DELIMITERS: [char; 5] = [':', ';', '|', '#', '~'];

/// Join list elements into one flag value.
pub fn join_list<S: AsRef<str>>(items: &[S]) -> Result<String> {
    if !items.iter().any(|i| i.as_ref().contains(',')) {
        return Ok(items.iter().map(AsRef::as_ref).join(","));
    }
    let delimiter = ALTERNATE_DELIMITERS
        .iter()
        .find(|d| !items.iter().any(|i| i.as_ref().contains(**d)))
        .ok_or_else(|| Error::validation("no unused delimiter available for list value"))?;
    Ok(format!(
        "^{delimiter}^{}",
        items.iter().map(AsRef::as_ref).join(&delimiter.to_string())
    ))
}

/// Join a map into one `KEY=VALUE` list flag value.
pub fn join_map(map: &PropertyMap) -> Result<String> {
    let pairs: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
    join_list(&pairs)
}

fn scope_flags(env: &Environment) -> [String; 2] {
    [
        format!("--project={}", env.project),
        format!("--region={}", env.region),
    ]
}

pub fn create_cluster_command(spec: &ClusterSpec, env: &Environment) -> Result<Vec<String>> {
    let config = &spec.config;
    let mut cmd: Vec<String> = ["gcloud", "dataproc", "clusters", "create"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    cmd.push(spec.cluster_name.clone());
    cmd.extend(scope_flags(env));
    cmd.push(format!("--image-version={}", config.software_config.image_version));
    cmd.push(format!("--master-machine-type={}", config.master_config.machine_type_uri));
    cmd.push(format!("--metadata={}", join_map(&config.gce_cluster_config.metadata)?));
    cmd.push(format!(
        "--master-boot-disk-size={}GB",
        config.master_config.disk_config.boot_disk_size_gb
    ));
    cmd.push(format!(
        "--num-master-local-ssds={}",
        config.master_config.disk_config.num_local_ssds
    ));
    if let Some(secondary) = &config.secondary_worker_config {
        cmd.push(format!("--num-preemptible-workers={}", secondary.num_instances));
        cmd.push(format!(
            "--preemptible-worker-boot-disk-size={}GB",
            secondary.disk_config.boot_disk_size_gb
        ));
    }
    cmd.push(format!(
        "--num-worker-local-ssds={}",
        config.worker_config.disk_config.num_local_ssds
    ));
    cmd.push(format!("--num-workers={}", config.worker_config.num_instances));
    cmd.push(format!(
        "--worker-boot-disk-size={}GB",
        config.worker_config.disk_config.boot_disk_size_gb
    ));
    cmd.push(format!("--worker-machine-type={}", config.worker_config.machine_type_uri));
    cmd.push(format!("--zone={}", config.gce_cluster_config.zone_uri));
    cmd.push(format!("--properties={}", join_map(&config.software_config.properties)?));
    let actions: Vec<&str> = config
        .initialization_actions
        .iter()
        .map(|a| a.executable_file.as_str())
        .collect();
    cmd.push(format!("--initialization-actions={}", join_list(&actions)?));
    Ok(cmd)
}

pub fn delete_cluster_command(name: &str, env: &Environment) -> Vec<String> {
    let mut cmd: Vec<String> = ["gcloud", "dataproc", "clusters", "delete", "--quiet"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    cmd.push(name.to_string());
    cmd.extend(scope_flags(env));
    cmd
}

pub fn submit_job_command(job: &JobSpec, env: &Environment) -> Result<Vec<String>> {
    let pyspark = &job.pyspark_job;
    let mut cmd: Vec<String> = ["gcloud", "dataproc", "jobs", "submit", "pyspark"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    cmd.push(pyspark.main_python_file_uri.clone());
    cmd.push(format!("--cluster={}", job.placement.cluster_name));
    cmd.extend(scope_flags(env));
    cmd.push(format!("--files={}", join_list(&pyspark.file_uris)?));
    cmd.push(format!("--py-files={}", join_list(&pyspark.python_file_uris)?));
    cmd.push(format!("--jars={}", join_list(&pyspark.jar_file_uris)?));
    if !pyspark.archive_uris.is_empty() {
        cmd.push(format!("--archives={}", join_list(&pyspark.archive_uris)?));
    }
    cmd.push(format!("--properties={}", join_map(&pyspark.properties)?));
    if !pyspark.args.is_empty() {
        cmd.push("--".to_string());
        cmd.extend(pyspark.args.iter().cloned());
    }
    Ok(cmd)
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=,@^%+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Render `cmd` for display: the first `head` words on one line, then one
/// flag per continuation line.
pub fn render(cmd: &[String], head: usize) -> String {
    let split = head.min(cmd.len());
    let first = cmd[..split].iter().map(|a| shell_quote(a)).join(" ");
    if split == cmd.len() {
        return first;
    }
    let rest = cmd[split..].iter().map(|a| shell_quote(a)).join(" \\\n    ");
    format!("{first} \\\n    {rest}")
}
