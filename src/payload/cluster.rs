//! Cluster-create request body.
//!
//! Field names follow the Dataproc v1 `Cluster` resource.

use serde::Serialize;

use super::machine::driver_memory_gb;
use super::properties::PropertyMap;
use crate::build::{BuildRef, HailVersion, SparkVersion, HAIL_COMMON_BUCKET};
use crate::config::Environment;
use crate::{Error, Result};

/// Bump when the notebook init script changes incompatibly.
pub const COMPATIBILITY_VERSION: u32 = 3;

pub const DEFAULT_MASTER_MACHINE_TYPE: &str = "n1-highmem-8";
pub const DEFAULT_WORKER_MACHINE_TYPE: &str = "n1-standard-8";
pub const VEP_WORKER_MACHINE_TYPE: &str = "n1-highmem-8";
pub const DEFAULT_ZONE: &str = "us-central1-b";

const SERVICE_ACCOUNT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/userinfo.email",
];

pub fn notebook_init_action() -> String {
    format!("gs://{HAIL_COMMON_BUCKET}/init_notebook-{COMPATIBILITY_VERSION}.py")
}

pub fn vep_init_action() -> String {
    format!("gs://{HAIL_COMMON_BUCKET}/vep/vep/vep85-init.sh")
}

/// Everything the user can choose about a new cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOptions {
    pub name: String,
    pub spark: SparkVersion,
    pub version: HailVersion,
    pub master_machine_type: String,
    pub master_boot_disk_gb: u32,
    pub num_master_local_ssds: u32,
    /// `None` picks a default based on `vep`.
    pub worker_machine_type: Option<String>,
    pub num_workers: u32,
    pub worker_boot_disk_gb: u32,
    pub num_worker_local_ssds: u32,
    pub num_preemptible_workers: u32,
    pub preemptible_boot_disk_gb: u32,
    pub zone: String,
    /// Extra software properties, applied over the built-in ones.
    pub properties: PropertyMap,
    /// Extra instance metadata.
    pub metadata: PropertyMap,
    /// Python packages to install on the master, as one list value.
    pub packages: Vec<String>,
    /// Extra initialization scripts, run after the built-in ones.
    pub init_actions: Vec<String>,
    pub vep: bool,
    pub jar: Option<String>,
    pub zip: Option<String>,
}

impl ClusterOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spark: SparkVersion::V2_0_2,
            version: HailVersion::V0_1,
            master_machine_type: DEFAULT_MASTER_MACHINE_TYPE.to_string(),
            master_boot_disk_gb: 100,
            num_master_local_ssds: 0,
            worker_machine_type: None,
            num_workers: 2,
            worker_boot_disk_gb: 40,
            num_worker_local_ssds: 0,
            num_preemptible_workers: 0,
            preemptible_boot_disk_gb: 40,
            zone: DEFAULT_ZONE.to_string(),
            properties: PropertyMap::new(),
            metadata: PropertyMap::new(),
            packages: Vec::new(),
            init_actions: Vec::new(),
            vep: false,
            jar: None,
            zip: None,
        }
    }

    /// Check everything that can be checked without talking to the
    /// provider.
    pub fn validate(&self) -> Result<()> {
        validate_cluster_name(&self.name)?;
        driver_memory_gb(&self.master_machine_type)?;
        if self.zone.trim().is_empty() {
            return Err(Error::validation("zone must not be empty"));
        }
        Ok(())
    }

    pub fn worker_machine_type(&self) -> &str {
        match &self.worker_machine_type {
            Some(t) => t,
            None if self.vep => VEP_WORKER_MACHINE_TYPE,
            None => DEFAULT_WORKER_MACHINE_TYPE,
        }
    }

    /// Built-in software properties followed by the user's.
    pub fn software_properties(&self) -> Result<PropertyMap> {
        let driver_memory = driver_memory_gb(&self.master_machine_type)?;
        let mut properties: PropertyMap = [
            ("spark:spark.driver.memory", format!("{driver_memory}g")),
            ("spark:spark.driver.maxResultSize", "0".to_string()),
            ("spark:spark.task.maxFailures", "20".to_string()),
            ("spark:spark.kryoserializer.buffer.max", "1g".to_string()),
            ("spark:spark.driver.extraJavaOptions", "-Xss4M".to_string()),
            ("spark:spark.executor.extraJavaOptions", "-Xss4M".to_string()),
            ("hdfs:dfs.replication", "1".to_string()),
        ]
        .into_iter()
        .collect();
        properties.merge(self.properties.clone());
        Ok(properties)
    }

    pub fn init_action_uris(&self) -> Vec<String> {
        let mut actions = vec![notebook_init_action()];
        if self.vep {
            actions.push(vep_init_action());
        }
        actions.extend(self.init_actions.iter().cloned());
        actions
    }

    /// Instance metadata read by the init scripts.
    pub fn instance_metadata(&self, build: &BuildRef) -> PropertyMap {
        let mut metadata: PropertyMap = [
            ("HASH", build.hash.as_str()),
            ("SPARK", build.spark.as_str()),
            ("HAIL_VERSION", build.version.as_str()),
        ]
        .into_iter()
        .collect();
        metadata.merge(self.metadata.clone());
        if !self.packages.is_empty() {
            metadata.insert("PKGS", self.packages.join(","));
        }
        if let Some(jar) = &self.jar {
            metadata.insert("JAR", jar.as_str());
        }
        if let Some(zip) = &self.zip {
            metadata.insert("ZIP", zip.as_str());
        }
        metadata
    }
}

/// Dataproc names are lowercase letters, digits and hyphens, start with a
/// letter, do not end with a hyphen, and are at most 51 characters.
pub fn validate_cluster_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 51
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid cluster name '{name}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub project_id: String,
    pub cluster_name: String,
    pub config: ClusterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub gce_cluster_config: GceClusterConfig,
    pub master_config: InstanceGroupConfig,
    pub worker_config: InstanceGroupConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_worker_config: Option<InstanceGroupConfig>,
    pub software_config: SoftwareConfig,
    pub initialization_actions: Vec<NodeInitializationAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GceClusterConfig {
    pub zone_uri: String,
    pub service_account_scopes: Vec<String>,
    pub metadata: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupConfig {
    pub num_instances: u32,
    pub machine_type_uri: String,
    pub disk_config: DiskConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskConfig {
    pub boot_disk_size_gb: u32,
    pub num_local_ssds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareConfig {
    pub image_version: String,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInitializationAction {
    pub executable_file: String,
}

/// Build the create request for `options` against a resolved build.
pub fn build_cluster_spec(
    options: &ClusterOptions,
    env: &Environment,
    build: &BuildRef,
) -> Result<ClusterSpec> {
    options.validate()?;

    let worker_type = options.worker_machine_type().to_string();
    let secondary_worker_config =
        if options.num_preemptible_workers > 0 || options.preemptible_boot_disk_gb > 0 {
            Some(InstanceGroupConfig {
                num_instances: options.num_preemptible_workers,
                machine_type_uri: worker_type.clone(),
                disk_config: DiskConfig {
                    boot_disk_size_gb: options.preemptible_boot_disk_gb,
                    num_local_ssds: options.num_worker_local_ssds,
                },
            })
        } else {
            None
        };

    Ok(ClusterSpec {
        project_id: env.project.clone(),
        cluster_name: options.name.clone(),
        config: ClusterConfig {
            gce_cluster_config: GceClusterConfig {
                zone_uri: options.zone.clone(),
                service_account_scopes: SERVICE_ACCOUNT_SCOPES.iter().map(|s| s.to_string()).collect(),
                metadata: options.instance_metadata(build),
            },
            master_config: InstanceGroupConfig {
                num_instances: 1,
                machine_type_uri: options.master_machine_type.clone(),
                disk_config: DiskConfig {
                    boot_disk_size_gb: options.master_boot_disk_gb,
                    num_local_ssds: options.num_master_local_ssds,
                },
            },
            worker_config: InstanceGroupConfig {
                num_instances: options.num_workers,
                machine_type_uri: worker_type,
                disk_config: DiskConfig {
                    boot_disk_size_gb: options.worker_boot_disk_gb,
                    num_local_ssds: options.num_worker_local_ssds,
                },
            },
            secondary_worker_config,
            software_config: SoftwareConfig {
                image_version: build.spark.image_version().to_string(),
                properties: options.software_properties()?,
            },
            initialization_actions: options
                .init_action_uris()
                .into_iter()
                .map(|executable_file| NodeInitializationAction { executable_file })
                .collect(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn env() -> Environment {
        Environment {
            project: "my-project".into(),
            region: "us-central1".into(),
        }
    }

    fn build() -> BuildRef {
        BuildRef {
            version: HailVersion::V0_1,
            spark: SparkVersion::V2_0_2,
            hash: "deadbeef".into(),
        }
    }

    #[test]
    fn default_cluster_body() {
        let spec = build_cluster_spec(&ClusterOptions::new("cluster-a"), &env(), &build()).unwrap();
        let body = serde_json::to_value(&spec).unwrap();

        assert_eq!(
            body,
            json!({
                "projectId": "my-project",
                "clusterName": "cluster-a",
                "config": {
                    "gceClusterConfig": {
                        "zoneUri": "us-central1-b",
                        "serviceAccountScopes": [
                            "https://www.googleapis.com/auth/userinfo.profile",
                            "https://www.googleapis.com/auth/userinfo.email"
                        ],
                        "metadata": {"HASH": "deadbeef", "SPARK": "2.0.2", "HAIL_VERSION": "0.1"}
                    },
                    "masterConfig": {
                        "numInstances": 1,
                        "machineTypeUri": "n1-highmem-8",
                        "diskConfig": {"bootDiskSizeGb": 100, "numLocalSsds": 0}
                    },
                    "workerConfig": {
                        "numInstances": 2,
                        "machineTypeUri": "n1-standard-8",
                        "diskConfig": {"bootDiskSizeGb": 40, "numLocalSsds": 0}
                    },
                    "secondaryWorkerConfig": {
                        "numInstances": 0,
                        "machineTypeUri": "n1-standard-8",
                        "diskConfig": {"bootDiskSizeGb": 40, "numLocalSsds": 0}
                    },
                    "softwareConfig": {
                        "imageVersion": "1.1",
                        "properties": {
                            "spark:spark.driver.memory": "41g",
                            "spark:spark.driver.maxResultSize": "0",
                            "spark:spark.task.maxFailures": "20",
                            "spark:spark.kryoserializer.buffer.max": "1g",
                            "spark:spark.driver.extraJavaOptions": "-Xss4M",
                            "spark:spark.executor.extraJavaOptions": "-Xss4M",
                            "hdfs:dfs.replication": "1"
                        }
                    },
                    "initializationActions": [
                        {"executableFile": "gs://hail-common/init_notebook-3.py"}
                    ]
                }
            })
        );
    }

    #[test]
    fn secondary_workers_omitted_when_unused() {
        let mut options = ClusterOptions::new("cluster-a");
        options.preemptible_boot_disk_gb = 0;
        let spec = build_cluster_spec(&options, &env(), &build()).unwrap();
        assert!(spec.config.secondary_worker_config.is_none());

        options.num_preemptible_workers = 4;
        let spec = build_cluster_spec(&options, &env(), &build()).unwrap();
        let secondary = spec.config.secondary_worker_config.unwrap();
        assert_eq!(secondary.num_instances, 4);
        assert_eq!(secondary.disk_config.boot_disk_size_gb, 0);
    }

    #[test]
    fn vep_switches_worker_type_and_adds_init_script() {
        let mut options = ClusterOptions::new("cluster-a");
        options.vep = true;
        options.init_actions = vec!["gs://bucket/extra.sh".into()];
        let spec = build_cluster_spec(&options, &env(), &build()).unwrap();

        assert_eq!(spec.config.worker_config.machine_type_uri, "n1-highmem-8");
        let actions: Vec<_> = spec
            .config
            .initialization_actions
            .iter()
            .map(|a| a.executable_file.as_str())
            .collect();
        assert_eq!(
            actions,
            vec![
                "gs://hail-common/init_notebook-3.py",
                "gs://hail-common/vep/vep/vep85-init.sh",
                "gs://bucket/extra.sh"
            ]
        );
    }

    #[test]
    fn explicit_worker_type_wins_over_vep_default() {
        let mut options = ClusterOptions::new("cluster-a");
        options.vep = true;
        options.worker_machine_type = Some("n1-standard-4".into());
        assert_eq!(options.worker_machine_type(), "n1-standard-4");
    }

    #[test]
    fn user_properties_override_built_ins() {
        let mut options = ClusterOptions::new("cluster-a");
        options.master_machine_type = "n1-standard-2".into();
        options.properties =
            PropertyMap::parse_key_values("spark:spark.task.maxFailures=5,spark:spark.speculation=true").unwrap();

        let properties = options.software_properties().unwrap();
        assert_eq!(properties.get("spark:spark.driver.memory"), Some("6g"));
        assert_eq!(properties.get("spark:spark.task.maxFailures"), Some("5"));
        assert_eq!(properties.get("spark:spark.speculation"), Some("true"));
        assert_eq!(properties.len(), 8);
    }

    #[test]
    fn package_list_stays_one_metadata_value() {
        let mut options = ClusterOptions::new("cluster-a");
        options.metadata = PropertyMap::parse_key_values("OWNER=me").unwrap();
        options.packages = vec!["pandas".into(), "scikit-learn==0.18".into()];
        options.jar = Some("gs://b/hail.jar".into());

        let metadata = options.instance_metadata(&build());
        let keys: Vec<_> = metadata.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["HASH", "SPARK", "HAIL_VERSION", "OWNER", "PKGS", "JAR"]);
        assert_eq!(metadata.get("PKGS"), Some("pandas,scikit-learn==0.18"));
    }

    #[test]
    fn unknown_master_type_is_rejected() {
        let mut options = ClusterOptions::new("cluster-a");
        options.master_machine_type = "n2-standard-8".into();
        assert!(matches!(
            build_cluster_spec(&options, &env(), &build()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn cluster_names() {
        assert!(validate_cluster_name("cluster-a").is_ok());
        assert!(validate_cluster_name("c1").is_ok());
        assert!(validate_cluster_name("").is_err());
        assert!(validate_cluster_name("Cluster").is_err());
        assert!(validate_cluster_name("1cluster").is_err());
        assert!(validate_cluster_name("cluster-").is_err());
        assert!(validate_cluster_name("cluster_a").is_err());
        assert!(validate_cluster_name(&"a".repeat(52)).is_err());
    }
}
