use std::io::Write;

use tracing::info;

use super::Context;
use crate::build::{resolve_build, HailVersion, SparkVersion, LATEST};
use crate::dataproc::{cluster_console_url, creation_status};
use crate::gcloud::{create_cluster_command, render};
use crate::payload::cluster::DEFAULT_MASTER_MACHINE_TYPE;
use crate::payload::{build_cluster_spec, split_list, ClusterOptions, PropertyMap};
use crate::poll::{wait_for_terminal, Terminal};
use crate::{Error, Result};

#[derive(clap::Args, Debug, Clone)]
pub struct StartArgs {
    /// Cluster name.
    pub name: String,

    /// Hail build to use for the notebook.
    #[arg(long, default_value = LATEST)]
    pub hash: String,

    /// Spark version used to build Hail.
    #[arg(long, value_enum, default_value_t = SparkVersion::V2_0_2)]
    pub spark: SparkVersion,

    /// Hail version to use.
    #[arg(long, value_enum, default_value_t = HailVersion::V0_1)]
    pub version: HailVersion,

    /// Master machine type.
    #[arg(long, short = 'm', visible_alias = "master", default_value = DEFAULT_MASTER_MACHINE_TYPE)]
    pub master_machine_type: String,

    /// Disk size of master machine, in GB.
    #[arg(long, default_value_t = 100)]
    pub master_boot_disk_size: u32,

    #[arg(long, default_value_t = 0)]
    pub num_master_local_ssds: u32,

    /// Number of preemptible worker machines.
    #[arg(long, short = 'p', visible_alias = "n-pre-workers", default_value_t = 0)]
    pub num_preemptible_workers: u32,

    #[arg(long, default_value_t = 0)]
    pub num_worker_local_ssds: u32,

    /// Number of worker machines.
    #[arg(long, short = 'w', visible_alias = "n-workers", default_value_t = 2)]
    pub num_workers: u32,

    /// Disk size of preemptible machines, in GB.
    #[arg(long, default_value_t = 40)]
    pub preemptible_worker_boot_disk_size: u32,

    /// Disk size of worker machines, in GB.
    #[arg(long, default_value_t = 40)]
    pub worker_boot_disk_size: u32,

    /// Worker machine type (default: n1-standard-8, or n1-highmem-8 with --vep).
    #[arg(long, visible_alias = "worker")]
    pub worker_machine_type: Option<String>,

    #[arg(long, default_value = crate::payload::cluster::DEFAULT_ZONE)]
    pub zone: String,

    /// Additional configuration properties, as `KEY=VALUE,...`.
    #[arg(long, default_value = "")]
    pub properties: String,

    /// Extra instance metadata, as `KEY=VALUE,...`.
    #[arg(long, default_value = "")]
    pub metadata: String,

    /// Comma-separated list of Python packages to install on the master.
    #[arg(long, visible_alias = "pkgs", default_value = "")]
    pub packages: String,

    /// Hail jar to use for the notebook.
    #[arg(long)]
    pub jar: Option<String>,

    /// Hail zip to use for the notebook.
    #[arg(long)]
    pub zip: Option<String>,

    /// Comma-separated list of init scripts to run.
    #[arg(long, default_value = "")]
    pub init: String,

    /// Configure the cluster to run VEP.
    #[arg(long)]
    pub vep: bool,

    /// Print the request and exit without creating anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl StartArgs {
    pub fn to_options(&self) -> Result<ClusterOptions> {
        let mut options = ClusterOptions::new(&self.name);
        options.spark = self.spark;
        options.version = self.version;
        options.master_machine_type = self.master_machine_type.clone();
        options.master_boot_disk_gb = self.master_boot_disk_size;
        options.num_master_local_ssds = self.num_master_local_ssds;
        options.worker_machine_type = self.worker_machine_type.clone();
        options.num_workers = self.num_workers;
        options.worker_boot_disk_gb = self.worker_boot_disk_size;
        options.num_worker_local_ssds = self.num_worker_local_ssds;
        options.num_preemptible_workers = self.num_preemptible_workers;
        options.preemptible_boot_disk_gb = self.preemptible_worker_boot_disk_size;
        options.zone = self.zone.clone();
        options.properties = PropertyMap::parse_key_values(&self.properties)?;
        options.metadata = PropertyMap::parse_key_values(&self.metadata)?;
        options.packages = split_list(&self.packages);
        options.init_actions = split_list(&self.init);
        options.vep = self.vep;
        options.jar = self.jar.clone();
        options.zip = self.zip.clone();
        options.validate()?;
        Ok(options)
    }
}

pub async fn run(args: &StartArgs, ctx: &Context, out: &mut (dyn Write + Send)) -> Result<()> {
    let options = args.to_options()?;
    writeln!(out, "Starting cluster '{}'...", options.name)?;

    let build = resolve_build(ctx.store.as_ref(), options.version, options.spark, &args.hash).await?;
    info!(hash = %build.hash, "resolved build");
    let spec = build_cluster_spec(&options, &ctx.env, &build)?;

    writeln!(out, "{}", render(&create_cluster_command(&spec, &ctx.env)?, 5))?;
    if args.dry_run {
        writeln!(out, "{}", serde_json::to_string_pretty(&spec)?)?;
        return Ok(());
    }

    let operation = ctx.clusters.create_cluster(&spec).await?;
    info!(operation = %operation.name, "waiting for cluster");

    let clusters = ctx.clusters.as_ref();
    let name = options.name.as_str();
    let url = cluster_console_url(name, &ctx.env);
    match wait_for_terminal(
        || creation_status(clusters, name),
        Terminal::CLUSTER_CREATED,
        &ctx.poll,
        &ctx.cancel,
    )
    .await
    {
        Ok(_) => {
            writeln!(out, "Cluster created. See {url} for more details.")?;
            Ok(())
        }
        Err(e @ Error::RemoteOperation { .. }) => {
            writeln!(out, "Unable to provision cluster. See {url} for more details.")?;
            Err(e)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cmd::{Args, Commands};

    fn start_args(argv: &[&str]) -> StartArgs {
        let mut full = vec!["cloudtools", "start"];
        full.extend_from_slice(argv);
        match Args::try_parse_from(full).unwrap().command {
            Commands::Start(args) => args,
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn aliases_reach_the_same_options() {
        let long = start_args(&["cluster-a", "--num-workers", "3", "--master-machine-type", "n1-highmem-8"]);
        let short = start_args(&["cluster-a", "-w", "3", "-m", "n1-highmem-8"]);
        let alias = start_args(&["cluster-a", "--n-workers", "3", "--master", "n1-highmem-8"]);

        let expected = long.to_options().unwrap();
        assert_eq!(short.to_options().unwrap(), expected);
        assert_eq!(alias.to_options().unwrap(), expected);
        assert_eq!(expected.num_workers, 3);
        assert_eq!(expected.master_machine_type, "n1-highmem-8");
    }

    #[test]
    fn defaults() {
        let args = start_args(&["cluster-a"]);
        assert_eq!(args.hash, "latest");
        assert_eq!(args.spark, SparkVersion::V2_0_2);
        assert_eq!(args.version, HailVersion::V0_1);

        let options = args.to_options().unwrap();
        assert_eq!(options, ClusterOptions::new("cluster-a"));
    }

    #[test]
    fn list_flags_are_split() {
        let args = start_args(&[
            "cluster-a",
            "--pkgs",
            "pandas,numpy",
            "--init",
            "gs://b/one.sh,gs://b/two.sh",
            "--properties",
            "spark:spark.executor.memory=4g",
            "--spark",
            "2.1.0",
            "--version",
            "devel",
        ]);
        let options = args.to_options().unwrap();
        assert_eq!(options.packages, vec!["pandas", "numpy"]);
        assert_eq!(options.init_actions, vec!["gs://b/one.sh", "gs://b/two.sh"]);
        assert_eq!(options.properties.get("spark:spark.executor.memory"), Some("4g"));
        assert_eq!(options.spark, SparkVersion::V2_1_0);
        assert_eq!(options.version, HailVersion::Devel);
    }

    #[test]
    fn bad_input_fails_validation() {
        for argv in [
            &["cluster-a", "--master", "n1-giant-1"][..],
            &["Cluster_A"][..],
            &["cluster-a", "--metadata", "novalue"][..],
        ] {
            assert!(
                matches!(start_args(argv).to_options(), Err(Error::Validation(_))),
                "{argv:?}"
            );
        }
    }

    #[test]
    fn unknown_spark_version_is_a_parse_error() {
        assert!(Args::try_parse_from(["cloudtools", "start", "c", "--spark", "1.6.2"]).is_err());
    }
}
