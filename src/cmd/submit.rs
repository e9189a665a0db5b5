use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use super::Context;
use crate::build::{resolve_build, HailVersion, SparkVersion, LATEST};
use crate::dataproc::job_console_url;
use crate::gcloud::{render, submit_job_command};
use crate::payload::job::split_args;
use crate::payload::{build_job_spec, split_list, JarRef, JobOptions, PropertyMap};
use crate::poll::{wait_for_terminal, Terminal};
use crate::storage::stage_files;
use crate::utils::base_name;
use crate::{Error, Result};

#[derive(clap::Args, Debug, Clone)]
pub struct SubmitArgs {
    /// Cluster name.
    pub name: String,

    /// Python script to run.
    pub script: PathBuf,

    /// Hail build to use.
    #[arg(long, default_value = LATEST)]
    pub hash: String,

    #[arg(long, value_enum, default_value_t = SparkVersion::V2_0_2)]
    pub spark: SparkVersion,

    #[arg(long, value_enum, default_value_t = HailVersion::V0_1)]
    pub version: HailVersion,

    /// Custom Hail jar to use.
    #[arg(long)]
    pub jar: Option<PathBuf>,

    /// Custom Hail zip to use.
    #[arg(long)]
    pub zip: Option<PathBuf>,

    /// Comma-separated list of files to add to the working directory of
    /// the job.
    #[arg(long, default_value = "")]
    pub files: String,

    /// Comma-separated list of archives to extract in the working
    /// directory of the job.
    #[arg(long, default_value = "")]
    pub archives: String,

    /// Extra Spark properties, as `KEY=VALUE,...`.
    #[arg(long, short = 'p', default_value = "")]
    pub properties: String,

    /// Quoted string of arguments to pass to the script.
    #[arg(long, allow_hyphen_values = true, default_value = "")]
    pub args: String,

    /// Wait for the job to finish.
    #[arg(long)]
    pub wait: bool,
}

/// Local files to stage, in upload order.
#[derive(Debug)]
struct StagingPlan {
    paths: Vec<PathBuf>,
    jar: Option<usize>,
    zip: Option<usize>,
    files: std::ops::Range<usize>,
    archives: std::ops::Range<usize>,
}

impl StagingPlan {
    fn new(args: &SubmitArgs) -> Self {
        let mut paths = vec![args.script.clone()];
        let mut push = |path: &PathBuf| {
            paths.push(path.clone());
            paths.len() - 1
        };
        let jar = args.jar.as_ref().map(&mut push);
        let zip = args.zip.as_ref().map(&mut push);

        let files_start = paths.len();
        paths.extend(split_list(&args.files).into_iter().map(PathBuf::from));
        let archives_start = paths.len();
        paths.extend(split_list(&args.archives).into_iter().map(PathBuf::from));
        let end = paths.len();

        Self {
            paths,
            jar,
            zip,
            files: files_start..archives_start,
            archives: archives_start..end,
        }
    }
}

async fn check_local_file(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(Error::validation(format!("{} is not a file", path.display()))),
        Err(_) => Err(Error::validation(format!("{} does not exist", path.display()))),
    }
}

pub async fn run(args: &SubmitArgs, ctx: &Context, out: &mut (dyn Write + Send)) -> Result<()> {
    let plan = StagingPlan::new(args);
    for path in &plan.paths {
        check_local_file(path).await?;
    }
    let properties = PropertyMap::parse_key_values(&args.properties)?;

    writeln!(out, "Submitting to cluster '{}'...", args.name)?;

    let cluster = ctx.clusters.get_cluster(&args.name).await?;
    let bucket = cluster.config_bucket.ok_or_else(|| Error::RemoteOperation {
        status: None,
        message: format!("cluster {} has no staging bucket", args.name),
        detail: None,
    })?;
    let build = resolve_build(ctx.store.as_ref(), args.version, args.spark, &args.hash).await?;

    let uris = stage_files(ctx.store.clone(), &bucket, &plan.paths, ctx.upload_concurrency).await?;
    info!(count = uris.len(), %bucket, "staged files");

    let jar = match plan.jar {
        Some(i) => JarRef {
            uri: uris[i].clone(),
            name: base_name(&plan.paths[i])?,
        },
        None => JarRef {
            uri: build.jar_uri(),
            name: build.jar_name(),
        },
    };
    let zip_uri = match plan.zip {
        Some(i) => uris[i].clone(),
        None => build.zip_uri(),
    };

    let job = build_job_spec(&JobOptions {
        cluster_name: args.name.clone(),
        script_uri: uris[0].clone(),
        jar,
        zip_uri,
        file_uris: uris[plan.files.clone()].to_vec(),
        archive_uris: uris[plan.archives.clone()].to_vec(),
        args: split_args(&args.args),
        properties,
    });
    writeln!(out, "{}", render(&submit_job_command(&job, &ctx.env)?, 6))?;

    let job_id = ctx.clusters.submit_job(&job).await?;
    let url = job_console_url(&job_id, &ctx.env);
    writeln!(out, "Submitted job ID {job_id}. See {url} for more details.")?;
    if !args.wait {
        return Ok(());
    }

    let clusters = ctx.clusters.as_ref();
    let id = job_id.as_str();
    match wait_for_terminal(|| clusters.get_job(id), Terminal::JOB_FINISHED, &ctx.poll, &ctx.cancel).await {
        Ok(_) => {
            writeln!(out, "Job {job_id} finished.")?;
            Ok(())
        }
        Err(e @ Error::RemoteOperation { .. }) => {
            writeln!(out, "Job {job_id} failed. See {url} for more details.")?;
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

    fn submit_args(argv: &[&str]) -> SubmitArgs {
        let mut full = vec!["cloudtools", "submit"];
        full.extend_from_slice(argv);
        match Args::try_parse_from(full).unwrap().command {
            Commands::Submit(args) => args,
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn script_arguments_may_look_like_flags() {
        let args = submit_args(&["cluster-a", "job.py", "--args", "--input gs://x/y.vds -n 3"]);
        assert_eq!(split_args(&args.args), vec!["--input", "gs://x/y.vds", "-n", "3"]);
    }

    #[test]
    fn staging_plan_keeps_input_order() {
        let args = submit_args(&[
            "cluster-a",
            "job.py",
            "--jar",
            "hail.jar",
            "--files",
            "b.txt,a.txt",
            "--archives",
            "ref.tar.gz",
        ]);
        let plan = StagingPlan::new(&args);

        let names: Vec<_> = plan.paths.iter().map(|p| p.to_str().unwrap()).collect();
        assert_eq!(names, vec!["job.py", "hail.jar", "b.txt", "a.txt", "ref.tar.gz"]);
        assert_eq!(plan.jar, Some(1));
        assert_eq!(plan.zip, None);
        assert_eq!(plan.files, 2..4);
        assert_eq!(plan.archives, 4..5);
    }

    #[tokio::test]
    async fn missing_local_file_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            check_local_file(&dir.path().join("nope.py")).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(check_local_file(dir.path()).await, Err(Error::Validation(_))));
    }
}
