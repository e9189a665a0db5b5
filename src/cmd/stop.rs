use std::io::Write;

use tracing::info;

use super::Context;
use crate::dataproc::{cluster_console_url, deletion_status, DeleteOutcome};
use crate::gcloud::{delete_cluster_command, render};
use crate::payload::cluster::validate_cluster_name;
use crate::poll::{wait_for_terminal, Terminal};
use crate::{Error, Result};

#[derive(clap::Args, Debug, Clone)]
pub struct StopArgs {
    /// Cluster name.
    pub name: String,

    /// Print the request and exit without deleting anything.
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: &StopArgs, ctx: &Context, out: &mut (dyn Write + Send)) -> Result<()> {
    validate_cluster_name(&args.name)?;
    writeln!(out, "Stopping cluster '{}'...", args.name)?;
    writeln!(out, "{}", render(&delete_cluster_command(&args.name, &ctx.env), 6))?;
    if args.dry_run {
        return Ok(());
    }

    if ctx.clusters.delete_cluster(&args.name).await? == DeleteOutcome::NotFound {
        info!(cluster = %args.name, "cluster was already gone");
    }

    let clusters = ctx.clusters.as_ref();
    let name = args.name.as_str();
    match wait_for_terminal(
        || deletion_status(clusters, name),
        Terminal::CLUSTER_DELETED,
        &ctx.poll,
        &ctx.cancel,
    )
    .await
    {
        Ok(_) => {
            writeln!(out, "Cluster deleted.")?;
            Ok(())
        }
        Err(e @ Error::RemoteOperation { .. }) => {
            let url = cluster_console_url(name, &ctx.env);
            writeln!(out, "Unable to delete cluster. See {url} for more details.")?;
            Err(e)
        }
        Err(e) => Err(e),
    }
}
