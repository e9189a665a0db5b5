use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cloudtools::cancel::CancelToken;
use cloudtools::cmd::{dispatch, Args, Context};
use cloudtools::config::RetryPolicy;
use cloudtools::dataproc::DataprocClient;
use cloudtools::storage::GcsStore;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let env = args.environment()?;
    let api = args.api_config();
    let retry = RetryPolicy::default();

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling");
            on_interrupt.cancel();
        }
    });

    let clusters = DataprocClient::new(&api, env.clone(), retry, cancel.clone())?;
    let store = GcsStore::connect(&api, retry, cancel.clone()).await;

    let ctx = Context {
        env,
        clusters: Arc::new(clusters),
        store: Arc::new(store),
        poll: args.poll_policy(),
        cancel,
        upload_concurrency: args.upload_concurrency,
    };

    let mut stdout = std::io::stdout();
    dispatch(&args.command, &ctx, &mut stdout).await?;
    Ok(())
}
