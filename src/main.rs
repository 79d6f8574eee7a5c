use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod config;
mod eid;
mod engine;
mod gallery;
mod lock;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use cli::Command;
use config::Config;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Args::parse();

    let data_dir = config::resolve_data_dir(args.data_dir)?;
    let config = Config::load_with(&data_dir)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let cli::AppContext {
            config,
            store,
            service,
        } = cli::build_context(config)?;

        match args.command {
            Command::Index {
                album,
                reencode,
                quiet,
            } => cli::handle_index(service, album, reencode, quiet).await,

            Command::Search {
                query,
                albums,
                top_k,
                min_score,
            } => cli::handle_search(service, query, albums, top_k, min_score).await,

            Command::Similar {
                photo_id,
                albums,
                top_k,
            } => cli::handle_similar(service, photo_id, albums, top_k).await,

            Command::Status { album } => cli::handle_status(service, album).await,

            Command::Forget { photo_id } => cli::handle_forget(service, photo_id).await,

            Command::Compact {} => cli::handle_compact(store).await,

            Command::Daemon { listen } => cli::handle_daemon(service, config, listen).await,
        }
    })
}
