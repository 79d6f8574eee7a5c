use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::json;

use crate::{
    config::Config,
    engine::OnnxBackend,
    gallery::DirectoryPhotoSource,
    semantic::{
        AlbumId, AlbumScope, EmbeddingStore, EncodeOptions, EncoderService, JobHandle,
        JobProgress, JobStatus, PhotoId, RecordStore, SearchService,
    },
};

/// Directory under the data dir holding the embedding store.
pub const INDEX_DIR: &str = "index";

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn encoders(config: &Config) -> Arc<EncoderService> {
    let backend = Arc::new(OnnxBackend::new(
        config.models.intra_threads,
        config.models.optimization_level,
    ));
    Arc::new(EncoderService::from_config(
        &config.models,
        config.base_path(),
        backend,
    ))
}

fn open_store(config: &Config, encoders: &EncoderService) -> Result<Arc<EmbeddingStore>> {
    let dir = config.base_path().join(INDEX_DIR);
    let store = EmbeddingStore::open(
        &dir,
        encoders.model_id_hash(),
        encoders.dimensions(),
        config.index.journal_compact_threshold,
    )
    .with_context(|| format!("failed to open embedding store at {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn gallery_root(config: &Config) -> PathBuf {
    config
        .gallery
        .root
        .clone()
        .unwrap_or_else(|| config.base_path().join("photos"))
}

/// Everything a command needs, opened once per process.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<EmbeddingStore>,
    pub service: Arc<SearchService>,
}

/// Wire the ONNX backend, the store and the directory photo source into a
/// search service.
pub fn build_context(config: Config) -> Result<AppContext> {
    let encoders = encoders(&config);
    let store = open_store(&config, &encoders)?;
    let root = gallery_root(&config);
    log::debug!("gallery root: {}", root.display());

    let service = Arc::new(SearchService::new(
        encoders,
        store.clone(),
        Arc::new(DirectoryPhotoSource::new(root)),
        &config.index,
        config.search.clone(),
    ));

    Ok(AppContext {
        config,
        store,
        service,
    })
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Draw progress until the job ends. The first Ctrl-C cancels the job.
async fn follow_with_bar(handle: &JobHandle) -> JobProgress {
    let bar = progress_bar();
    let mut rx = handle.subscribe();
    let mut cancelling = false;

    let last = loop {
        let progress = rx.borrow_and_update().clone();
        bar.set_length(progress.total as u64);
        bar.set_position(progress.completed as u64);
        if !progress.failures.is_empty() {
            bar.set_message(format!("{} failed", progress.failures.len()));
        }
        if progress.status.is_terminal() {
            break progress;
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break handle.progress();
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancelling => {
                log::warn!("cancelling job {}", handle.job_id());
                handle.cancel();
                cancelling = true;
            }
        }
    };
    bar.finish_and_clear();
    last
}

pub async fn handle_index(
    service: Arc<SearchService>,
    album: String,
    reencode: bool,
    quiet: bool,
) -> Result<()> {
    let options = EncodeOptions {
        reencode,
        ..Default::default()
    };
    let handle = service
        .encode_album(AlbumId::new(album), None, options)
        .await?;

    let last = if quiet {
        tokio::select! {
            progress = handle.wait() => progress,
            _ = tokio::signal::ctrl_c() => {
                log::warn!("cancelling job {}", handle.job_id());
                handle.cancel();
                handle.wait().await
            }
        }
    } else {
        follow_with_bar(&handle).await
    };

    print_json(&last)?;
    if let JobStatus::Failed(reason) = &last.status {
        bail!("indexing failed: {reason}");
    }
    Ok(())
}

pub async fn handle_search(
    service: Arc<SearchService>,
    query: String,
    albums: Vec<String>,
    top_k: Option<usize>,
    min_score: Option<f32>,
) -> Result<()> {
    let scope = AlbumScope::from_albums(albums.into_iter().map(AlbumId::new).collect());
    let results = service.search(&query, &scope, top_k, min_score).await?;
    print_json(&results)
}

pub async fn handle_similar(
    service: Arc<SearchService>,
    photo_id: String,
    albums: Vec<String>,
    top_k: Option<usize>,
) -> Result<()> {
    let scope = AlbumScope::from_albums(albums.into_iter().map(AlbumId::new).collect());
    let results = service
        .search_by_photo(&PhotoId::new(photo_id), &scope, top_k)
        .await?;
    print_json(&results)
}

pub async fn handle_status(service: Arc<SearchService>, album: Option<String>) -> Result<()> {
    match album {
        Some(album) => print_json(&service.album_state(&AlbumId::new(album)).await?),
        None => {
            let states = service.album_states().await?;
            print_json(&json!({
                "records": service.store().len(),
                "albums": states,
            }))
        }
    }
}

pub async fn handle_forget(service: Arc<SearchService>, photo_id: String) -> Result<()> {
    let photo_id = PhotoId::new(photo_id);
    let removed = service.remove_photo(&photo_id).await?;
    print_json(&json!({ "photo_id": photo_id, "removed": removed }))
}

pub async fn handle_compact(store: Arc<EmbeddingStore>) -> Result<()> {
    let store = tokio::task::spawn_blocking(move || store.compact().map(|_| store)).await??;
    print_json(&json!({
        "records": store.len(),
        "journal_frames": store.journal_frames(),
    }))
}

pub async fn handle_daemon(
    service: Arc<SearchService>,
    config: Config,
    listen: Option<SocketAddr>,
) -> Result<()> {
    let listen = match listen {
        Some(addr) => addr,
        None => config
            .daemon
            .listen
            .parse()
            .with_context(|| format!("invalid daemon.listen {:?}", config.daemon.listen))?,
    };

    // Searches still work (and report the load error) if warm-up fails.
    if let Err(e) = service.warm_up().await {
        log::error!("failed to load models: {e}");
    }

    crate::web::serve(service, listen).await
}
