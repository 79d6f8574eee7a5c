//! Search service used by the CLI and the daemon.
//!
//! Ties the pieces together:
//! - Indexing requests go to the `IndexingPipeline`
//! - Text queries go through the text tower and are ranked against the store
//! - Album state is derived from the photo source and the store

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::embeddings::{EncodeError, EncoderService};
use super::pipeline::{EncodeOptions, IndexingPipeline, JobHandle, JobProgress};
use super::ranker::{RankedPhoto, SimilarityRanker};
use super::storage::{RecordStore, VectorStorageError};
use super::types::{AlbumId, EmbeddingRecord, PhotoId};
use crate::config::{IndexConfig, SearchConfig};
use crate::eid::JobId;
use crate::gallery::{PhotoSource, PhotoSourceError};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error("Photo {0} is not indexed")]
    PhotoNotIndexed(PhotoId),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error(transparent)]
    PhotoSource(#[from] PhotoSourceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// The albums a search ranks over.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum AlbumScope {
    #[default]
    All,
    Albums(Vec<AlbumId>),
}

impl AlbumScope {
    /// An empty album list means all albums.
    pub fn from_albums(albums: Vec<AlbumId>) -> Self {
        if albums.is_empty() {
            AlbumScope::All
        } else {
            AlbumScope::Albums(albums)
        }
    }
}

/// Whether an album can be searched yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlbumIndexState {
    pub album_id: AlbumId,
    pub total_photos: usize,
    /// Photos of the album that have a stored embedding
    pub indexed: usize,
    pub searchable: bool,
}

pub struct SearchService {
    encoders: Arc<EncoderService>,
    store: Arc<dyn RecordStore>,
    photos: Arc<dyn PhotoSource>,
    pipeline: IndexingPipeline,
    defaults: SearchConfig,
}

impl SearchService {
    pub fn new(
        encoders: Arc<EncoderService>,
        store: Arc<dyn RecordStore>,
        photos: Arc<dyn PhotoSource>,
        index: &IndexConfig,
        defaults: SearchConfig,
    ) -> Self {
        let pipeline = IndexingPipeline::new(
            encoders.clone(),
            store.clone(),
            photos.clone(),
            index.store_write_retries,
            index.job_history,
        );

        Self {
            encoders,
            store,
            photos,
            pipeline,
            defaults,
        }
    }

    pub fn pipeline(&self) -> &IndexingPipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Load both models ahead of the first request.
    pub async fn warm_up(&self) -> Result<(), SearchError> {
        Ok(self.encoders.warm_up().await?)
    }

    /// Start indexing an album. Without explicit `photo_ids` the whole album
    /// is listed from the photo source.
    pub async fn encode_album(
        &self,
        album_id: AlbumId,
        photo_ids: Option<Vec<PhotoId>>,
        options: EncodeOptions,
    ) -> Result<JobHandle, SearchError> {
        if let Some(handle) = self.pipeline.active_job_for(&album_id) {
            return Ok(handle);
        }

        let photo_ids = match photo_ids {
            Some(ids) => ids,
            None => self.list_photos(&album_id).await?,
        };
        Ok(self.pipeline.encode_album(album_id, photo_ids, options))
    }

    /// Start one job per album.
    pub async fn encode_albums(
        &self,
        album_ids: Vec<AlbumId>,
        options: EncodeOptions,
    ) -> Result<Vec<JobHandle>, SearchError> {
        let unique: BTreeSet<AlbumId> = album_ids.into_iter().collect();
        let mut handles = Vec::with_capacity(unique.len());
        for album_id in unique {
            handles.push(self.encode_album(album_id, None, options.clone()).await?);
        }
        Ok(handles)
    }

    pub fn cancel(&self, job_id: &JobId) -> bool {
        self.pipeline.cancel(job_id)
    }

    pub fn job(&self, job_id: &JobId) -> Option<JobProgress> {
        self.pipeline.job(job_id)
    }

    /// Rank photos in `scope` against a natural-language query.
    pub async fn search(
        &self,
        query: &str,
        scope: &AlbumScope,
        top_k: Option<usize>,
        min_score: Option<f32>,
    ) -> Result<Vec<RankedPhoto>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let vector = self.encoders.text().encode_text(query).await?;
        let candidates = self.candidates(scope);

        let results = SimilarityRanker::new(vector.as_slice()).rank(
            candidates.iter().map(|r| r.as_ref()),
            top_k.unwrap_or(self.defaults.default_top_k),
            min_score.or(self.defaults.default_min_score),
        );

        log::debug!(
            "Query '{}' ranked {} candidates, returning {}",
            query,
            candidates.len(),
            results.len()
        );
        Ok(results)
    }

    /// Rank photos in `scope` by similarity to an indexed photo, excluding it.
    pub async fn search_by_photo(
        &self,
        photo_id: &PhotoId,
        scope: &AlbumScope,
        top_k: Option<usize>,
    ) -> Result<Vec<RankedPhoto>, SearchError> {
        let source = self
            .store
            .get(photo_id)
            .ok_or_else(|| SearchError::PhotoNotIndexed(photo_id.clone()))?;
        let candidates = self.candidates(scope);

        Ok(SimilarityRanker::new(source.vector.as_slice()).rank(
            candidates
                .iter()
                .map(|r| r.as_ref())
                .filter(|r| r.photo_id != *photo_id),
            top_k.unwrap_or(self.defaults.default_top_k),
            self.defaults.default_min_score,
        ))
    }

    pub async fn album_state(&self, album_id: &AlbumId) -> Result<AlbumIndexState, SearchError> {
        let photos = self.list_photos(album_id).await?;
        let indexed = photos.iter().filter(|id| self.store.contains(id)).count();

        Ok(AlbumIndexState {
            album_id: album_id.clone(),
            total_photos: photos.len(),
            indexed,
            searchable: indexed > 0,
        })
    }

    /// State of every album the photo source knows.
    pub async fn album_states(&self) -> Result<Vec<AlbumIndexState>, SearchError> {
        let photos = self.photos.clone();
        let albums = tokio::task::spawn_blocking(move || photos.list_albums())
            .await
            .map_err(|e| SearchError::Internal(e.to_string()))??;

        let mut states = Vec::with_capacity(albums.len());
        for album_id in &albums {
            states.push(self.album_state(album_id).await?);
        }
        Ok(states)
    }

    /// Drop a photo's embedding. Returns whether one was stored.
    pub async fn remove_photo(&self, photo_id: &PhotoId) -> Result<bool, SearchError> {
        let store = self.store.clone();
        let id = photo_id.clone();
        let removed = tokio::task::spawn_blocking(move || store.remove(&id))
            .await
            .map_err(|e| SearchError::Internal(e.to_string()))??;

        if removed {
            log::info!("Removed embedding for {}", photo_id);
        }
        Ok(removed)
    }

    fn candidates(&self, scope: &AlbumScope) -> Vec<Arc<EmbeddingRecord>> {
        match scope {
            AlbumScope::All => self.store.all(),
            AlbumScope::Albums(albums) => {
                let unique: BTreeSet<&AlbumId> = albums.iter().collect();
                unique
                    .into_iter()
                    .flat_map(|album| self.store.all_for_album(album))
                    .collect()
            }
        }
    }

    async fn list_photos(&self, album_id: &AlbumId) -> Result<Vec<PhotoId>, SearchError> {
        let photos = self.photos.clone();
        let id = album_id.clone();
        tokio::task::spawn_blocking(move || photos.list_photos(&id))
            .await
            .map_err(|e| SearchError::Internal(e.to_string()))?
            .map_err(SearchError::from)
    }
}
