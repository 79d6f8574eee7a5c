use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{DynamicImage, Rgb, RgbImage};

use crate::config::{IndexConfig, SearchConfig, TokenType};
use crate::engine::testing::FakeBackend;
use crate::gallery::{PhotoSource, PhotoSourceError};
use crate::semantic::embeddings::{ImageEncoder, TextEncoder};
use crate::semantic::session::ModelAsset;
use crate::semantic::storage::VectorStorageError;
use crate::semantic::tokenizer::{fit_context, QueryTokenizer, TokenizeError};
use crate::semantic::types::EmbeddingRecord;
use crate::semantic::{
    AlbumId, EmbeddingStore, EncoderService, PhotoId, RecordStore, SearchService,
};

pub const DIMS: usize = 16;
pub const CONTEXT_LENGTH: usize = 8;

/// Token id = word length; good enough to make different queries differ.
pub struct LengthTokenizer;

impl QueryTokenizer for LengthTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<i64>, TokenizeError> {
        let ids = text.split_whitespace().map(|w| w.len() as i64).collect();
        Ok(fit_context(ids, CONTEXT_LENGTH))
    }
}

pub fn encoders(backend: FakeBackend) -> Arc<EncoderService> {
    let asset = ModelAsset::Bytes(Arc::from(&b"weights"[..]));
    let backend = Arc::new(backend);
    let image = ImageEncoder::new(asset.clone(), backend.clone(), DIMS);
    let text = TextEncoder::new(
        asset,
        backend,
        Arc::new(LengthTokenizer),
        DIMS,
        CONTEXT_LENGTH,
        TokenType::Int64,
    );
    Arc::new(EncoderService::new(image, text, "fake-clip"))
}

type DecodeHook = Box<dyn Fn(&PhotoId) + Send + Sync>;

/// In-memory gallery producing a distinct synthetic image per photo.
pub struct FakePhotoSource {
    albums: BTreeMap<AlbumId, Vec<PhotoId>>,
    failing: HashSet<PhotoId>,
    copies: HashMap<PhotoId, PhotoId>,
    hook: Mutex<Option<DecodeHook>>,
    decodes: AtomicUsize,
}

impl FakePhotoSource {
    pub fn new() -> Self {
        Self {
            albums: BTreeMap::new(),
            failing: HashSet::new(),
            copies: HashMap::new(),
            hook: Mutex::new(None),
            decodes: AtomicUsize::new(0),
        }
    }

    /// Add `count` photos named `<album>/<n>.jpg`, n starting at 1.
    pub fn with_album(mut self, album: &str, count: usize) -> Self {
        let photos = (1..=count)
            .map(|n| PhotoId::new(format!("{album}/{n}.jpg")))
            .collect();
        self.albums.insert(AlbumId::from(album), photos);
        self
    }

    pub fn with_failing(mut self, photo: &str) -> Self {
        self.failing.insert(PhotoId::from(photo));
        self
    }

    /// Make `photo` decode to the same pixels as `original`.
    pub fn with_copy(mut self, photo: &str, original: &str) -> Self {
        self.copies
            .insert(PhotoId::from(photo), PhotoId::from(original));
        self
    }

    /// Run `hook` on every decode, on the decoding thread.
    pub fn set_hook(&self, hook: impl Fn(&PhotoId) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    fn image_for(&self, photo_id: &PhotoId) -> DynamicImage {
        let key = self.copies.get(photo_id).unwrap_or(photo_id);
        let seed = key
            .as_str()
            .bytes()
            .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));

        DynamicImage::ImageRgb8(RgbImage::from_fn(32, 24, |x, y| {
            Rgb([
                (seed as u8).wrapping_add((x * 7) as u8),
                ((seed >> 8) as u8) ^ (y as u8).wrapping_mul(5),
                ((seed >> 16) as u8).wrapping_add((x + y) as u8),
            ])
        }))
    }
}

impl PhotoSource for FakePhotoSource {
    fn list_albums(&self) -> Result<Vec<AlbumId>, PhotoSourceError> {
        Ok(self.albums.keys().cloned().collect())
    }

    fn list_photos(&self, album_id: &AlbumId) -> Result<Vec<PhotoId>, PhotoSourceError> {
        self.albums
            .get(album_id)
            .cloned()
            .ok_or_else(|| PhotoSourceError::NotFound(album_id.to_string()))
    }

    fn decode(&self, photo_id: &PhotoId) -> Result<DynamicImage, PhotoSourceError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(photo_id);
        }

        if self.failing.contains(photo_id) {
            return Err(PhotoSourceError::Decode {
                photo_id: photo_id.clone(),
                reason: "truncated file".to_string(),
            });
        }
        Ok(self.image_for(photo_id))
    }
}

/// Store that rejects the first `failures` upserts.
pub struct FlakyStore {
    inner: EmbeddingStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: EmbeddingStore, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

impl RecordStore for FlakyStore {
    fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorStorageError> {
        let left = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if left.is_ok() {
            return Err(VectorStorageError::Io(std::io::Error::other("disk full")));
        }
        self.inner.upsert(record)
    }

    fn remove(&self, photo_id: &PhotoId) -> Result<bool, VectorStorageError> {
        self.inner.remove(photo_id)
    }

    fn get(&self, photo_id: &PhotoId) -> Option<Arc<EmbeddingRecord>> {
        self.inner.get(photo_id)
    }

    fn contains(&self, photo_id: &PhotoId) -> bool {
        self.inner.contains(photo_id)
    }

    fn all_for_album(&self, album_id: &AlbumId) -> Vec<Arc<EmbeddingRecord>> {
        self.inner.all_for_album(album_id)
    }

    fn all(&self) -> Vec<Arc<EmbeddingRecord>> {
        self.inner.all()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn album_counts(&self) -> HashMap<AlbumId, usize> {
        self.inner.album_counts()
    }
}

pub fn open_store(dir: &std::path::Path, encoders: &EncoderService) -> EmbeddingStore {
    EmbeddingStore::open(dir, encoders.model_id_hash(), DIMS, 0).expect("failed to open store")
}

/// A search service over an isolated temp directory.
pub struct TestService {
    pub service: Arc<SearchService>,
    pub photos: Arc<FakePhotoSource>,
    pub backend: FakeBackend,
    pub dir: tempfile::TempDir,
}

pub fn create_service(photos: FakePhotoSource) -> TestService {
    create_service_with(photos, FakeBackend::new(DIMS), 0, 1)
}

/// `flaky_writes` upserts fail before the store starts accepting them.
pub fn create_service_with(
    photos: FakePhotoSource,
    backend: FakeBackend,
    flaky_writes: usize,
    store_write_retries: u32,
) -> TestService {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let encoders = encoders(backend.clone());
    let store: Arc<dyn RecordStore> = Arc::new(FlakyStore::new(
        open_store(dir.path(), &encoders),
        flaky_writes,
    ));
    let photos = Arc::new(photos);

    let index = IndexConfig {
        store_write_retries,
        ..Default::default()
    };
    let service = Arc::new(SearchService::new(
        encoders,
        store,
        photos.clone(),
        &index,
        SearchConfig::default(),
    ));

    TestService {
        service,
        photos,
        backend,
        dir,
    }
}
