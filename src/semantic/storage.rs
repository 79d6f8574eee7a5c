//! Durable storage for photo embeddings.
//!
//! The store lives in one directory, held under an exclusive file lock:
//!
//! embeddings.bin (snapshot)
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of the image model identity)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated), followed by a CRC32 of all entry bytes:
//! - photo_id: u16 length + UTF-8 bytes
//! - album_id: u16 length + UTF-8 bytes
//! - created_at: i64 epoch milliseconds
//! - embedding: [f32; dimensions] (little-endian)
//!
//! embeddings.journal (append-only log of changes since the snapshot)
//!
//! Same 47-byte header (entry_count unused), then frames:
//! - length: u32, crc32: u32, payload
//! - payload: op u8 (1 = upsert + entry, 2 = remove + photo_id)
//!
//! A change is visible to readers only after its frame is fsynced. Opening
//! replays the journal over the snapshot and truncates a torn tail.

use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{TimeZone, Utc};

use super::types::{AlbumId, EmbeddingRecord, EmbeddingVector, PhotoId};
use crate::lock::FileLock;

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Frame header size in bytes: length(4) + checksum(4)
const FRAME_HEADER_SIZE: usize = 8;

/// Anything larger is treated as a corrupt length field.
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

const OP_UPSERT: u8 = 1;
const OP_REMOVE: u8 = 2;

const SNAPSHOT_FILE: &str = "embeddings.bin";
const JOURNAL_FILE: &str = "embeddings.journal";

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Data directory {0} is locked by another process")]
    Locked(PathBuf),
}

/// Keyed, durable access to embedding records.
///
/// Reads never block on disk I/O; writes return only once committed.
pub trait RecordStore: Send + Sync {
    /// Insert or replace the record for its photo.
    fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorStorageError>;

    /// Remove a photo's record. Returns whether one existed.
    fn remove(&self, photo_id: &PhotoId) -> Result<bool, VectorStorageError>;

    fn get(&self, photo_id: &PhotoId) -> Option<Arc<EmbeddingRecord>>;

    fn contains(&self, photo_id: &PhotoId) -> bool;

    /// Records of one album, ordered by photo id.
    fn all_for_album(&self, album_id: &AlbumId) -> Vec<Arc<EmbeddingRecord>>;

    fn all(&self) -> Vec<Arc<EmbeddingRecord>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of indexed photos per album.
    fn album_counts(&self) -> HashMap<AlbumId, usize>;
}

#[derive(Default)]
struct StoreState {
    records: HashMap<PhotoId, Arc<EmbeddingRecord>>,
    albums: HashMap<AlbumId, BTreeSet<PhotoId>>,
}

impl StoreState {
    fn insert(&mut self, record: Arc<EmbeddingRecord>) {
        let previous_album = self
            .records
            .get(&record.photo_id)
            .map(|r| r.album_id.clone());
        if let Some(album) = previous_album {
            if album != record.album_id {
                self.detach(&album, &record.photo_id);
            }
        }

        self.albums
            .entry(record.album_id.clone())
            .or_default()
            .insert(record.photo_id.clone());
        self.records.insert(record.photo_id.clone(), record);
    }

    fn remove(&mut self, photo_id: &PhotoId) -> Option<Arc<EmbeddingRecord>> {
        let old = self.records.remove(photo_id)?;
        self.detach(&old.album_id, photo_id);
        Some(old)
    }

    fn detach(&mut self, album_id: &AlbumId, photo_id: &PhotoId) {
        if let Some(photos) = self.albums.get_mut(album_id) {
            photos.remove(photo_id);
            if photos.is_empty() {
                self.albums.remove(album_id);
            }
        }
    }

    fn apply(&mut self, op: JournalOp) {
        match op {
            JournalOp::Upsert(record) => self.insert(Arc::new(record)),
            JournalOp::Remove(photo_id) => {
                self.remove(&photo_id);
            }
        }
    }

    fn sorted(&self) -> Vec<&Arc<EmbeddingRecord>> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by(|a, b| a.photo_id.cmp(&b.photo_id));
        records
    }
}

enum JournalOp {
    Upsert(EmbeddingRecord),
    Remove(PhotoId),
}

struct Journal {
    file: File,
    len: u64,
    frames: usize,
}

impl Journal {
    /// Open the journal and replay its frames into `state`.
    fn open(
        path: &Path,
        model_id: &[u8; 32],
        dimensions: usize,
        state: &mut StoreState,
    ) -> Result<Self, VectorStorageError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        if bytes.len() < HEADER_SIZE {
            if !bytes.is_empty() {
                log::warn!("Embedding journal header is truncated, starting a new journal");
            }
            return Self::create(path, model_id, dimensions);
        }

        let header = decode_header(&bytes[..HEADER_SIZE])
            .and_then(|h| validate_header(&h, model_id, dimensions));
        match header {
            Ok(()) => {}
            Err(
                e @ (VectorStorageError::ModelMismatch
                | VectorStorageError::DimensionMismatch { .. }),
            ) => {
                log::warn!("Discarding incompatible embedding journal: {}", e);
                return Self::create(path, model_id, dimensions);
            }
            // committed frames may follow a damaged header; leave them on disk
            Err(e) => return Err(e),
        }

        let mut offset = HEADER_SIZE;
        let mut frames = 0;
        while let Some(payload) = read_frame(&bytes[offset..]) {
            match decode_op(payload, dimensions) {
                Ok(op) => state.apply(op),
                Err(e) => {
                    log::warn!("Stopping journal replay at undecodable frame: {}", e);
                    break;
                }
            }
            offset += FRAME_HEADER_SIZE + payload.len();
            frames += 1;
        }

        let file = OpenOptions::new().append(true).open(path)?;
        if offset < bytes.len() {
            log::warn!(
                "Discarding {} bytes of torn embedding journal tail",
                bytes.len() - offset
            );
            file.set_len(offset as u64)?;
            file.sync_all()?;
        }

        Ok(Journal {
            file,
            len: offset as u64,
            frames,
        })
    }

    fn create(
        path: &Path,
        model_id: &[u8; 32],
        dimensions: usize,
    ) -> Result<Self, VectorStorageError> {
        let header = encode_header(&Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            dimensions: dimensions as u16,
            entry_count: 0,
        });

        let mut file = File::create(path)?;
        file.write_all(&header)?;
        file.sync_all()?;

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Journal {
            file,
            len: HEADER_SIZE as u64,
            frames: 0,
        })
    }

    /// Append one frame and fsync it. A failed append leaves the file as it was.
    fn append(&mut self, payload: &[u8]) -> Result<(), VectorStorageError> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
        frame.extend_from_slice(payload);

        let result = self
            .file
            .write_all(&frame)
            .and_then(|_| self.file.sync_data());
        if let Err(e) = result {
            let _ = self.file.set_len(self.len);
            return Err(e.into());
        }

        self.len += frame.len() as u64;
        self.frames += 1;
        Ok(())
    }

    fn truncate(&mut self) -> Result<(), VectorStorageError> {
        self.file.set_len(HEADER_SIZE as u64)?;
        self.file.sync_all()?;
        self.len = HEADER_SIZE as u64;
        self.frames = 0;
        Ok(())
    }
}

/// Embedding store backed by a snapshot file and a journal.
pub struct EmbeddingStore {
    dir: PathBuf,
    model_id: [u8; 32],
    dimensions: usize,
    compact_threshold: usize,
    state: RwLock<StoreState>,
    /// Serializes writers; held across append + publish.
    journal: Mutex<Journal>,
    _lock: FileLock,
}

impl EmbeddingStore {
    /// Open (or create) the store in `dir`.
    ///
    /// Data written for a different model or dimensionality is discarded
    /// with a warning. The journal is compacted into the snapshot once it
    /// holds `compact_threshold` frames (0 disables automatic compaction).
    pub fn open(
        dir: &Path,
        model_id: [u8; 32],
        dimensions: usize,
        compact_threshold: usize,
    ) -> Result<Self, VectorStorageError> {
        if dimensions == 0 || dimensions > u16::MAX as usize {
            return Err(VectorStorageError::InvalidFormat(format!(
                "unsupported dimensionality {}",
                dimensions
            )));
        }

        std::fs::create_dir_all(dir)?;
        let lock = FileLock::try_acquire(dir).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock {
                VectorStorageError::Locked(dir.to_path_buf())
            } else {
                VectorStorageError::Io(e)
            }
        })?;

        let snapshot_path = dir.join(SNAPSHOT_FILE);
        let journal_path = dir.join(JOURNAL_FILE);

        let mut state = match load_snapshot(&snapshot_path, &model_id, dimensions) {
            Ok(Some(state)) => state,
            Ok(None) => StoreState::default(),
            Err(
                e @ (VectorStorageError::ModelMismatch
                | VectorStorageError::DimensionMismatch { .. }),
            ) => {
                log::warn!("Stored embeddings are not comparable ({}), starting fresh", e);
                std::fs::remove_file(&snapshot_path)?;
                if journal_path.exists() {
                    std::fs::remove_file(&journal_path)?;
                }
                StoreState::default()
            }
            Err(e) => return Err(e),
        };

        let journal = Journal::open(&journal_path, &model_id, dimensions, &mut state)?;

        log::info!(
            "Opened embedding store at {} ({} records, {} journal frames)",
            dir.display(),
            state.records.len(),
            journal.frames
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            model_id,
            dimensions,
            compact_threshold,
            state: RwLock::new(state),
            journal: Mutex::new(journal),
            _lock: lock,
        })
    }

    /// Frames written since the last compaction.
    pub fn journal_frames(&self) -> usize {
        self.journal().frames
    }

    /// Fold the journal into a fresh snapshot.
    pub fn compact(&self) -> Result<(), VectorStorageError> {
        let mut journal = self.journal();
        self.compact_locked(&mut journal)
    }

    fn compact_locked(&self, journal: &mut Journal) -> Result<(), VectorStorageError> {
        let count = {
            let state = self.read();
            self.write_snapshot(&state)?;
            state.records.len()
        };
        journal.truncate()?;
        log::info!("Compacted embedding store: {} records in snapshot", count);
        Ok(())
    }

    /// Atomic write: temp file -> fsync -> rename
    fn write_snapshot(&self, state: &StoreState) -> Result<(), VectorStorageError> {
        let path = self.dir.join(SNAPSHOT_FILE);
        let temp_path = path.with_extension("tmp");

        let result = self.write_snapshot_to(&temp_path, state);
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn write_snapshot_to(&self, path: &Path, state: &StoreState) -> Result<(), VectorStorageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = encode_header(&Header {
            version: FORMAT_VERSION,
            model_id: self.model_id,
            dimensions: self.dimensions as u16,
            entry_count: state.records.len() as u64,
        });
        writer.write_all(&header)?;

        let mut hasher = crc32fast::Hasher::new();
        let mut buf = Vec::new();
        for record in state.sorted() {
            buf.clear();
            encode_record(&mut buf, record)?;
            hasher.update(&buf);
            writer.write_all(&buf)?;
        }
        writer.write_all(&hasher.finalize().to_le_bytes())?;

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }

    fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn commit(&self, payload: &[u8], publish: impl FnOnce(&mut StoreState)) -> Result<(), VectorStorageError> {
        let mut journal = self.journal();
        journal.append(payload)?;
        publish(&mut *self.write());

        if self.compact_threshold > 0 && journal.frames >= self.compact_threshold {
            if let Err(e) = self.compact_locked(&mut journal) {
                log::warn!("Embedding journal compaction failed: {}", e);
            }
        }
        Ok(())
    }
}

impl RecordStore for EmbeddingStore {
    fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorStorageError> {
        if record.vector.len() != self.dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: self.dimensions,
                got: record.vector.len(),
            });
        }

        let mut payload = vec![OP_UPSERT];
        encode_record(&mut payload, &record)?;

        self.commit(&payload, |state| state.insert(Arc::new(record)))
    }

    fn remove(&self, photo_id: &PhotoId) -> Result<bool, VectorStorageError> {
        if !self.contains(photo_id) {
            return Ok(false);
        }

        let mut payload = vec![OP_REMOVE];
        put_str(&mut payload, photo_id.as_str())?;

        let mut removed = false;
        self.commit(&payload, |state| removed = state.remove(photo_id).is_some())?;
        Ok(removed)
    }

    fn get(&self, photo_id: &PhotoId) -> Option<Arc<EmbeddingRecord>> {
        self.read().records.get(photo_id).cloned()
    }

    fn contains(&self, photo_id: &PhotoId) -> bool {
        self.read().records.contains_key(photo_id)
    }

    fn all_for_album(&self, album_id: &AlbumId) -> Vec<Arc<EmbeddingRecord>> {
        let state = self.read();
        state
            .albums
            .get(album_id)
            .map(|photos| {
                photos
                    .iter()
                    .filter_map(|id| state.records.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn all(&self) -> Vec<Arc<EmbeddingRecord>> {
        self.read().sorted().into_iter().cloned().collect()
    }

    fn len(&self) -> usize {
        self.read().records.len()
    }

    fn album_counts(&self) -> HashMap<AlbumId, usize> {
        self.read()
            .albums
            .iter()
            .map(|(album, photos)| (album.clone(), photos.len()))
            .collect()
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

fn encode_header(header: &Header) -> [u8; HEADER_SIZE] {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1..33].copy_from_slice(&header.model_id);
    header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    header_bytes
}

fn decode_header(header_bytes: &[u8]) -> Result<Header, VectorStorageError> {
    let mut reader = ByteReader::new(header_bytes);

    let version = reader.u8()?;
    if version > FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(reader.take(32)?);
    let dimensions = reader.u16()?;
    let entry_count = reader.u64()?;
    let stored_checksum = reader.u32()?;

    // Verify checksum (computed over header without checksum field)
    if stored_checksum != crc32fast::hash(&header_bytes[0..43]) {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    Ok(Header {
        version,
        model_id,
        dimensions,
        entry_count,
    })
}

fn validate_header(
    header: &Header,
    expected_model_id: &[u8; 32],
    expected_dimensions: usize,
) -> Result<(), VectorStorageError> {
    if header.model_id != *expected_model_id {
        return Err(VectorStorageError::ModelMismatch);
    }

    if header.dimensions as usize != expected_dimensions {
        return Err(VectorStorageError::DimensionMismatch {
            expected: expected_dimensions,
            got: header.dimensions as usize,
        });
    }

    Ok(())
}

fn load_snapshot(
    path: &Path,
    model_id: &[u8; 32],
    dimensions: usize,
) -> Result<Option<StoreState>, VectorStorageError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if bytes.len() < HEADER_SIZE + 4 {
        return Err(VectorStorageError::InvalidFormat(
            "snapshot is shorter than its header".to_string(),
        ));
    }

    let header = decode_header(&bytes[..HEADER_SIZE])?;
    validate_header(&header, model_id, dimensions)?;

    let (entries, trailer) = bytes[HEADER_SIZE..].split_at(bytes.len() - HEADER_SIZE - 4);
    let stored_checksum = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if crc32fast::hash(entries) != stored_checksum {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    let mut reader = ByteReader::new(entries);
    let mut state = StoreState::default();
    for _ in 0..header.entry_count {
        state.insert(Arc::new(reader.record(dimensions)?));
    }
    if !reader.is_empty() {
        return Err(VectorStorageError::InvalidFormat(
            "trailing bytes after snapshot entries".to_string(),
        ));
    }

    Ok(Some(state))
}

/// The payload of a complete, intact frame at the start of `buf`.
fn read_frame(buf: &[u8]) -> Option<&[u8]> {
    if buf.len() < FRAME_HEADER_SIZE {
        return None;
    }

    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let checksum = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if len == 0 || len > MAX_FRAME_SIZE || buf.len() - FRAME_HEADER_SIZE < len {
        return None;
    }

    let payload = &buf[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len];
    (crc32fast::hash(payload) == checksum).then_some(payload)
}

fn decode_op(payload: &[u8], dimensions: usize) -> Result<JournalOp, VectorStorageError> {
    let mut reader = ByteReader::new(payload);
    let op = match reader.u8()? {
        OP_UPSERT => JournalOp::Upsert(reader.record(dimensions)?),
        OP_REMOVE => JournalOp::Remove(PhotoId::new(reader.string()?)),
        other => {
            return Err(VectorStorageError::InvalidFormat(format!(
                "unknown journal op {}",
                other
            )))
        }
    };

    if !reader.is_empty() {
        return Err(VectorStorageError::InvalidFormat(
            "trailing bytes in journal frame".to_string(),
        ));
    }
    Ok(op)
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> Result<(), VectorStorageError> {
    let len = u16::try_from(s.len()).map_err(|_| {
        VectorStorageError::InvalidFormat(format!("identifier longer than {} bytes", u16::MAX))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn encode_record(buf: &mut Vec<u8>, record: &EmbeddingRecord) -> Result<(), VectorStorageError> {
    put_str(buf, record.photo_id.as_str())?;
    put_str(buf, record.album_id.as_str())?;
    buf.extend_from_slice(&record.created_at.timestamp_millis().to_le_bytes());
    for &value in record.vector.as_slice() {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    Ok(())
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], VectorStorageError> {
        if self.buf.len() - self.pos < n {
            return Err(VectorStorageError::InvalidFormat(
                "unexpected end of data".to_string(),
            ));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, VectorStorageError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, VectorStorageError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, VectorStorageError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, VectorStorageError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn i64(&mut self) -> Result<i64, VectorStorageError> {
        Ok(self.u64()? as i64)
    }

    fn string(&mut self) -> Result<String, VectorStorageError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| VectorStorageError::InvalidFormat(format!("identifier is not UTF-8: {}", e)))
    }

    fn record(&mut self, dimensions: usize) -> Result<EmbeddingRecord, VectorStorageError> {
        let photo_id = PhotoId::new(self.string()?);
        let album_id = AlbumId::new(self.string()?);

        let millis = self.i64()?;
        let created_at = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| VectorStorageError::InvalidFormat(format!("bad timestamp {}", millis)))?;

        let values = self
            .take(dimensions * 4)?
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let vector = EmbeddingVector::new(values, dimensions)
            .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))?;

        Ok(EmbeddingRecord {
            photo_id,
            album_id,
            vector,
            created_at,
        })
    }
}
