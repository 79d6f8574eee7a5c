//! On-device semantic photo search.
//!
//! Photos and text queries are embedded into the same vector space by a
//! two-tower CLIP-style model; search is cosine similarity over the stored
//! photo embeddings.
//!
//! # Architecture
//!
//! - `preprocess`: Image to normalized NCHW tensor
//! - `session`: Lazily loaded inference session shared by one tower
//! - `tokenizer`: Query text to fixed-length token ids
//! - `embeddings`: Image and text encoders over the inference engine
//! - `storage`: Persistent embedding store (snapshot plus journal)
//! - `pipeline`: Background album indexing jobs with progress and cancellation
//! - `ranker`: Cosine similarity and top-k selection
//! - `service`: High-level search service used by the CLI and the daemon

pub mod embeddings;
pub mod pipeline;
pub mod preprocess;
pub mod ranker;
mod service;
pub mod session;
pub mod storage;
pub mod tokenizer;
pub mod types;

pub use embeddings::{EncodeError, EncoderService};
pub use pipeline::{EncodeOptions, JobHandle, JobProgress, JobStatus};
pub use ranker::RankedPhoto;
pub use service::{AlbumIndexState, AlbumScope, SearchError, SearchService};
pub use storage::{EmbeddingStore, RecordStore};
pub use types::{AlbumId, PhotoId};
