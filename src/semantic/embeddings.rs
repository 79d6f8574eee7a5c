//! Image and text towers of the dual encoder.
//!
//! Both towers map into the same vector space, so a query vector from
//! `TextEncoder` is directly comparable with photo vectors from
//! `ImageEncoder`:
//! - Lazy model loading on first encode (or explicitly via `load_model`)
//! - One forward pass per call, serialized per tower
//! - Output validated against the configured dimensionality

use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;

use super::preprocess::{self, ImageTensor};
use super::session::{ModelAsset, ModelSession, SessionError};
use super::tokenizer::{ClipTokenizer, QueryTokenizer, TokenizeError};
use super::types::{EmbeddingError, EmbeddingVector, PhotoId};
use crate::config::{ModelsConfig, TokenType};
use crate::engine::{InferenceBackend, InputTensor, OutputTensor, TensorData};

/// Error type for encode operations
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Tensor shape mismatch: {0}")]
    TensorShapeMismatch(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
}

impl EncodeError {
    /// Whether the error is a property of the model rather than of one input.
    ///
    /// Retrying the next photo after a fatal error would fail the same way.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EncodeError::ModelLoad(_) | EncodeError::TensorShapeMismatch(_)
        )
    }
}

impl From<SessionError> for EncodeError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Load { .. } => EncodeError::ModelLoad(e.to_string()),
            SessionError::Shape { .. } => EncodeError::TensorShapeMismatch(e.to_string()),
            SessionError::Inference { .. } => EncodeError::Inference(e.to_string()),
        }
    }
}

/// An encode failure attributed to a specific photo.
#[derive(Debug, thiserror::Error)]
#[error("Failed to encode photo {photo_id}: {source}")]
pub struct EncodingFailure {
    pub photo_id: PhotoId,
    #[source]
    pub source: EncodeError,
}

fn into_vector(output: OutputTensor, dimensions: usize) -> Result<EmbeddingVector, EncodeError> {
    let shape = output.shape;
    EmbeddingVector::new(output.data, dimensions).map_err(|e| match e {
        EmbeddingError::DimensionMismatch { .. } => {
            EncodeError::TensorShapeMismatch(format!("model output {:?}: {}", shape, e))
        }
        EmbeddingError::NonFinite(_) => EncodeError::Inference(e.to_string()),
    })
}

/// Image tower: decoded image in, embedding out.
pub struct ImageEncoder {
    session: ModelSession,
    dimensions: usize,
}

impl ImageEncoder {
    pub fn new(asset: ModelAsset, backend: Arc<dyn InferenceBackend>, dimensions: usize) -> Self {
        Self {
            session: ModelSession::new("image", asset, backend),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Load the model now instead of on first encode. Idempotent.
    pub async fn load_model(&self) -> Result<(), EncodeError> {
        Ok(self.session.ensure_loaded().await?)
    }

    /// Preprocess and encode a decoded image. Resizing runs on the blocking pool.
    pub async fn encode(&self, image: DynamicImage) -> Result<EmbeddingVector, EncodeError> {
        let tensor = tokio::task::spawn_blocking(move || preprocess::to_tensor(&image))
            .await
            .map_err(|e| EncodeError::Inference(format!("preprocessing panicked: {e}")))?;
        self.encode_tensor(tensor).await
    }

    /// Encode a tensor that was already preprocessed.
    pub async fn encode_tensor(&self, tensor: ImageTensor) -> Result<EmbeddingVector, EncodeError> {
        let output = self.session.run(tensor.into_input()).await?;
        into_vector(output, self.dimensions)
    }

    /// Encode one photo, naming it in the failure.
    pub async fn encode_photo(
        &self,
        photo_id: &PhotoId,
        image: DynamicImage,
    ) -> Result<EmbeddingVector, EncodingFailure> {
        self.encode(image).await.map_err(|source| EncodingFailure {
            photo_id: photo_id.clone(),
            source,
        })
    }
}

/// Text tower: query in, embedding out.
pub struct TextEncoder {
    session: ModelSession,
    tokenizer: Arc<dyn QueryTokenizer>,
    dimensions: usize,
    context_length: usize,
    token_type: TokenType,
}

impl TextEncoder {
    pub fn new(
        asset: ModelAsset,
        backend: Arc<dyn InferenceBackend>,
        tokenizer: Arc<dyn QueryTokenizer>,
        dimensions: usize,
        context_length: usize,
        token_type: TokenType,
    ) -> Self {
        Self {
            session: ModelSession::new("text", asset, backend),
            tokenizer,
            dimensions,
            context_length,
            token_type,
        }
    }

    pub async fn load_model(&self) -> Result<(), EncodeError> {
        Ok(self.session.ensure_loaded().await?)
    }

    /// Encode a row of exactly `context_length` token ids.
    pub async fn encode_tokens(&self, token_ids: &[i64]) -> Result<EmbeddingVector, EncodeError> {
        if token_ids.len() != self.context_length {
            return Err(EncodeError::TensorShapeMismatch(format!(
                "expected {} token ids, got {}",
                self.context_length,
                token_ids.len()
            )));
        }

        let data = match self.token_type {
            TokenType::Int64 => TensorData::I64(token_ids.to_vec()),
            TokenType::Int32 => TensorData::I32(token_ids.iter().map(|&id| id as i32).collect()),
        };
        let input = InputTensor::new(vec![1, self.context_length], data)
            .map_err(|e| EncodeError::TensorShapeMismatch(e.to_string()))?;

        let output = self.session.run(input).await?;
        into_vector(output, self.dimensions)
    }

    /// Tokenize and encode a natural-language query.
    ///
    /// Tokenization (and the tokenizer's first load) runs on the blocking pool.
    pub async fn encode_text(&self, text: &str) -> Result<EmbeddingVector, EncodeError> {
        let tokenizer = self.tokenizer.clone();
        let text = text.to_owned();
        let token_ids = tokio::task::spawn_blocking(move || tokenizer.tokenize(&text))
            .await
            .map_err(|e| EncodeError::Inference(format!("tokenizer panicked: {e}")))??;
        self.encode_tokens(&token_ids).await
    }
}

/// Owns both towers; shared by the pipeline and the search service.
pub struct EncoderService {
    image: ImageEncoder,
    text: TextEncoder,
    model_id: String,
}

impl EncoderService {
    pub fn new(image: ImageEncoder, text: TextEncoder, model_id: impl Into<String>) -> Self {
        Self {
            image,
            text,
            model_id: model_id.into(),
        }
    }

    /// Build both towers from the `models` config section.
    ///
    /// Relative asset paths resolve against `data_dir`.
    pub fn from_config(
        models: &ModelsConfig,
        data_dir: &Path,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                data_dir.join(p)
            }
        };

        let tokenizer = Arc::new(ClipTokenizer::new(
            resolve(&models.tokenizer),
            models.context_length,
        ));

        let image = ImageEncoder::new(
            ModelAsset::File(resolve(&models.image_model)),
            backend.clone(),
            models.dimensions,
        );
        let text = TextEncoder::new(
            ModelAsset::File(resolve(&models.text_model)),
            backend,
            tokenizer,
            models.dimensions,
            models.context_length,
            models.token_type,
        );

        Self::new(image, text, models.model_id.clone())
    }

    pub fn image(&self) -> &ImageEncoder {
        &self.image
    }

    pub fn text(&self) -> &TextEncoder {
        &self.text
    }

    pub fn dimensions(&self) -> usize {
        self.image.dimensions()
    }

    /// Compute SHA256 hash of the model identity for storage identification.
    pub fn model_id_hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.model_id.as_bytes());
        hasher.finalize().into()
    }

    /// Load both towers concurrently.
    pub async fn warm_up(&self) -> Result<(), EncodeError> {
        let (image, text) = tokio::join!(self.image.load_model(), self.text.load_model());
        image?;
        text?;
        Ok(())
    }
}
