//! Core value types shared by the encoders, the store and the ranker.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Stable, externally assigned photo identifier.
    PhotoId
);

string_id!(
    /// Identifier of the album a photo belongs to.
    AlbumId
);

/// Errors raised when a vector violates the embedding invariants.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EmbeddingError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Embedding contains a non-finite value at position {0}")]
    NonFinite(usize),
}

/// A model output vector of exactly the model's dimensionality.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>, dimensions: usize) -> Result<Self, EmbeddingError> {
        if values.len() != dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimensions,
                got: values.len(),
            });
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite(pos));
        }
        Ok(Self(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// The stored embedding of one photo.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub photo_id: PhotoId,
    pub album_id: AlbumId,
    pub vector: EmbeddingVector,
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    /// Create a record stamped with the current time.
    pub fn new(photo_id: PhotoId, album_id: AlbumId, vector: EmbeddingVector) -> Self {
        Self {
            photo_id,
            album_id,
            vector,
            created_at: Utc::now(),
        }
    }
}
