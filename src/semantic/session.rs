//! Lifecycle-managed model sessions.
//!
//! A `ModelSession` is bound to one model asset. The native session is
//! created on first use, exactly once even when several callers race for it,
//! and forward passes on it run one at a time. Loading and inference are
//! blocking native calls, so both are moved onto tokio's blocking pool.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::engine::{EngineError, InferenceBackend, InferenceSession, InputTensor, OutputTensor};

/// Where a model's bytes come from.
#[derive(Clone)]
pub enum ModelAsset {
    File(PathBuf),
    Bytes(Arc<[u8]>),
}

impl ModelAsset {
    async fn read(&self) -> std::io::Result<Arc<[u8]>> {
        match self {
            ModelAsset::File(path) => tokio::fs::read(path).await.map(Arc::from),
            ModelAsset::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

impl Display for ModelAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelAsset::File(path) => write!(f, "{}", path.display()),
            ModelAsset::Bytes(bytes) => write!(f, "<{} bytes in memory>", bytes.len()),
        }
    }
}

/// Errors that can occur while loading or running a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to load {label} model from {asset}: {reason}")]
    Load {
        label: &'static str,
        asset: String,
        reason: String,
    },

    #[error("Input rejected by the {label} model: {reason}")]
    Shape { label: &'static str, reason: String },

    #[error("Inference failed in the {label} model: {reason}")]
    Inference { label: &'static str, reason: String },
}

struct LoadedSession {
    input_name: String,
    session: Arc<Mutex<Box<dyn InferenceSession>>>,
}

/// A shared, lazily-loaded handle to one model.
pub struct ModelSession {
    label: &'static str,
    asset: ModelAsset,
    backend: Arc<dyn InferenceBackend>,
    loaded: OnceCell<LoadedSession>,
}

impl ModelSession {
    pub fn new(label: &'static str, asset: ModelAsset, backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            label,
            asset,
            backend,
            loaded: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Load the model unless it is already loaded.
    ///
    /// A failed load leaves the session empty; the next call tries again.
    pub async fn ensure_loaded(&self) -> Result<(), SessionError> {
        if self.is_loaded() {
            log::debug!("{} model already loaded, skip loading", self.label);
            return Ok(());
        }
        self.get().await.map(|_| ())
    }

    /// Run one forward pass with `input` bound to the model's first input.
    pub async fn run(&self, input: InputTensor) -> Result<OutputTensor, SessionError> {
        let loaded = self.get().await?;
        let input_name = loaded.input_name.clone();
        let guard = loaded.session.clone().lock_owned().await;
        let label = self.label;

        let result = tokio::task::spawn_blocking(move || {
            let mut session = guard;
            session.run(&input_name, input)
        })
        .await
        .map_err(|e| SessionError::Inference {
            label,
            reason: format!("runtime panicked: {e}"),
        })?;

        result.map_err(|e| match e {
            EngineError::UnknownInput(_) | EngineError::InvalidTensor(_) => SessionError::Shape {
                label,
                reason: e.to_string(),
            },
            other => SessionError::Inference {
                label,
                reason: other.to_string(),
            },
        })
    }

    async fn get(&self) -> Result<&LoadedSession, SessionError> {
        self.loaded.get_or_try_init(|| self.load()).await
    }

    async fn load(&self) -> Result<LoadedSession, SessionError> {
        let load_err = |reason: String| SessionError::Load {
            label: self.label,
            asset: self.asset.to_string(),
            reason,
        };

        log::info!("Loading {} model from {}...", self.label, self.asset);

        let bytes = self.asset.read().await.map_err(|e| load_err(e.to_string()))?;
        let backend = self.backend.clone();

        let session = tokio::task::spawn_blocking(move || backend.load(&bytes))
            .await
            .map_err(|e| load_err(format!("runtime panicked: {e}")))?
            .map_err(|e| load_err(e.to_string()))?;

        let input_name = session
            .input_names()
            .into_iter()
            .next()
            .ok_or_else(|| load_err("model declares no inputs".to_string()))?;
        if session.output_names().is_empty() {
            return Err(load_err("model declares no outputs".to_string()));
        }

        log::info!(
            "Finished loading {} model with {} (input '{}')",
            self.label,
            self.backend.name(),
            input_name
        );

        Ok(LoadedSession {
            input_name,
            session: Arc::new(Mutex::new(session)),
        })
    }
}
