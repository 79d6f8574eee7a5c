//! Inference runtime seam.
//!
//! The embedding engine needs exactly three things from a neural network
//! runtime: load a model from bytes, describe the graph's input/output names,
//! and execute one forward pass. Everything else (preprocessing, session
//! lifecycle, serialization of calls) lives in `crate::semantic`.
//!
//! - `OnnxBackend`: ONNX Runtime via `ort` (`.onnx` and `.ort` model files)

mod onnx;

pub use onnx::OnnxBackend;

/// Errors reported by an inference runtime.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Model has no input named '{0}'")]
    UnknownInput(String),

    #[error("Invalid tensor: {0}")]
    InvalidTensor(String),

    #[error("Forward pass failed: {0}")]
    Run(String),

    #[error("Model produced no outputs")]
    NoOutput,
}

/// Flat element buffer of an input tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I64(Vec<i64>),
    I32(Vec<i32>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::I64(v) => v.len(),
            TensorData::I32(v) => v.len(),
        }
    }
}

/// A dense, row-major input tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl InputTensor {
    /// Build a tensor, checking that the buffer fills the shape exactly.
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self, EngineError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(EngineError::InvalidTensor(format!(
                "shape {:?} needs {} elements, buffer has {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }
}

/// The first output of a forward pass, as f32.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// A loaded model graph.
///
/// `run` takes `&mut self`: a native session must not execute two forward
/// passes at once, callers serialize access.
pub trait InferenceSession: Send {
    fn input_names(&self) -> Vec<String>;
    fn output_names(&self) -> Vec<String>;
    fn run(&mut self, input_name: &str, input: InputTensor) -> Result<OutputTensor, EngineError>;
}

/// Factory for sessions; one backend may load any number of models.
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;
    fn load(&self, model: &[u8]) -> Result<Box<dyn InferenceSession>, EngineError>;
}

#[cfg(test)]
pub mod testing {
    //! Deterministic in-process backend used by tests in place of a native
    //! runtime.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Produces `dims`-long outputs that are a pure function of the input
    /// buffer, so identical inputs always give identical vectors.
    #[derive(Clone)]
    pub struct FakeBackend {
        pub dims: usize,
        pub input_name: String,
        pub loads: Arc<AtomicUsize>,
        pub runs: Arc<AtomicUsize>,
        pub load_delay: Duration,
        pub run_delay: Duration,
        pub fail_load: bool,
        pub fail_runs: bool,
        pub output_len: Option<usize>,
        /// Runs after this many produce one element too few.
        pub bad_output_after: Option<usize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl FakeBackend {
        pub fn new(dims: usize) -> Self {
            Self {
                dims,
                input_name: "input".to_string(),
                loads: Arc::new(AtomicUsize::new(0)),
                runs: Arc::new(AtomicUsize::new(0)),
                load_delay: Duration::ZERO,
                run_delay: Duration::ZERO,
                fail_load: false,
                fail_runs: false,
                output_len: None,
                bad_output_after: None,
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn load_count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }

        pub fn run_count(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }

        /// Most runs ever executing at the same time, across all sessions.
        pub fn max_concurrent_runs(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    impl InferenceBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }

        fn load(&self, model: &[u8]) -> Result<Box<dyn InferenceSession>, EngineError> {
            if !self.load_delay.is_zero() {
                std::thread::sleep(self.load_delay);
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_load || model.is_empty() {
                return Err(EngineError::Load("corrupt model asset".to_string()));
            }
            Ok(Box::new(FakeSession {
                backend: self.clone(),
            }))
        }
    }

    struct FakeSession {
        backend: FakeBackend,
    }

    impl InferenceSession for FakeSession {
        fn input_names(&self) -> Vec<String> {
            vec![self.backend.input_name.clone()]
        }

        fn output_names(&self) -> Vec<String> {
            vec!["embeds".to_string()]
        }

        fn run(&mut self, input_name: &str, input: InputTensor) -> Result<OutputTensor, EngineError> {
            let running = self.backend.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.backend.max_in_flight.fetch_max(running, Ordering::SeqCst);
            if !self.backend.run_delay.is_zero() {
                std::thread::sleep(self.backend.run_delay);
            }
            let result = self.forward(input_name, input);
            self.backend.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    impl FakeSession {
        fn forward(&self, input_name: &str, input: InputTensor) -> Result<OutputTensor, EngineError> {
            let run = self.backend.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if input_name != self.backend.input_name {
                return Err(EngineError::UnknownInput(input_name.to_string()));
            }
            if self.backend.fail_runs {
                return Err(EngineError::Run("native runtime error".to_string()));
            }

            let values: Vec<f32> = match input.data {
                TensorData::F32(v) => v,
                TensorData::I64(v) => v.into_iter().map(|x| x as f32).collect(),
                TensorData::I32(v) => v.into_iter().map(|x| x as f32).collect(),
            };

            let len = match self.backend.bad_output_after {
                Some(after) if run > after => self.backend.dims - 1,
                _ => self.backend.output_len.unwrap_or(self.backend.dims),
            };
            let mut out = vec![0.0f32; len];
            for (i, value) in values.iter().enumerate() {
                let slot = (i * 31 + i / len.max(1)) % len.max(1);
                out[slot] += value * (1.0 + (i % 7) as f32);
            }

            Ok(OutputTensor {
                shape: vec![1, len],
                data: out,
            })
        }
    }
}
