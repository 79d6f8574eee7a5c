//! ONNX Runtime backend.
//!
//! Models are committed from memory, so both `.onnx` protobuf files and the
//! mobile `.ort` flatbuffer format load the same way; the runtime recognizes
//! the format from the bytes.

use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

use super::{EngineError, InferenceBackend, InferenceSession, InputTensor, OutputTensor, TensorData};

/// Creates `ort` sessions with a fixed optimization level and thread count.
pub struct OnnxBackend {
    intra_threads: usize,
    optimization_level: u8,
}

impl OnnxBackend {
    /// `intra_threads == 0` keeps the runtime's default thread pool size.
    pub fn new(intra_threads: usize, optimization_level: u8) -> Self {
        Self {
            intra_threads,
            optimization_level,
        }
    }

    fn graph_level(&self) -> GraphOptimizationLevel {
        match self.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        }
    }
}

fn load_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Load(e.to_string())
}

fn run_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Run(e.to_string())
}

impl InferenceBackend for OnnxBackend {
    fn name(&self) -> &str {
        "onnxruntime"
    }

    fn load(&self, model: &[u8]) -> Result<Box<dyn InferenceSession>, EngineError> {
        let mut builder = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(self.graph_level())
            .map_err(load_err)?;

        if self.intra_threads > 0 {
            builder = builder.with_intra_threads(self.intra_threads).map_err(load_err)?;
        }

        let session = builder.commit_from_memory(model).map_err(load_err)?;

        let inputs: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let outputs: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        log::debug!(
            "Loaded ONNX session (inputs: {:?}, outputs: {:?})",
            inputs,
            outputs
        );

        Ok(Box::new(OnnxSession {
            session,
            inputs,
            outputs,
        }))
    }
}

struct OnnxSession {
    session: Session,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl InferenceSession for OnnxSession {
    fn input_names(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn output_names(&self) -> Vec<String> {
        self.outputs.clone()
    }

    fn run(&mut self, input_name: &str, input: InputTensor) -> Result<OutputTensor, EngineError> {
        if !self.inputs.iter().any(|name| name == input_name) {
            return Err(EngineError::UnknownInput(input_name.to_string()));
        }
        if self.outputs.is_empty() {
            return Err(EngineError::NoOutput);
        }

        let shape = input.shape;
        let value = match input.data {
            TensorData::F32(data) => Value::from_array((shape, data)).map(|t| t.into_dyn()),
            TensorData::I64(data) => Value::from_array((shape, data)).map(|t| t.into_dyn()),
            TensorData::I32(data) => Value::from_array((shape, data)).map(|t| t.into_dyn()),
        }
        .map_err(|e| EngineError::InvalidTensor(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![input_name => value])
            .map_err(run_err)?;

        let (out_shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(run_err)?;

        Ok(OutputTensor {
            shape: out_shape.iter().map(|&d| d.max(0) as usize).collect(),
            data: data.to_vec(),
        })
    }
}
