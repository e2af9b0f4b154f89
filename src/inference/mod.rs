//! Predictor interface
//!
//! The forecasting model is an opaque collaborator: a normalized tensor of
//! shape `(1, N, 1, H, W)` goes in, a tensor of shape `(1, K, 1, H', W')`
//! comes out. Implementations must be deterministic and must not keep
//! state between calls.
//!
//! `PersistencePredictor` repeats the most recent input frame K times so the
//! pipeline can run end to end without model weights.

mod tensor;

pub use tensor::Tensor;

use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("input tensor has shape {actual:?}, expected {expected:?}")]
    InputShape {
        expected: [usize; 5],
        actual: [usize; 5],
    },

    #[error("tensor data length {len} does not match shape {shape:?}")]
    DataLength { shape: [usize; 5], len: usize },

    #[error("predictor output has shape {actual:?}, expected {expected:?}")]
    OutputShape {
        expected: [usize; 5],
        actual: [usize; 5],
    },

    #[error("predictor output contains values outside [0, 1]")]
    OutOfRange,

    #[error("model failure: {0}")]
    Model(String),
}

/// Forecasting model.
pub trait Predictor: Send + Sync {
    /// Run inference on a `(1, N, 1, H, W)` window.
    fn predict(&self, input: &Tensor) -> Result<Tensor, InferenceError>;

    /// Number of lead times (K) this model produces.
    fn forecast_steps(&self) -> usize;

    /// Name for logging
    fn name(&self) -> &'static str;
}

/// Run `predictor` and check its output contract.
///
/// The output must have the input's batch and channel sizes, K time steps,
/// and values in `[0, 1]`. The spatial size may differ from the input.
pub fn run_checked(predictor: &dyn Predictor, input: &Tensor) -> Result<Tensor, InferenceError> {
    let started = std::time::Instant::now();
    let output = predictor.predict(input)?;

    let [b, _, c, _, _] = input.shape();
    let [ob, ok, oc, oh, ow] = output.shape();
    let expected = [b, predictor.forecast_steps(), c, oh, ow];
    if [ob, ok, oc, oh, ow] != expected || oh == 0 || ow == 0 {
        return Err(InferenceError::OutputShape {
            expected,
            actual: output.shape(),
        });
    }
    // NaN fails this check too.
    if !output.data().iter().all(|v| (0.0..=1.0).contains(v)) {
        return Err(InferenceError::OutOfRange);
    }

    debug!(
        predictor = predictor.name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        output_shape = ?output.shape(),
        "Inference complete"
    );
    Ok(output)
}

// ============================================================================
// Persistence
// ============================================================================

/// Repeats the last input frame for every lead time.
#[derive(Debug, Clone)]
pub struct PersistencePredictor {
    window_length: usize,
    height: usize,
    width: usize,
    steps: usize,
}

impl PersistencePredictor {
    pub fn new(window_length: usize, height: usize, width: usize, steps: usize) -> Self {
        Self {
            window_length,
            height,
            width,
            steps,
        }
    }

    fn expected_input(&self) -> [usize; 5] {
        [1, self.window_length, 1, self.height, self.width]
    }
}

impl Predictor for PersistencePredictor {
    fn predict(&self, input: &Tensor) -> Result<Tensor, InferenceError> {
        if input.shape() != self.expected_input() {
            return Err(InferenceError::InputShape {
                expected: self.expected_input(),
                actual: input.shape(),
            });
        }
        let last = input.frame(0, self.window_length - 1, 0);
        let mut data = Vec::with_capacity(last.len() * self.steps);
        for _ in 0..self.steps {
            data.extend_from_slice(last);
        }
        Tensor::new([1, self.steps, 1, self.height, self.width], data)
    }

    fn forecast_steps(&self) -> usize {
        self.steps
    }

    fn name(&self) -> &'static str {
        "persistence"
    }
}
