use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::TrainError;

/// Serializable snapshot of a model's parameters.
#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct ModelState {
    /// Name of the model type the parameters belong to.
    pub name: String,
    /// Flat parameter vector.
    pub parameters: Vec<f64>,
}

/// A differentiable mapping from input points to predicted points.
///
/// The trainer drives models only through this trait, so any network can be
/// plugged in as long as it can return parameter gradients for a given
/// gradient of its output.
pub trait Model {
    /// Name stored in checkpoints and checked on load.
    fn name(&self) -> &str;

    /// Predict output points for one sample.
    fn predict(&self, input: &[[f64; 3]]) -> Vec<[f64; 3]>;

    /// Gradient of the loss w.r.t. the parameters, given the gradient w.r.t.
    /// the output of [`Model::predict`] on `input`.
    fn backward(&self, input: &[[f64; 3]], grad_output: &[[f64; 3]]) -> Vec<f64>;

    /// Flat parameter vector.
    fn parameters(&self) -> &[f64];

    /// Flat parameter vector, mutably.
    fn parameters_mut(&mut self) -> &mut [f64];

    /// Snapshot the parameters.
    fn state(&self) -> ModelState {
        ModelState {
            name: self.name().to_string(),
            parameters: self.parameters().to_vec(),
        }
    }

    /// Restore parameters from a snapshot of the same model type.
    fn load_state(&mut self, state: &ModelState) -> Result<(), TrainError> {
        if state.name != self.name() || state.parameters.len() != self.parameters().len() {
            return Err(TrainError::StateMismatch {
                expected: format!("{} ({} parameters)", self.name(), self.parameters().len()),
                found: format!("{} ({} parameters)", state.name, state.parameters.len()),
            });
        }
        self.parameters_mut().copy_from_slice(&state.parameters);
        Ok(())
    }
}

/// Per-point affine map `p' = A p + b`, initialized to the identity.
///
/// Parameters are the row-major entries of `A` followed by `b`.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineModel {
    params: [f64; 12],
}

impl Default for AffineModel {
    fn default() -> Self {
        Self {
            params: [
                1.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, //
                0.0, 0.0, 1.0, //
                0.0, 0.0, 0.0,
            ],
        }
    }
}

impl AffineModel {
    /// Create the identity model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a model from a row-major matrix and a translation.
    pub fn from_parts(matrix: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        let mut params = [0.0; 12];
        for (i, row) in matrix.iter().enumerate() {
            params[3 * i..3 * i + 3].copy_from_slice(row);
        }
        params[9..].copy_from_slice(&translation);
        Self { params }
    }

    /// The linear part of the map.
    pub fn matrix(&self) -> [[f64; 3]; 3] {
        let p = &self.params;
        [[p[0], p[1], p[2]], [p[3], p[4], p[5]], [p[6], p[7], p[8]]]
    }

    /// The translation part of the map.
    pub fn translation(&self) -> [f64; 3] {
        [self.params[9], self.params[10], self.params[11]]
    }
}

impl Model for AffineModel {
    fn name(&self) -> &str {
        "affine"
    }

    fn predict(&self, input: &[[f64; 3]]) -> Vec<[f64; 3]> {
        let matrix = self.matrix();
        let translation = self.translation();
        let mut output = vec![[0.0; 3]; input.len()];
        handgeo_3d::linalg::transform_points(input, &matrix, &translation, &mut output);
        output
    }

    fn backward(&self, input: &[[f64; 3]], grad_output: &[[f64; 3]]) -> Vec<f64> {
        // dL/dA_ij = Σ g_i p_j, dL/db_i = Σ g_i
        let mut grads = vec![0.0; 12];
        for (p, g) in input.iter().zip(grad_output) {
            for i in 0..3 {
                for j in 0..3 {
                    grads[3 * i + j] += g[i] * p[j];
                }
                grads[9 + i] += g[i];
            }
        }
        grads
    }

    fn parameters(&self) -> &[f64] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [f64] {
        &mut self.params
    }
}
