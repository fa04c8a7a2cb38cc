use serde::{Deserialize, Serialize};

/// A first order optimizer updating a flat parameter vector in place.
pub trait Optimizer: Send {
    /// Apply one update given the gradient of the loss and the learning rate.
    fn step(&mut self, params: &mut [f64], grads: &[f64], lr: f64);
}

/// Optimizer selection and hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OptimizerConfig {
    /// Stochastic gradient descent with optional momentum.
    Sgd {
        /// Momentum factor, 0 disables it.
        momentum: f64,
    },
    /// Adam with decoupled weight decay.
    AdamW {
        /// Decoupled weight decay coefficient.
        weight_decay: f64,
        /// Exponential decay of the first moment estimate.
        beta1: f64,
        /// Exponential decay of the second moment estimate.
        beta2: f64,
        /// Term added to the denominator for numerical stability.
        eps: f64,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::AdamW {
            weight_decay: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl OptimizerConfig {
    /// Build the optimizer for `num_params` parameters.
    pub fn build(&self, num_params: usize) -> Box<dyn Optimizer> {
        match *self {
            OptimizerConfig::Sgd { momentum } => Box::new(Sgd::new(num_params, momentum)),
            OptimizerConfig::AdamW {
                weight_decay,
                beta1,
                beta2,
                eps,
            } => Box::new(AdamW::new(num_params, weight_decay, beta1, beta2, eps)),
        }
    }
}

/// Stochastic gradient descent.
#[derive(Debug, Clone)]
pub struct Sgd {
    momentum: f64,
    velocity: Vec<f64>,
}

impl Sgd {
    /// Create a new SGD optimizer.
    pub fn new(num_params: usize, momentum: f64) -> Self {
        Self {
            momentum,
            velocity: vec![0.0; num_params],
        }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [f64], grads: &[f64], lr: f64) {
        for ((p, g), v) in params.iter_mut().zip(grads).zip(self.velocity.iter_mut()) {
            *v = self.momentum * *v + g;
            *p -= lr * *v;
        }
    }
}

/// Adam with decoupled weight decay (Loshchilov & Hutter).
#[derive(Debug, Clone)]
pub struct AdamW {
    weight_decay: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    m: Vec<f64>,
    v: Vec<f64>,
    t: i32,
}

impl AdamW {
    /// Create a new AdamW optimizer.
    pub fn new(num_params: usize, weight_decay: f64, beta1: f64, beta2: f64, eps: f64) -> Self {
        Self {
            weight_decay,
            beta1,
            beta2,
            eps,
            m: vec![0.0; num_params],
            v: vec![0.0; num_params],
            t: 0,
        }
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut [f64], grads: &[f64], lr: f64) {
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);

        for (i, (p, g)) in params.iter_mut().zip(grads).enumerate() {
            *p -= lr * self.weight_decay * *p;

            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * g;
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * g * g;

            let m_hat = self.m[i] / bias1;
            let v_hat = self.v[i] / bias2;
            *p -= lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}
