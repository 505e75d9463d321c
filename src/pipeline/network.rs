//! Two-hidden-layer feed-forward regressor
//!
//! input -> dense(h1, ReLU) -> dropout(d1) -> dense(h2, ReLU) -> dropout(d2) -> dense(1)
//!
//! Trained with Adam on mini-batch MSE. Inputs and target are standardized
//! with training statistics kept in the model, and training stops once the
//! monitored loss has not improved for `patience` epochs; the best weights
//! seen are the ones returned.

use faer::{Mat, MatRef};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::design::{select_rows, Standardizer};
use super::error::{PipelineError, Result};

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;

/// One point of the hyperparameter grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub hidden_units_1: usize,
    pub hidden_units_2: usize,
    pub dropout_1: f64,
    pub dropout_2: f64,
    pub learning_rate: f64,
}

impl std::fmt::Display for NetworkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "h1={} h2={} d1={} d2={} lr={}",
            self.hidden_units_1, self.hidden_units_2, self.dropout_1, self.dropout_2, self.learning_rate
        )
    }
}

/// Epoch budget and early-stopping settings shared by every run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub max_epochs: usize,
    pub batch_size: usize,
    pub patience: usize,
    /// Improvement smaller than this does not reset the patience counter
    pub min_delta: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            max_epochs: 200,
            batch_size: 32,
            patience: 10,
            min_delta: 0.0,
        }
    }
}

impl TrainingSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_epochs == 0 || self.batch_size == 0 || self.patience == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_epochs, batch_size and patience must all be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loss watched for early stopping
#[derive(Debug, Clone, Copy)]
pub enum Monitor<'a> {
    /// Held-out rows on the original feature scale
    Holdout { x: &'a Mat<f64>, y: &'a [f64] },
    /// The training rows themselves, evaluated without dropout
    Training,
}

/// Outcome of one training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Best monitored MSE in the response's original units; non-finite if the run diverged
    pub best_loss: f64,
    pub best_epoch: usize,
    pub epochs_run: usize,
}

impl TrainingReport {
    pub fn diverged(&self) -> bool {
        !self.best_loss.is_finite()
    }
}

#[derive(Debug, Clone)]
struct Dense {
    weights: Mat<f64>,
    bias: Mat<f64>,
}

impl Dense {
    /// Glorot-uniform weights, zero bias
    fn glorot(fan_in: usize, fan_out: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
        Self {
            weights: Mat::from_fn(fan_in, fan_out, |_, _| rng.gen_range(-limit..limit)),
            bias: Mat::zeros(1, fan_out),
        }
    }

    fn forward(&self, input: MatRef<'_, f64>) -> Mat<f64> {
        let mut out = input * self.weights.as_ref();
        for i in 0..out.nrows() {
            for j in 0..out.ncols() {
                out[(i, j)] += self.bias[(0, j)];
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
struct Mlp {
    hidden_1: Dense,
    hidden_2: Dense,
    output: Dense,
}

/// Activations kept from a training forward pass
struct Trace {
    pre_1: Mat<f64>,
    act_1: Mat<f64>,
    mask_1: Mat<f64>,
    pre_2: Mat<f64>,
    act_2: Mat<f64>,
    mask_2: Mat<f64>,
    out: Mat<f64>,
}

/// Inverted dropout mask: kept units are scaled by 1 / (1 - p)
fn dropout_mask(rows: usize, cols: usize, p: f64, rng: &mut StdRng) -> Mat<f64> {
    if p <= 0.0 {
        return Mat::from_fn(rows, cols, |_, _| 1.0);
    }
    let keep = 1.0 / (1.0 - p);
    Mat::from_fn(rows, cols, |_, _| if rng.gen::<f64>() >= p { keep } else { 0.0 })
}

fn relu_masked(pre: &Mat<f64>, mask: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(pre.nrows(), pre.ncols(), |i, j| pre[(i, j)].max(0.0) * mask[(i, j)])
}

fn relu(pre: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(pre.nrows(), pre.ncols(), |i, j| pre[(i, j)].max(0.0))
}

fn column_sums(m: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(1, m.ncols(), |_, j| (0..m.nrows()).map(|i| m[(i, j)]).sum())
}

impl Mlp {
    fn new(inputs: usize, config: &NetworkConfig, rng: &mut StdRng) -> Self {
        Self {
            hidden_1: Dense::glorot(inputs, config.hidden_units_1, rng),
            hidden_2: Dense::glorot(config.hidden_units_1, config.hidden_units_2, rng),
            output: Dense::glorot(config.hidden_units_2, 1, rng),
        }
    }

    fn predict(&self, x: MatRef<'_, f64>) -> Vec<f64> {
        let act_1 = relu(&self.hidden_1.forward(x));
        let act_2 = relu(&self.hidden_2.forward(act_1.as_ref()));
        let out = self.output.forward(act_2.as_ref());
        (0..out.nrows()).map(|i| out[(i, 0)]).collect()
    }

    fn forward_train(&self, x: MatRef<'_, f64>, config: &NetworkConfig, rng: &mut StdRng) -> Trace {
        let pre_1 = self.hidden_1.forward(x);
        let mask_1 = dropout_mask(pre_1.nrows(), pre_1.ncols(), config.dropout_1, rng);
        let act_1 = relu_masked(&pre_1, &mask_1);

        let pre_2 = self.hidden_2.forward(act_1.as_ref());
        let mask_2 = dropout_mask(pre_2.nrows(), pre_2.ncols(), config.dropout_2, rng);
        let act_2 = relu_masked(&pre_2, &mask_2);

        let out = self.output.forward(act_2.as_ref());
        Trace {
            pre_1,
            act_1,
            mask_1,
            pre_2,
            act_2,
            mask_2,
            out,
        }
    }

    /// Gradients of the batch MSE, in `parameters_mut` order
    fn backward(&self, x: MatRef<'_, f64>, y: &[f64], trace: &Trace) -> [Mat<f64>; 6] {
        let batch = y.len() as f64;
        let d_out = Mat::from_fn(trace.out.nrows(), 1, |i, _| 2.0 * (trace.out[(i, 0)] - y[i]) / batch);

        let g_w3 = trace.act_2.transpose() * d_out.as_ref();
        let g_b3 = column_sums(&d_out);

        let d_act_2 = d_out.as_ref() * self.output.weights.transpose();
        let d_pre_2 = Mat::from_fn(d_act_2.nrows(), d_act_2.ncols(), |i, j| {
            if trace.pre_2[(i, j)] > 0.0 {
                d_act_2[(i, j)] * trace.mask_2[(i, j)]
            } else {
                0.0
            }
        });
        let g_w2 = trace.act_1.transpose() * d_pre_2.as_ref();
        let g_b2 = column_sums(&d_pre_2);

        let d_act_1 = d_pre_2.as_ref() * self.hidden_2.weights.transpose();
        let d_pre_1 = Mat::from_fn(d_act_1.nrows(), d_act_1.ncols(), |i, j| {
            if trace.pre_1[(i, j)] > 0.0 {
                d_act_1[(i, j)] * trace.mask_1[(i, j)]
            } else {
                0.0
            }
        });
        let g_w1 = x.transpose() * d_pre_1.as_ref();
        let g_b1 = column_sums(&d_pre_1);

        [g_w1, g_b1, g_w2, g_b2, g_w3, g_b3]
    }

    fn parameters_mut(&mut self) -> [&mut Mat<f64>; 6] {
        [
            &mut self.hidden_1.weights,
            &mut self.hidden_1.bias,
            &mut self.hidden_2.weights,
            &mut self.hidden_2.bias,
            &mut self.output.weights,
            &mut self.output.bias,
        ]
    }
}

/// Adam with bias-corrected first and second moments
struct Adam {
    learning_rate: f64,
    beta1_power: f64,
    beta2_power: f64,
    m: Vec<Mat<f64>>,
    v: Vec<Mat<f64>>,
}

impl Adam {
    fn new(learning_rate: f64, mlp: &mut Mlp) -> Self {
        let shapes: Vec<(usize, usize)> = mlp
            .parameters_mut()
            .iter()
            .map(|p| (p.nrows(), p.ncols()))
            .collect();
        Self {
            learning_rate,
            beta1_power: 1.0,
            beta2_power: 1.0,
            m: shapes.iter().map(|&(r, c)| Mat::zeros(r, c)).collect(),
            v: shapes.iter().map(|&(r, c)| Mat::zeros(r, c)).collect(),
        }
    }

    fn step(&mut self, mlp: &mut Mlp, grads: &[Mat<f64>; 6]) {
        self.beta1_power *= ADAM_BETA1;
        self.beta2_power *= ADAM_BETA2;
        let lr = self.learning_rate;
        let (c1, c2) = (1.0 - self.beta1_power, 1.0 - self.beta2_power);

        for (k, param) in mlp.parameters_mut().into_iter().enumerate() {
            let grad = &grads[k];
            let (m, v) = (&mut self.m[k], &mut self.v[k]);
            for i in 0..param.nrows() {
                for j in 0..param.ncols() {
                    let g = grad[(i, j)];
                    m[(i, j)] = ADAM_BETA1 * m[(i, j)] + (1.0 - ADAM_BETA1) * g;
                    v[(i, j)] = ADAM_BETA2 * v[(i, j)] + (1.0 - ADAM_BETA2) * g * g;
                    let m_hat = m[(i, j)] / c1;
                    let v_hat = v[(i, j)] / c2;
                    param[(i, j)] -= lr * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
                }
            }
        }
    }
}

/// Trained network with the scalers fitted on its training rows
#[derive(Debug, Clone)]
pub struct NetworkModel {
    mlp: Mlp,
    x_scaler: Standardizer,
    y_mean: f64,
    y_scale: f64,
    pub config: NetworkConfig,
    pub columns: Vec<String>,
}

impl NetworkModel {
    pub fn predict(&self, x: &Mat<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.x_scaler.means.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "network expects {} column(s) but the matrix has {}",
                self.x_scaler.means.len(),
                x.ncols()
            )));
        }
        let z = self.x_scaler.transform(x);
        Ok(self
            .mlp
            .predict(z.as_ref())
            .into_iter()
            .map(|v| v * self.y_scale + self.y_mean)
            .collect())
    }
}

fn scaled_mse(mlp: &Mlp, z: MatRef<'_, f64>, y_scaled: &[f64]) -> f64 {
    let predicted = mlp.predict(z);
    predicted
        .iter()
        .zip(y_scaled)
        .map(|(p, y)| (p - y) * (p - y))
        .sum::<f64>()
        / y_scaled.len().max(1) as f64
}

/// Train one network from scratch with early stopping on `monitor`
pub fn train(
    x: &Mat<f64>,
    y: &[f64],
    columns: &[String],
    config: &NetworkConfig,
    settings: &TrainingSettings,
    monitor: Monitor<'_>,
    mut rng: StdRng,
) -> Result<(NetworkModel, TrainingReport)> {
    settings.validate()?;
    let n = y.len();
    if n == 0 || x.nrows() != n {
        return Err(PipelineError::InvalidConfig(format!(
            "network training needs matching, non-empty inputs ({} rows, {} targets)",
            x.nrows(),
            n
        )));
    }

    let x_scaler = Standardizer::fit(x);
    let z = x_scaler.transform(x);
    let y_mean = y.iter().sum::<f64>() / n as f64;
    let y_var = y.iter().map(|v| (v - y_mean) * (v - y_mean)).sum::<f64>() / n as f64;
    if y_var.sqrt() <= 1e-12 {
        return Err(PipelineError::DegenerateResponse {
            field: "response".to_string(),
            value: y_mean,
        });
    }
    let y_scale = y_var.sqrt();
    let y_scaled: Vec<f64> = y.iter().map(|v| (v - y_mean) / y_scale).collect();

    let (monitor_z, monitor_y) = match monitor {
        Monitor::Holdout { x: hx, y: hy } => (
            x_scaler.transform(hx),
            hy.iter().map(|v| (v - y_mean) / y_scale).collect::<Vec<f64>>(),
        ),
        Monitor::Training => (z.clone(), y_scaled.clone()),
    };

    let mut mlp = Mlp::new(x.ncols(), config, &mut rng);
    let mut adam = Adam::new(config.learning_rate, &mut mlp);

    let mut best = mlp.clone();
    let mut best_loss = f64::INFINITY;
    let mut best_epoch = 0;
    let mut stale = 0;
    let mut epochs_run = 0;
    let mut order: Vec<usize> = (0..n).collect();

    for epoch in 1..=settings.max_epochs {
        epochs_run = epoch;
        order.shuffle(&mut rng);

        for batch in order.chunks(settings.batch_size) {
            let xb = select_rows(&z, batch);
            let yb: Vec<f64> = batch.iter().map(|&i| y_scaled[i]).collect();
            let trace = mlp.forward_train(xb.as_ref(), config, &mut rng);
            let grads = mlp.backward(xb.as_ref(), &yb, &trace);
            adam.step(&mut mlp, &grads);
        }

        let loss = scaled_mse(&mlp, monitor_z.as_ref(), &monitor_y);
        if !loss.is_finite() {
            debug!(epoch, %config, "training diverged");
            best_loss = f64::NAN;
            break;
        }
        if loss < best_loss - settings.min_delta {
            best_loss = loss;
            best_epoch = epoch;
            best = mlp.clone();
            stale = 0;
        } else {
            stale += 1;
            if stale >= settings.patience {
                break;
            }
        }
    }

    let report = TrainingReport {
        best_loss: best_loss * y_scale * y_scale,
        best_epoch,
        epochs_run,
    };
    let model = NetworkModel {
        mlp: best,
        x_scaler,
        y_mean,
        y_scale,
        config: *config,
        columns: columns.to_vec(),
    };
    Ok((model, report))
}
