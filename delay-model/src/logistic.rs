use std::collections::VecDeque;

use ndarray::{Array1, ArrayView2, Axis, Slice, Zip};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOptions {
    /// Sample weight applied to class 0 and class 1.
    pub class_weight: [f64; 2],
    /// Inverse regularization strength.
    pub c: f64,
    pub max_iter: usize,
    /// Stop once every gradient component is below this value.
    pub tolerance: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        TrainingOptions {
            class_weight: [1.0, 10.0],
            c: 1.0,
            max_iter: 100,
            tolerance: 1e-4,
        }
    }
}

/// Binary logistic regression with an L2 penalty on the coefficients.
/// The intercept is not penalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Array1<f64>,
    pub intercept: f64,
}

const ARMIJO: f64 = 1e-4;
const MAX_HALVINGS: usize = 50;
// Number of corrections kept by L-BFGS
const MEMORY: usize = 10;
const CURVATURE_EPSILON: f64 = 1e-10;

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

// ln(1 + e^z) without overflow
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Training problem over `[coefficients.., intercept]`.
struct Problem<'a> {
    x: ArrayView2<'a, f64>,
    y: Array1<f64>,
    sample_weight: Array1<f64>,
    c: f64,
}

impl<'a> Problem<'a> {
    fn new(x: ArrayView2<'a, f64>, y: &[u8], options: &TrainingOptions) -> Self {
        Problem {
            x,
            y: y.iter().map(|&label| f64::from(label)).collect(),
            sample_weight: y
                .iter()
                .map(|&label| options.class_weight[usize::from(label)])
                .collect(),
            c: options.c,
        }
    }

    fn objective_and_gradient(&self, params: &Array1<f64>) -> (f64, Array1<f64>) {
        let dims = self.x.ncols();
        let coefficients = params.slice_axis(Axis(0), Slice::from(..dims));
        let z = self.x.dot(&coefficients) + params[dims];

        let loss = Zip::from(&z)
            .and(&self.y)
            .and(&self.sample_weight)
            .map_collect(|&z, &y, &w| w * (softplus(z) - y * z))
            .sum();
        let residual = Zip::from(&z)
            .and(&self.y)
            .and(&self.sample_weight)
            .map_collect(|&z, &y, &w| self.c * w * (sigmoid(z) - y));

        let mut gradient = Array1::<f64>::zeros(dims + 1);
        gradient
            .slice_axis_mut(Axis(0), Slice::from(..dims))
            .assign(&(self.x.t().dot(&residual) + &coefficients));
        gradient[dims] = residual.sum();

        (0.5 * coefficients.dot(&coefficients) + self.c * loss, gradient)
    }
}

struct Correction {
    s: Array1<f64>,
    y: Array1<f64>,
    rho: f64,
}

/// L-BFGS two-loop recursion: approximates the inverse hessian applied to `gradient`.
fn inverse_hessian_product(gradient: &Array1<f64>, history: &VecDeque<Correction>) -> Array1<f64> {
    let mut q = gradient.clone();
    let mut alphas = Vec::with_capacity(history.len());
    for correction in history.iter().rev() {
        let alpha = correction.rho * correction.s.dot(&q);
        q.scaled_add(-alpha, &correction.y);
        alphas.push(alpha);
    }

    if let Some(last) = history.back() {
        q *= last.s.dot(&last.y) / last.y.dot(&last.y);
    }

    for (correction, alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = correction.rho * correction.y.dot(&q);
        q.scaled_add(alpha - beta, &correction.s);
    }
    q
}

fn max_abs(values: &Array1<f64>) -> f64 {
    values.fold(0.0_f64, |acc, value| acc.max(value.abs()))
}

impl LogisticRegression {
    /// Fits with L-BFGS and a backtracking line search.
    #[instrument(skip_all, fields(rows = x.nrows()))]
    pub fn fit(
        x: ArrayView2<f64>,
        y: &[u8],
        options: &TrainingOptions,
    ) -> Result<Self, ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyDataset);
        }
        if x.nrows() != y.len() {
            return Err(ModelError::LengthMismatch {
                features: x.nrows(),
                target: y.len(),
            });
        }
        if let Some(&label) = y.iter().find(|&&label| label > 1) {
            return Err(ModelError::InvalidTarget(label));
        }

        let dims = x.ncols();
        let problem = Problem::new(x, y, options);
        let mut params = Array1::<f64>::zeros(dims + 1);
        let (mut value, mut gradient) = problem.objective_and_gradient(&params);
        let mut history: VecDeque<Correction> = VecDeque::with_capacity(MEMORY);
        let mut stopped = false;

        for iteration in 0..options.max_iter {
            let norm = max_abs(&gradient);
            if norm <= options.tolerance {
                tracing::debug!(iteration, norm, "solver converged");
                stopped = true;
                break;
            }

            let mut direction = -inverse_hessian_product(&gradient, &history);
            let mut slope = gradient.dot(&direction);
            if slope >= 0.0 {
                history.clear();
                direction = -&gradient;
                slope = gradient.dot(&direction);
            }

            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_HALVINGS {
                let candidate = &params + &(&direction * scale);
                let (candidate_value, candidate_gradient) =
                    problem.objective_and_gradient(&candidate);
                if candidate_value <= value + ARMIJO * scale * slope {
                    accepted = Some((candidate, candidate_value, candidate_gradient));
                    break;
                }
                scale /= 2.0;
            }

            let Some((candidate, candidate_value, candidate_gradient)) = accepted else {
                tracing::debug!(iteration, norm, "line search stalled, keeping current solution");
                stopped = true;
                break;
            };

            let step = &candidate - &params;
            let change = &candidate_gradient - &gradient;
            let curvature = step.dot(&change);
            if curvature > CURVATURE_EPSILON {
                if history.len() == MEMORY {
                    history.pop_front();
                }
                history.push_back(Correction {
                    s: step,
                    y: change,
                    rho: 1.0 / curvature,
                });
            }

            params = candidate;
            value = candidate_value;
            gradient = candidate_gradient;
        }

        if !stopped {
            tracing::warn!(
                max_iter = options.max_iter,
                norm = max_abs(&gradient),
                "solver stopped before converging"
            );
        }

        Ok(LogisticRegression {
            coefficients: params.slice_axis(Axis(0), Slice::from(..dims)).to_owned(),
            intercept: params[dims],
        })
    }

    pub fn decision_function(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }

    /// Probability of class 1, per row.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.decision_function(x).mapv(sigmoid)
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Vec<u8> {
        self.decision_function(x)
            .iter()
            .map(|&z| u8::from(z > 0.0))
            .collect()
    }
}
