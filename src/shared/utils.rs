//! Small numerical helpers shared by the diffusion model and the trainer
use anyhow::{anyhow, Result};
use ndarray::{s, Array1, Array2};

const EPSILON: f64 = 1e-10;

/// Floor used when taking the log of a probability, so that degenerate
/// profiles never send a log-likelihood to -inf.
pub const LOG_FLOOR: f64 = 1e-12;

pub trait Normalize {
    fn normalize_distribution(&self) -> Result<Self>
    where
        Self: Sized;
}

impl Normalize for Array1<f64> {
    fn normalize_distribution(&self) -> Result<Self> {
        if self.iter().any(|&x| x < 0.0) {
            // negative values mean something wrong happened
            return Err(anyhow!("Array contains negative values"));
        }

        let sum = self.sum();
        if sum.abs() < EPSILON {
            // return a uniform distribution
            return Ok(Array1::from_elem(self.dim(), 1. / self.dim() as f64));
        }

        Ok(self / sum)
    }
}

/// Normalize each row of the array independently
/// equivalent of a/a.sum(axis=1)[:, np.newaxis] in numpy
pub trait Normalize2 {
    fn normalize_rows(&self) -> Result<Self>
    where
        Self: Sized;
}

impl Normalize2 for Array2<f64> {
    fn normalize_rows(&self) -> Result<Self> {
        if self.iter().any(|&x| !x.is_finite() || x < 0.0) {
            return Err(anyhow!("Array contains negative or non-finite values"));
        }
        let mut normalized = Array2::<f64>::zeros(self.dim());
        for kk in 0..self.dim().0 {
            let sum = self.slice(s![kk, ..]).sum();
            if sum.abs() < EPSILON {
                for ii in 0..self.dim().1 {
                    normalized[[kk, ii]] = 1. / (self.dim().1 as f64);
                }
            } else {
                for ii in 0..self.dim().1 {
                    normalized[[kk, ii]] = self[[kk, ii]] / sum;
                }
            }
        }
        Ok(normalized)
    }
}

pub fn logsumexp(arr: &Array1<f64>) -> f64 {
    let max = arr.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + arr.mapv(|x| (x - max).exp()).sum().ln()
}

/// Row-wise softmax, with a temperature (logits / temperature)
pub fn softmax_rows(logits: &Array2<f64>, temperature: f64) -> Result<Array2<f64>> {
    if temperature <= 0. {
        return Err(anyhow!("Temperature must be strictly positive"));
    }
    let mut out = Array2::<f64>::zeros(logits.dim());
    for kk in 0..logits.dim().0 {
        let row = logits.slice(s![kk, ..]).mapv(|x| x / temperature);
        let lse = logsumexp(&row);
        for ii in 0..logits.dim().1 {
            out[[kk, ii]] = (row[ii] - lse).exp();
        }
    }
    Ok(out)
}

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0. {
        1. / (1. + (-x).exp())
    } else {
        // equivalent form, avoids overflow for very negative x
        let e = x.exp();
        e / (1. + e)
    }
}

/// log(max(x, floor)), so that zero probabilities stay finite
pub fn clamped_ln(x: f64) -> f64 {
    x.max(LOG_FLOOR).ln()
}

/// ln(1 + e^x), stable for large |x|. Note -ln(sigmoid(x)) = softplus(-x)
pub fn softplus(x: f64) -> f64 {
    if x > 0. {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.;
    }
    values.iter().sum::<f64>() / (values.len() as f64)
}
