//! Dual variables of the constrained optimization: one multiplier per
//! biophysical property, raised while the constraint is violated and
//! relaxed once it holds.
use crate::cpo::TrainingError;
use crate::rewards::{CandidateScores, ConstraintKind, ConstraintSpec};
use crate::shared::utils::mean;
use crate::shared::TrainingParameters;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DualVariables {
    pub specs: Vec<ConstraintSpec>,
    pub lambdas: Vec<f64>,
    // consecutive steps each multiplier spent pinned at dual_max
    #[serde(skip)]
    pinned_steps: Vec<usize>,
}

impl DualVariables {
    pub fn new(specs: Vec<ConstraintSpec>) -> Result<DualVariables> {
        if specs.is_empty() {
            return Err(anyhow!("At least one constraint is needed"));
        }
        let n = specs.len();
        Ok(DualVariables {
            specs,
            lambdas: vec![0.; n],
            pinned_steps: vec![0; n],
        })
    }

    /// Standard set: the three developability constraints with their
    /// default thresholds
    pub fn standard() -> DualVariables {
        DualVariables::new(vec![
            ConstraintSpec {
                kind: ConstraintKind::NonSpecificBinding,
                threshold: 0.6,
            },
            ConstraintSpec {
                kind: ConstraintKind::SelfAssociation,
                threshold: 2.,
            },
            ConstraintSpec {
                kind: ConstraintKind::Stability,
                threshold: 0.5,
            },
        ])
        .unwrap()
    }

    pub fn lambda(&self, kind: ConstraintKind) -> f64 {
        self.specs
            .iter()
            .position(|s| s.kind == kind)
            .map(|i| self.lambdas[i])
            .unwrap_or(0.)
    }

    /// Positive part of the excess over the threshold, for one candidate
    pub fn violation_of(&self, scores: &CandidateScores, idx: usize) -> f64 {
        (scores.constraint(self.specs[idx].kind) - self.specs[idx].threshold).max(0.)
    }

    /// Mean violation of each constraint over a batch
    pub fn batch_violations(&self, batch: &[CandidateScores]) -> Vec<f64> {
        (0..self.specs.len())
            .map(|idx| {
                mean(
                    &batch
                        .iter()
                        .map(|scores| self.violation_of(scores, idx))
                        .collect::<Vec<_>>(),
                )
            })
            .collect()
    }

    /// Constraint penalty of one candidate, weighted by the current duals
    pub fn weighted_penalty(&self, scores: &CandidateScores) -> f64 {
        (0..self.specs.len())
            .map(|idx| self.lambdas[idx] * self.violation_of(scores, idx))
            .sum()
    }

    /// Dual ascent: raise the multiplier of each violated constraint
    /// proportionally to its violation, decay the multiplier of satisfied
    /// ones. A multiplier stuck at the upper bound for `patience` steps is
    /// diverging, which means the constraint cannot be met.
    pub fn ascend(&mut self, violations: &[f64], params: &TrainingParameters) -> Result<()> {
        if violations.len() != self.specs.len() {
            return Err(anyhow!(
                "Expected {} violation values, got {}",
                self.specs.len(),
                violations.len()
            ));
        }
        if self.pinned_steps.len() != self.specs.len() {
            // happens after deserialization, the counter is derived state
            self.pinned_steps = vec![0; self.specs.len()];
        }
        for idx in 0..self.specs.len() {
            if !violations[idx].is_finite() {
                return Err(anyhow!(
                    "Non-finite violation for constraint {}",
                    self.specs[idx].kind
                ));
            }
            if violations[idx] > 0. {
                self.lambdas[idx] =
                    (self.lambdas[idx] + params.dual_learning_rate * violations[idx])
                        .min(params.dual_max);
            } else {
                self.lambdas[idx] *= 1. - params.dual_learning_rate;
            }

            if (self.lambdas[idx] - params.dual_max).abs() < f64::EPSILON {
                self.pinned_steps[idx] += 1;
                if self.pinned_steps[idx] >= params.patience {
                    return Err(TrainingError::DualDivergence {
                        kind: self.specs[idx].kind,
                    }
                    .into());
                }
                log::warn!(
                    "Dual variable for {} pinned at its bound ({}/{} steps)",
                    self.specs[idx].kind,
                    self.pinned_steps[idx],
                    params.patience
                );
            } else {
                self.pinned_steps[idx] = 0;
            }
        }
        Ok(())
    }
}
