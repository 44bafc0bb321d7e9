//! Constrained preference optimization: the primal-dual loop that improves
//! binding affinity while keeping the biophysical constraints in check.
pub mod duals;
pub mod preference;
pub mod trainer;

use crate::rewards::ConstraintKind;
use std::error::Error;
use std::fmt;

pub use duals::DualVariables;
pub use preference::{build_pairs, PreferencePair, ScoredCandidate};
pub use trainer::{CpoTrainer, StepReport, TrainerSnapshot, TrainingReport};

/// Failures specific to the training loop. They travel inside
/// `anyhow::Error` and can be recovered with `downcast_ref`.
#[derive(Clone, Debug, PartialEq)]
pub enum TrainingError {
    /// A dual variable has been stuck at its upper bound: the constraint
    /// cannot be satisfied by this policy
    DualDivergence { kind: ConstraintKind },
    /// Too few usable candidates in the batch (NaN rewards, ties)
    DegenerateBatch { reason: String },
}

impl fmt::Display for TrainingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingError::DualDivergence { kind } => {
                write!(
                    f,
                    "Dual variable for {} diverged: the constraint looks unsatisfiable",
                    kind
                )
            }
            TrainingError::DegenerateBatch { reason } => {
                write!(f, "Degenerate training batch: {}", reason)
            }
        }
    }
}

impl Error for TrainingError {}
