//! Scoring of generated antibodies: one objective (binding affinity) and
//! the biophysical properties used as constraints.
pub mod affinity;
pub mod developability;

use crate::shared::{AntibodyCandidate, AntigenContext};
use anyhow::{anyhow, Result};
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use affinity::ContactAffinity;
pub use developability::{NonSpecificBinding, SelfAssociation, Stability};

/// Anything that maps a candidate to a scalar. Higher means more of the
/// property (more binding, more self-association, ...).
pub trait Evaluator: DynClone + Send + Sync {
    fn name(&self) -> &'static str;
    fn score(&self, candidate: &AntibodyCandidate, antigen: &AntigenContext) -> Result<f64>;
}

dyn_clone::clone_trait_object!(Evaluator);

/// The constrained biophysical properties
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    NonSpecificBinding,
    SelfAssociation,
    Stability,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 3] = [
        ConstraintKind::NonSpecificBinding,
        ConstraintKind::SelfAssociation,
        ConstraintKind::Stability,
    ];

    pub fn index(&self) -> usize {
        match self {
            ConstraintKind::NonSpecificBinding => 0,
            ConstraintKind::SelfAssociation => 1,
            ConstraintKind::Stability => 2,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::NonSpecificBinding => write!(f, "non-specific binding"),
            ConstraintKind::SelfAssociation => write!(f, "self-association"),
            ConstraintKind::Stability => write!(f, "stability"),
        }
    }
}

/// A constraint is satisfied when the property score stays at or below
/// its threshold
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub kind: ConstraintKind,
    pub threshold: f64,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CandidateScores {
    pub affinity: f64,
    /// Indexed by `ConstraintKind::index`
    pub constraints: [f64; 3],
}

impl CandidateScores {
    pub fn constraint(&self, kind: ConstraintKind) -> f64 {
        self.constraints[kind.index()]
    }
}

/// The full evaluator set: the affinity objective plus one evaluator per
/// constrained property
#[derive(Clone)]
pub struct ScoringSet {
    pub affinity: Box<dyn Evaluator>,
    pub constraints: Vec<(ConstraintKind, Box<dyn Evaluator>)>,
}

impl ScoringSet {
    /// Contact-potential affinity and the three standard developability
    /// evaluators
    pub fn standard() -> ScoringSet {
        ScoringSet {
            affinity: Box::new(ContactAffinity::default()),
            constraints: vec![
                (
                    ConstraintKind::NonSpecificBinding,
                    Box::new(NonSpecificBinding::default()) as Box<dyn Evaluator>,
                ),
                (
                    ConstraintKind::SelfAssociation,
                    Box::new(SelfAssociation::default()) as Box<dyn Evaluator>,
                ),
                (
                    ConstraintKind::Stability,
                    Box::new(Stability::default()) as Box<dyn Evaluator>,
                ),
            ],
        }
    }

    /// Score a candidate on every axis. A non-finite value from any
    /// evaluator is an error: NaN rewards must never be silently ranked.
    pub fn score(
        &self,
        candidate: &AntibodyCandidate,
        antigen: &AntigenContext,
    ) -> Result<CandidateScores> {
        let affinity = self.affinity.score(candidate, antigen)?;
        if !affinity.is_finite() {
            return Err(anyhow!(
                "Evaluator {} returned a non-finite score",
                self.affinity.name()
            ));
        }
        let mut scores = CandidateScores {
            affinity,
            constraints: [0.; 3],
        };
        for (kind, evaluator) in &self.constraints {
            let value = evaluator.score(candidate, antigen)?;
            if !value.is_finite() {
                return Err(anyhow!(
                    "Evaluator {} returned a non-finite score",
                    evaluator.name()
                ));
            }
            scores.constraints[kind.index()] = value;
        }
        Ok(scores)
    }
}
