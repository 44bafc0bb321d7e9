#![warn(clippy::large_types_passed_by_value)]

pub mod cpo;
pub mod diffusion;
pub mod plm;
pub mod rewards;
pub mod shared;

pub use crate::diffusion::{DiffusionModel, DiffusionSchedule, Generator, ScheduleKind};
pub use crate::plm::PlmEncoder;

pub use crate::cpo::{
    CpoTrainer, DualVariables, StepReport, TrainerSnapshot, TrainingError, TrainingReport,
};
pub use crate::rewards::{
    CandidateScores, ConstraintKind, ConstraintSpec, ContactAffinity, Evaluator, ScoringSet,
};
pub use crate::shared::{
    AminoAcid, AntibodyCandidate, AntigenContext, DesignSpan, ResidueFrame, SamplingParameters,
    SequenceProfile, TrainingParameters,
};
