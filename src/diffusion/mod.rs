//! Joint denoising of antibody sequence and structure
pub mod model;
pub mod sampler;
pub mod schedule;

pub use model::{DenoiseOutput, DiffusionModel};
pub use sampler::{sample_candidate, GenerationResult, Generator};
pub use schedule::{DiffusionSchedule, ScheduleKind};
