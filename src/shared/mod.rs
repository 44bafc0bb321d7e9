//! Shared functionalities between the model, the evaluators and the trainer
pub mod candidate;
pub mod dataset;
pub mod distributions;
pub mod geometry;
pub mod parameters;
pub mod sequence;
pub mod utils;

pub use candidate::{AntibodyCandidate, AntigenContext, DesignSpan};
pub use dataset::{load_summary, read_summary, ComplexRecord};
pub use distributions::DiscreteDistribution;
pub use geometry::{ca_rmsd, count_clashes, random_displacement, random_rotation, ResidueFrame};
pub use parameters::{SamplingParameters, TrainingParameters};
pub use sequence::{amino_acid_index, AminoAcid, SequenceProfile, AMINO_ACIDS, CHARGE, HYDROPATHY};
