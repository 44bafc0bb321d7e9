//! The structs used for specifying the parameters of sampling and training
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SamplingParameters {
    // Number of reverse diffusion steps (t = nb_steps..0); clamped to the
    // model's schedule length when larger
    pub nb_steps: usize,
    // Softmax temperature applied to the sequence logits at each step
    pub temperature: f64,
    // Seed of the generator. If None, seeded from entropy
    pub seed: Option<u64>,
}

impl Default for SamplingParameters {
    fn default() -> SamplingParameters {
        SamplingParameters {
            nb_steps: 50,
            temperature: 1.,
            seed: None,
        }
    }
}

impl SamplingParameters {
    pub fn new(nb_steps: usize) -> Self {
        Self {
            nb_steps,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingParameters {
    // Number of candidates sampled from the policy at each step
    pub batch_size: usize,
    // Maximum number of preference pairs built from one batch
    pub nb_pairs: usize,
    // Preference temperature (the beta in -log sigmoid(beta * delta))
    pub beta: f64,
    // Step size of the exponentiated-gradient update on the policy tables
    pub primal_learning_rate: f64,
    // Step size of the ascent on the dual variables
    pub dual_learning_rate: f64,
    // Dual variables are projected back into [0, dual_max]
    pub dual_max: f64,
    // Two affinities closer than this are considered a tie and the
    // pair is dropped
    pub tie_margin: f64,
    // A batch where more than this fraction of candidates failed
    // scoring (NaN rewards) is degenerate
    pub max_nan_fraction: f64,
    // Convergence: relative loss change below `tolerance` for
    // `patience` consecutive steps, with every constraint satisfied
    pub tolerance: f64,
    pub patience: usize,
    // Absolute bound on the per-pair weight of the primal update
    pub gradient_clip: f64,
}

impl Default for TrainingParameters {
    fn default() -> TrainingParameters {
        TrainingParameters {
            batch_size: 32,
            nb_pairs: 8,
            beta: 0.5,
            primal_learning_rate: 0.05,
            dual_learning_rate: 0.1,
            dual_max: 100.,
            tie_margin: 1e-6,
            max_nan_fraction: 0.5,
            tolerance: 1e-4,
            patience: 5,
            gradient_clip: 5.,
        }
    }
}

impl TrainingParameters {
    pub fn new(batch_size: usize, nb_pairs: usize) -> Self {
        Self {
            batch_size,
            nb_pairs,
            ..Default::default()
        }
    }
}
