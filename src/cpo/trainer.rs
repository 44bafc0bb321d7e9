//! The primal-dual training loop
use crate::cpo::duals::DualVariables;
use crate::cpo::preference::{build_pairs, ScoredCandidate};
use crate::cpo::TrainingError;
use crate::diffusion::{sample_candidate, DiffusionModel};
use crate::rewards::ScoringSet;
use crate::shared::geometry::ca_rmsd;
use crate::shared::sequence::AMINO_ACIDS;
use crate::shared::utils::{mean, sigmoid, softplus};
use crate::shared::{
    AntibodyCandidate, AntigenContext, SamplingParameters, TrainingParameters,
};
use anyhow::Result;
use ndarray::{Array1, Array2};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[cfg(feature = "kdam")]
use kdam::{tqdm, BarExt};

/// What one optimization step did
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepReport {
    /// Mean preference loss over the pairs of the step
    pub loss: f64,
    pub mean_affinity: f64,
    /// Mean violation of each constraint, in `DualVariables` order
    pub violations: Vec<f64>,
    /// Dual variables after the step
    pub lambdas: Vec<f64>,
    pub nb_pairs: usize,
    pub nb_dropped: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingReport {
    pub steps: Vec<StepReport>,
    pub converged: bool,
}

/// Serializable state of a trainer (the evaluators are code, not state,
/// and are supplied again on restore)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainerSnapshot {
    pub policy: DiffusionModel,
    pub reference: DiffusionModel,
    pub duals: DualVariables,
    pub params: TrainingParameters,
    pub sampling: SamplingParameters,
    pub antigen: AntigenContext,
    pub scaffold: AntibodyCandidate,
}

pub struct CpoTrainer {
    pub policy: DiffusionModel,
    /// Frozen copy of the starting policy, the anchor of the
    /// preference loss
    pub reference: DiffusionModel,
    pub scoring: ScoringSet,
    pub duals: DualVariables,
    pub params: TrainingParameters,
    pub sampling: SamplingParameters,
    antigen: AntigenContext,
    scaffold: AntibodyCandidate,
}

impl CpoTrainer {
    pub fn new(
        policy: DiffusionModel,
        scoring: ScoringSet,
        duals: DualVariables,
        params: TrainingParameters,
        sampling: SamplingParameters,
        antigen: AntigenContext,
        scaffold: AntibodyCandidate,
    ) -> Result<CpoTrainer> {
        let reference = policy.clone();
        Ok(CpoTrainer {
            policy,
            reference,
            scoring,
            duals,
            params,
            sampling,
            antigen,
            scaffold,
        })
    }

    /// Sample, score and rank a batch, then do one primal and one dual step
    pub fn step(&mut self, rng: &mut SmallRng) -> Result<StepReport> {
        let seeds: Vec<u64> = (0..self.params.batch_size).map(|_| rng.gen()).collect();

        let results: Vec<Result<ScoredCandidate>> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut local_rng = SmallRng::seed_from_u64(seed);
                let generated = sample_candidate(
                    &self.policy,
                    &self.antigen,
                    &self.scaffold,
                    &self.sampling,
                    &mut local_rng,
                )?;
                let scores = self.scoring.score(&generated.candidate, &self.antigen)?;
                let ref_log_likelihood = self
                    .reference
                    .log_likelihood(&generated.candidate, &self.antigen)?;
                Ok(ScoredCandidate {
                    candidate: generated.candidate,
                    log_likelihood: generated.log_likelihood,
                    ref_log_likelihood,
                    scores,
                })
            })
            .collect();

        let mut scored = Vec::with_capacity(self.params.batch_size);
        let mut nb_dropped = 0usize;
        for result in results {
            match result {
                Ok(s) => scored.push(s),
                Err(e) => {
                    nb_dropped += 1;
                    log::debug!("Dropped candidate: {:#}", e);
                }
            }
        }
        if (nb_dropped as f64)
            > self.params.max_nan_fraction * (self.params.batch_size as f64)
        {
            return Err(TrainingError::DegenerateBatch {
                reason: format!(
                    "{} of {} candidates failed scoring",
                    nb_dropped, self.params.batch_size
                ),
            }
            .into());
        }

        let all_scores: Vec<_> = scored.iter().map(|s| s.scores).collect();
        let violations = self.duals.batch_violations(&all_scores);
        let mean_affinity = mean(
            &scored
                .iter()
                .map(|s| s.scores.affinity)
                .collect::<Vec<_>>(),
        );

        let pairs = build_pairs(&scored, self.params.nb_pairs, self.params.tie_margin)?;

        // primal step: accumulate exponentiated-gradient weights over all
        // pairs, then apply them to the policy tables in one go
        let cdr = self.scaffold.cdr;
        let mut bias_weights = Array1::<f64>::zeros(AMINO_ACIDS.len());
        let mut cdr_weights = Array2::<f64>::zeros(self.policy.cdr_profile.dim());
        let mut gain_delta = 0.;
        let mut loss = 0.;

        for pair in &pairs {
            let policy_gap = (pair.winner.log_likelihood - pair.winner.ref_log_likelihood)
                - (pair.loser.log_likelihood - pair.loser.ref_log_likelihood);
            let penalty_gap: f64 = (0..self.duals.specs.len())
                .map(|idx| {
                    self.duals.lambdas[idx]
                        * (self.duals.violation_of(&pair.winner.scores, idx)
                            - self.duals.violation_of(&pair.loser.scores, idx))
                })
                .sum();
            let delta = self.params.beta * policy_gap - penalty_gap;
            loss += softplus(-delta);

            // gradient weight of the pair: large when the model still
            // ranks the pair the wrong way round
            let g = sigmoid(-delta);
            let lr = self.params.primal_learning_rate;
            let winner_idx = pair.winner.candidate.sequence.indices();
            let loser_idx = pair.loser.candidate.sequence.indices();
            for pos in cdr.start..cdr.end {
                cdr_weights[[pos - cdr.start, winner_idx[pos]]] += lr * g;
                cdr_weights[[pos - cdr.start, loser_idx[pos]]] -= lr * g;
                bias_weights[winner_idx[pos]] += lr * g / cdr.len() as f64;
                bias_weights[loser_idx[pos]] -= lr * g / cdr.len() as f64;
            }

            // structure signal: do winners sit closer to their scaffold?
            let rmsd_gap = ca_rmsd(&pair.loser.candidate.frames, &self.scaffold.frames)?
                - ca_rmsd(&pair.winner.candidate.frames, &self.scaffold.frames)?;
            gain_delta += lr * g * rmsd_gap.tanh() / pairs.len() as f64;
        }
        loss /= pairs.len() as f64;

        let clip = self.params.gradient_clip;
        bias_weights.mapv_inplace(|x| x.clamp(-clip, clip));
        cdr_weights.mapv_inplace(|x| x.clamp(-clip, clip));
        self.policy.reweight_residue_bias(&bias_weights)?;
        self.policy.reweight_cdr_profile(&cdr_weights)?;
        self.policy.adjust_step_gain(gain_delta.clamp(-0.1, 0.1));

        // dual step
        self.duals.ascend(&violations, &self.params)?;

        Ok(StepReport {
            loss,
            mean_affinity,
            violations,
            lambdas: self.duals.lambdas.clone(),
            nb_pairs: pairs.len(),
            nb_dropped,
        })
    }

    /// Run up to `nb_steps` optimization steps. Stops early once the loss
    /// has plateaued for `patience` steps with every constraint satisfied.
    pub fn train(&mut self, nb_steps: usize, rng: &mut SmallRng) -> Result<TrainingReport> {
        let mut steps: Vec<StepReport> = Vec::with_capacity(nb_steps);
        let mut plateau = 0usize;
        let mut converged = false;

        #[cfg(feature = "kdam")]
        let mut pbar = tqdm!(total = nb_steps, desc = "cpo");

        for _ in 0..nb_steps {
            let report = self.step(rng)?;
            log::info!(
                "loss {:.4} | affinity {:.3} | violations {:?} | duals {:?}",
                report.loss,
                report.mean_affinity,
                report.violations,
                report.lambdas
            );

            if let Some(previous) = steps.last() {
                let relative = (report.loss - previous.loss).abs()
                    / previous.loss.abs().max(f64::EPSILON);
                let satisfied = report.violations.iter().all(|&v| v <= 0.);
                if relative < self.params.tolerance && satisfied {
                    plateau += 1;
                } else {
                    plateau = 0;
                }
            }
            steps.push(report);

            #[cfg(feature = "kdam")]
            let _ = pbar.update(1);

            if plateau >= self.params.patience {
                converged = true;
                break;
            }
        }
        Ok(TrainingReport { steps, converged })
    }

    pub fn snapshot(&self) -> TrainerSnapshot {
        TrainerSnapshot {
            policy: self.policy.clone(),
            reference: self.reference.clone(),
            duals: self.duals.clone(),
            params: self.params.clone(),
            sampling: self.sampling.clone(),
            antigen: self.antigen.clone(),
            scaffold: self.scaffold.clone(),
        }
    }

    /// Restore a trainer from a snapshot; the evaluators are supplied by
    /// the caller since they carry no learned state
    pub fn from_snapshot(snapshot: TrainerSnapshot, scoring: ScoringSet) -> CpoTrainer {
        CpoTrainer {
            policy: snapshot.policy,
            reference: snapshot.reference,
            scoring,
            duals: snapshot.duals,
            params: snapshot.params,
            sampling: snapshot.sampling,
            antigen: snapshot.antigen,
            scaffold: snapshot.scaffold,
        }
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &self.snapshot())?;
        Ok(())
    }

    pub fn load_json(path: &Path, scoring: ScoringSet) -> Result<CpoTrainer> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: TrainerSnapshot = serde_json::from_reader(reader)?;
        Ok(CpoTrainer::from_snapshot(snapshot, scoring))
    }
}
