//! The joint sequence/structure denoising model (the policy being trained)
use crate::diffusion::schedule::DiffusionSchedule;
use crate::plm::PlmEncoder;
use crate::shared::sequence::AMINO_ACIDS;
use crate::shared::utils::{clamped_ln, softmax_rows, Normalize, Normalize2};
use crate::shared::{AntibodyCandidate, AntigenContext, DesignSpan, ResidueFrame, SequenceProfile};
use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// One reverse step of the denoiser: sequence logits for every position,
/// the clean-structure estimate, and how far to move toward it.
#[derive(Clone, Debug)]
pub struct DenoiseOutput {
    pub logits: Array2<f64>,
    pub target_frames: Vec<ResidueFrame>,
    pub gain: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiffusionModel {
    pub encoder: PlmEncoder,
    pub schedule: DiffusionSchedule,
    /// Linear head from embeddings to residue logits (dim x 20)
    pub logit_head: Array2<f64>,
    /// Global residue composition (a distribution over the alphabet)
    pub residue_bias: Array1<f64>,
    /// Position-specific distributions for the designed span (max_cdr_len x 20)
    pub cdr_profile: Array2<f64>,
    /// Fraction of the predicted structure correction applied at each step
    /// (indexed by t, length nb_steps + 1)
    pub step_gain: Array1<f64>,
}

impl DiffusionModel {
    pub fn new(
        encoder: PlmEncoder,
        schedule: DiffusionSchedule,
        max_cdr_len: usize,
        seed: u64,
    ) -> Result<DiffusionModel> {
        if max_cdr_len == 0 {
            return Err(anyhow!("max_cdr_len must be non-zero"));
        }
        let dim = encoder.dim();
        let mut rng = SmallRng::seed_from_u64(seed);
        let normal = Normal::new(0., 1. / (dim as f64).sqrt()).map_err(|e| anyhow!("{}", e))?;
        let logit_head = Array2::from_shape_fn((dim, AMINO_ACIDS.len()), |_| normal.sample(&mut rng));
        let nb_steps = schedule.nb_steps;
        Ok(DiffusionModel {
            encoder,
            schedule,
            logit_head,
            residue_bias: Array1::from_elem(AMINO_ACIDS.len(), 1. / AMINO_ACIDS.len() as f64),
            cdr_profile: Array2::from_elem(
                (max_cdr_len, AMINO_ACIDS.len()),
                1. / AMINO_ACIDS.len() as f64,
            ),
            step_gain: Array1::from_elem(nb_steps + 1, 0.2),
        })
    }

    pub fn max_cdr_len(&self) -> usize {
        self.cdr_profile.dim().0
    }

    fn check_span(&self, cdr: DesignSpan) -> Result<()> {
        if cdr.len() > self.max_cdr_len() {
            return Err(anyhow!(
                "Design span of length {} exceeds the model maximum {}",
                cdr.len(),
                self.max_cdr_len()
            ));
        }
        Ok(())
    }

    /// One application of the denoiser at step `t`.
    ///
    /// The sequence channel sees the current profile through its argmax
    /// (which also fixes the embeddings), plus the learned composition and
    /// span tables. The structure estimate is a chain-smoothing of the
    /// current frames, trusted proportionally to `step_gain[t]`.
    pub fn denoise(
        &self,
        profile: &SequenceProfile,
        frames: &[ResidueFrame],
        antigen: &AntigenContext,
        cdr: DesignSpan,
        t: usize,
    ) -> Result<DenoiseOutput> {
        self.check_span(cdr)?;
        if profile.len() != frames.len() {
            return Err(anyhow!(
                "Profile length {} does not match the number of frames {}",
                profile.len(),
                frames.len()
            ));
        }
        let interim =
            AntibodyCandidate::new(profile.argmax_sequence()?, frames.to_vec(), cdr)?;
        let embeddings = self.encoder.embed(&interim, antigen)?;
        let mut logits = embeddings.dot(&self.logit_head);

        // the more signal is left, the more the current state is trusted
        let trust = self.schedule.alpha_bar(t.min(self.schedule.nb_steps))?;
        for pos in 0..profile.len() {
            for aa in 0..AMINO_ACIDS.len() {
                logits[[pos, aa]] += clamped_ln(self.residue_bias[aa]);
                if cdr.contains(pos) {
                    logits[[pos, aa]] += clamped_ln(self.cdr_profile[[pos - cdr.start, aa]]);
                }
                logits[[pos, aa]] += trust * clamped_ln(profile.probas[[pos, aa]]);
            }
        }

        Ok(DenoiseOutput {
            logits,
            target_frames: chain_smoothed(frames),
            gain: self.step_gain[t.min(self.schedule.nb_steps)].clamp(0., 1.),
        })
    }

    /// Average per-step, per-position log-likelihood of a clean candidate
    /// under the reverse process. This is the policy log-probability used
    /// by the preference loss; it is finite for any valid candidate.
    pub fn log_likelihood(
        &self,
        candidate: &AntibodyCandidate,
        antigen: &AntigenContext,
    ) -> Result<f64> {
        self.check_span(candidate.cdr)?;
        let clean = SequenceProfile::from_sequence(&candidate.sequence)?;
        let indices = candidate.sequence.indices();

        let mut total = 0.;
        let mut count = 0usize;
        for t in 1..=self.schedule.nb_steps {
            let corrupted = self.schedule.corrupt_profile(&clean, t)?;
            let out = self.denoise(&corrupted, &candidate.frames, antigen, candidate.cdr, t)?;
            let probas = softmax_rows(&out.logits, 1.)?;
            for pos in candidate.cdr.start..candidate.cdr.end {
                total += clamped_ln(probas[[pos, indices[pos]]]);
                count += 1;
            }
        }
        if count == 0 {
            return Err(anyhow!("No designed position to evaluate"));
        }
        Ok(total / count as f64)
    }

    /// Exponentiated-gradient update of the composition table:
    /// `p <- normalize(p * exp(weights))`
    pub fn reweight_residue_bias(&mut self, weights: &Array1<f64>) -> Result<()> {
        if weights.dim() != self.residue_bias.dim() {
            return Err(anyhow!("Weight vector has the wrong dimension"));
        }
        let updated = &self.residue_bias * &weights.mapv(f64::exp);
        self.residue_bias = updated.normalize_distribution()?;
        Ok(())
    }

    /// Exponentiated-gradient update of the span table, row by row
    pub fn reweight_cdr_profile(&mut self, weights: &Array2<f64>) -> Result<()> {
        if weights.dim() != self.cdr_profile.dim() {
            return Err(anyhow!("Weight matrix has the wrong dimension"));
        }
        let updated = &self.cdr_profile * &weights.mapv(f64::exp);
        self.cdr_profile = updated.normalize_rows()?;
        Ok(())
    }

    /// Shift every step gain by `delta`, staying in [0, 1]
    pub fn adjust_step_gain(&mut self, delta: f64) {
        self.step_gain.mapv_inplace(|g| (g + delta).clamp(0., 1.));
    }

    /// Blank-slate model with the same shapes (uniform tables, zeroed head)
    pub fn uniform(&self) -> Result<DiffusionModel> {
        Ok(DiffusionModel {
            encoder: self.encoder.uniform(),
            schedule: self.schedule.clone(),
            logit_head: Array2::zeros(self.logit_head.dim()),
            residue_bias: Array1::from_elem(
                AMINO_ACIDS.len(),
                1. / AMINO_ACIDS.len() as f64,
            ),
            cdr_profile: Array2::from_elem(
                self.cdr_profile.dim(),
                1. / AMINO_ACIDS.len() as f64,
            ),
            step_gain: Array1::from_elem(self.step_gain.dim(), 0.2),
        })
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<DiffusionModel> {
        let reader = BufReader::new(File::open(path)?);
        let model: DiffusionModel = serde_json::from_reader(reader)?;
        if model.step_gain.dim() != model.schedule.nb_steps + 1 {
            return Err(anyhow!(
                "Step gain table has {} entries, schedule needs {}",
                model.step_gain.dim(),
                model.schedule.nb_steps + 1
            ));
        }
        if model.logit_head.dim() != (model.encoder.dim(), AMINO_ACIDS.len()) {
            return Err(anyhow!(
                "Logit head is {}x{}, encoder and alphabet need {}x{}",
                model.logit_head.dim().0,
                model.logit_head.dim().1,
                model.encoder.dim(),
                AMINO_ACIDS.len()
            ));
        }
        if model.residue_bias.dim() != AMINO_ACIDS.len()
            || model.cdr_profile.dim().1 != AMINO_ACIDS.len()
        {
            return Err(anyhow!(
                "Residue tables do not cover the {}-letter alphabet",
                AMINO_ACIDS.len()
            ));
        }
        Ok(model)
    }

    pub fn similar_to(&self, other: &DiffusionModel) -> bool {
        self.encoder.similar_to(&other.encoder)
            && self.schedule == other.schedule
            && arrays_close(&self.logit_head, &other.logit_head)
            && arrays_close(&self.cdr_profile, &other.cdr_profile)
            && self.residue_bias.dim() == other.residue_bias.dim()
            && (&self.residue_bias - &other.residue_bias)
                .iter()
                .all(|&x| x.abs() < 1e-6)
    }
}

fn arrays_close(a: &Array2<f64>, b: &Array2<f64>) -> bool {
    a.dim() == b.dim() && (a - b).iter().all(|&x| x.abs() < 1e-6)
}

/// Clean-structure estimate: every interior residue is pulled toward the
/// midpoint of its chain neighbours, the orientations are kept.
fn chain_smoothed(frames: &[ResidueFrame]) -> Vec<ResidueFrame> {
    let mut smoothed = frames.to_vec();
    for ii in 1..frames.len().saturating_sub(1) {
        let midpoint = (frames[ii - 1].translation + frames[ii + 1].translation) / 2.;
        smoothed[ii].translation = (frames[ii].translation + midpoint) / 2.;
    }
    smoothed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::schedule::ScheduleKind;
    use crate::shared::AminoAcid;

    fn toy_model() -> DiffusionModel {
        let encoder = PlmEncoder::new(8, 0).unwrap();
        let schedule = DiffusionSchedule::new(ScheduleKind::Cosine, 10).unwrap();
        DiffusionModel::new(encoder, schedule, 6, 1).unwrap()
    }

    fn toy_inputs() -> (AntibodyCandidate, AntigenContext) {
        let ab = AntibodyCandidate::new(
            AminoAcid::from_string("ACDEFG").unwrap(),
            (0..6)
                .map(|i| ResidueFrame::at_position(3.8 * i as f64, 0., 0.))
                .collect(),
            DesignSpan::new(1, 5).unwrap(),
        )
        .unwrap();
        let ag = AntigenContext::new(
            AminoAcid::from_string("KRW").unwrap(),
            (0..3)
                .map(|i| ResidueFrame::at_position(3.8 * i as f64, 7., 0.))
                .collect(),
        )
        .unwrap();
        (ab, ag)
    }

    #[test]
    fn log_likelihood_is_finite() {
        let model = toy_model();
        let (ab, ag) = toy_inputs();
        let ll = model.log_likelihood(&ab, &ag).unwrap();
        assert!(ll.is_finite());
        assert!(ll <= 0.);
    }

    #[test]
    fn reweighting_keeps_distributions() {
        let mut model = toy_model();
        let weights = Array1::from_shape_fn(20, |i| if i == 3 { 2. } else { 0. });
        model.reweight_residue_bias(&weights).unwrap();
        assert!((model.residue_bias.sum() - 1.).abs() < 1e-10);
        assert!(model.residue_bias[3] > model.residue_bias[0]);
    }

    #[test]
    fn span_larger_than_model_errors() {
        let model = toy_model();
        let (_, ag) = toy_inputs();
        let ab = AntibodyCandidate::new(
            AminoAcid::from_string("ACDEFGHIK").unwrap(),
            vec![ResidueFrame::default(); 9],
            DesignSpan::new(0, 9).unwrap(),
        )
        .unwrap();
        assert!(model.log_likelihood(&ab, &ag).is_err());
    }

    #[test]
    fn reweighting_changes_log_likelihood() {
        let mut model = toy_model();
        let (ab, ag) = toy_inputs();
        let before = model.log_likelihood(&ab, &ag).unwrap();
        // push the composition hard toward the candidate's own residues
        let mut weights = Array1::zeros(20);
        for idx in ab.sequence.indices() {
            weights[idx] += 3.;
        }
        model.reweight_residue_bias(&weights).unwrap();
        let after = model.log_likelihood(&ab, &ag).unwrap();
        assert!(after > before);
    }

    #[test]
    fn load_rejects_mismatched_shapes() {
        let path = std::env::temp_dir().join("abcpo_model_badshape.json");

        let mut model = toy_model();
        model.logit_head = Array2::zeros((3, AMINO_ACIDS.len()));
        model.save_json(&path).unwrap();
        assert!(DiffusionModel::load_json(&path).is_err());

        let mut model = toy_model();
        model.cdr_profile = Array2::zeros((6, 5));
        model.save_json(&path).unwrap();
        assert!(DiffusionModel::load_json(&path).is_err());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn save_load_roundtrip() {
        let model = toy_model();
        let dir = std::env::temp_dir().join("abcpo_model_test.json");
        model.save_json(&dir).unwrap();
        let back = DiffusionModel::load_json(&dir).unwrap();
        assert!(model.similar_to(&back));
        std::fs::remove_file(&dir).ok();
    }
}
