//! Reverse-diffusion sampling of antibody candidates
use crate::diffusion::model::DiffusionModel;
use crate::shared::geometry::{random_displacement, random_rotation};
use crate::shared::utils::softmax_rows;
use crate::shared::{
    AminoAcid, AntibodyCandidate, AntigenContext, DiscreteDistribution, SamplingParameters,
    SequenceProfile,
};
use anyhow::{anyhow, Result};
use ndarray::s;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[derive(Clone, Debug)]
pub struct GenerationResult {
    pub candidate: AntibodyCandidate,
    /// Policy log-likelihood of the generated candidate
    pub log_likelihood: f64,
}

/// Seeded generator tied to one antigen and one scaffold. The scaffold
/// fixes the framework residues and frames; only the design span is
/// denoised from scratch.
pub struct Generator {
    model: DiffusionModel,
    antigen: AntigenContext,
    scaffold: AntibodyCandidate,
    params: SamplingParameters,
    rng: SmallRng,
}

impl Generator {
    pub fn new(
        model: &DiffusionModel,
        antigen: &AntigenContext,
        scaffold: &AntibodyCandidate,
        params: &SamplingParameters,
    ) -> Result<Generator> {
        if scaffold.cdr.len() > model.max_cdr_len() {
            return Err(anyhow!(
                "Scaffold design span of length {} exceeds the model maximum {}",
                scaffold.cdr.len(),
                model.max_cdr_len()
            ));
        }
        let rng = match params.seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_entropy(),
        };
        Ok(Generator {
            model: model.clone(),
            antigen: antigen.clone(),
            scaffold: scaffold.clone(),
            params: params.clone(),
            rng,
        })
    }

    pub fn generate(&mut self) -> Result<GenerationResult> {
        sample_candidate(
            &self.model,
            &self.antigen,
            &self.scaffold,
            &self.params,
            &mut self.rng,
        )
    }
}

/// One full reverse walk, usable with an external generator (the trainer
/// hands out one seeded rng per batch element). `params.nb_steps` is
/// clamped to the model's schedule length.
pub fn sample_candidate<R: Rng>(
    model: &DiffusionModel,
    antigen: &AntigenContext,
    scaffold: &AntibodyCandidate,
    params: &SamplingParameters,
    rng: &mut R,
) -> Result<GenerationResult> {
    let nb_steps = params.nb_steps.min(model.schedule.nb_steps);
    if nb_steps == 0 {
        return Err(anyhow!("Sampling needs at least one step"));
    }
    let cdr = scaffold.cdr;

    // start from the scaffold with the design span fully noised
    let mut profile = SequenceProfile::from_sequence(&scaffold.sequence)?;
    let uniform = SequenceProfile::uniform(cdr.len())?;
    profile
        .probas
        .slice_mut(s![cdr.start..cdr.end, ..])
        .assign(&uniform.probas);

    let mut frames = scaffold.frames.clone();
    let sigma_start = model.schedule.sigma(nb_steps)?;
    let rot_mix = model.schedule.rotation_mix(nb_steps)?;
    for pos in cdr.start..cdr.end {
        frames[pos].translation += random_displacement(rng, sigma_start);
        let noised = random_rotation(rng);
        frames[pos].rotation = frames[pos]
            .rotation
            .try_slerp(&noised, rot_mix, 1e-9)
            .unwrap_or(frames[pos].rotation);
    }

    // reverse walk
    for t in (1..=nb_steps).rev() {
        let out = model.denoise(&profile, &frames, antigen, cdr, t)?;
        let probas = softmax_rows(&out.logits, params.temperature)?;
        profile
            .probas
            .slice_mut(s![cdr.start..cdr.end, ..])
            .assign(&probas.slice(s![cdr.start..cdr.end, ..]));

        let beta = model.schedule.beta(t)?;
        let residual_noise = model.schedule.sigma_translation * beta.sqrt();
        for pos in cdr.start..cdr.end {
            let target = &out.target_frames[pos];
            let correction = (target.translation - frames[pos].translation) * out.gain;
            frames[pos].translation += correction;
            if t > 1 {
                frames[pos].translation += random_displacement(rng, residual_noise);
            }
            frames[pos] = frames[pos]
                .relax_rotation(out.gain * model.schedule.rotation_mix(t)?);
        }
    }

    // sample the designed residues from the final profile
    let mut indices = scaffold.sequence.indices();
    for pos in cdr.start..cdr.end {
        let row = profile.probas.slice(s![pos, ..]).to_vec();
        indices[pos] = DiscreteDistribution::new(row)?.generate(rng);
    }
    let sequence = AminoAcid::from_indices(&indices)?;
    let candidate = AntibodyCandidate::new(sequence, frames, cdr)?;
    let log_likelihood = model.log_likelihood(&candidate, antigen)?;

    Ok(GenerationResult {
        candidate,
        log_likelihood,
    })
}
