//! Small end-to-end run on a toy antigen: build a model, train it with the
//! constrained preference loop, print what happened.
use abcpo::{
    AminoAcid, AntibodyCandidate, AntigenContext, CpoTrainer, DesignSpan, DiffusionModel,
    DiffusionSchedule, DualVariables, Generator, PlmEncoder, ResidueFrame, SamplingParameters,
    ScheduleKind, ScoringSet, TrainingParameters,
};
use anyhow::Result;
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn main() -> Result<()> {
    let antigen = AntigenContext::new(
        AminoAcid::from_string("KRWDE")?,
        (0..5)
            .map(|i| ResidueFrame::at_position(3.8 * i as f64, 7., 0.))
            .collect(),
    )?;
    let scaffold = AntibodyCandidate::new(
        AminoAcid::from_string("EVQLVESGGGLV")?,
        (0..12)
            .map(|i| ResidueFrame::at_position(3.8 * i as f64, 0., 0.))
            .collect(),
        DesignSpan::new(3, 9)?,
    )?;

    let encoder = PlmEncoder::new(16, 0)?;
    let schedule = DiffusionSchedule::new(ScheduleKind::Cosine, 20)?;
    let model = DiffusionModel::new(encoder, schedule, scaffold.cdr.len(), 1)?;

    let sampling = SamplingParameters {
        nb_steps: 20,
        seed: None,
        ..Default::default()
    };
    let params = TrainingParameters {
        batch_size: 16,
        nb_pairs: 4,
        ..Default::default()
    };

    let mut trainer = CpoTrainer::new(
        model,
        ScoringSet::standard(),
        DualVariables::standard(),
        params,
        sampling.clone(),
        antigen.clone(),
        scaffold.clone(),
    )?;

    let mut rng = SmallRng::seed_from_u64(42);
    let report = trainer.train(30, &mut rng)?;

    if let (Some(first), Some(last)) = (report.steps.first(), report.steps.last()) {
        println!(
            "affinity {:.3} -> {:.3} over {} steps (converged: {})",
            first.mean_affinity,
            last.mean_affinity,
            report.steps.len(),
            report.converged
        );
        println!("final duals: {:?}", last.lambdas);
    }

    // sample a few designs from the trained policy
    let mut gen = Generator::new(
        &trainer.policy,
        &antigen,
        &scaffold,
        &SamplingParameters {
            seed: Some(7),
            ..sampling
        },
    )?;
    for _ in 0..3 {
        let result = gen.generate()?;
        println!(
            "{}   log-likelihood {:.3}",
            result.candidate.sequence, result.log_likelihood
        );
    }
    Ok(())
}
