//! Building preference comparisons from a scored batch of candidates
use crate::rewards::CandidateScores;
use crate::shared::AntibodyCandidate;
use anyhow::Result;
use itertools::Itertools;

use crate::cpo::TrainingError;

/// A candidate together with everything the preference loss needs
#[derive(Clone, Debug)]
pub struct ScoredCandidate {
    pub candidate: AntibodyCandidate,
    /// log-likelihood under the current policy
    pub log_likelihood: f64,
    /// log-likelihood under the frozen reference policy
    pub ref_log_likelihood: f64,
    pub scores: CandidateScores,
}

/// Winner preferred over loser on binding affinity
#[derive(Clone, Debug)]
pub struct PreferencePair {
    pub winner: ScoredCandidate,
    pub loser: ScoredCandidate,
}

impl PreferencePair {
    pub fn affinity_gap(&self) -> f64 {
        self.winner.scores.affinity - self.loser.scores.affinity
    }
}

/// Rank the batch by affinity and pair the best against the worst, the
/// second best against the second worst, and so on. Pairs whose affinity
/// gap is within `tie_margin` carry no preference signal and are dropped.
pub fn build_pairs(
    scored: &[ScoredCandidate],
    nb_pairs: usize,
    tie_margin: f64,
) -> Result<Vec<PreferencePair>> {
    let sorted: Vec<&ScoredCandidate> = scored
        .iter()
        .sorted_by(|a, b| {
            b.scores
                .affinity
                .partial_cmp(&a.scores.affinity)
                .expect("NaN affinities are rejected at scoring time")
        })
        .collect();

    let mut pairs = Vec::new();
    let mut dropped_ties = 0usize;
    let half = sorted.len() / 2;
    for ii in 0..half.min(nb_pairs) {
        let winner = sorted[ii];
        let loser = sorted[sorted.len() - 1 - ii];
        if winner.scores.affinity - loser.scores.affinity <= tie_margin {
            dropped_ties += 1;
            continue;
        }
        pairs.push(PreferencePair {
            winner: winner.clone(),
            loser: loser.clone(),
        });
    }
    if dropped_ties > 0 {
        log::debug!("Dropped {} tied preference pairs", dropped_ties);
    }
    if pairs.is_empty() {
        return Err(TrainingError::DegenerateBatch {
            reason: format!(
                "no usable preference pair ({} candidates, {} ties)",
                scored.len(),
                dropped_ties
            ),
        }
        .into());
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{AminoAcid, DesignSpan, ResidueFrame};

    fn scored(affinity: f64) -> ScoredCandidate {
        let seq = AminoAcid::from_string("ACDEF").unwrap();
        let candidate = AntibodyCandidate::new(
            seq,
            vec![ResidueFrame::default(); 5],
            DesignSpan::new(0, 5).unwrap(),
        )
        .unwrap();
        ScoredCandidate {
            candidate,
            log_likelihood: -1.,
            ref_log_likelihood: -1.,
            scores: CandidateScores {
                affinity,
                constraints: [0.; 3],
            },
        }
    }

    #[test]
    fn best_paired_with_worst() {
        let batch = vec![scored(1.), scored(5.), scored(3.), scored(0.)];
        let pairs = build_pairs(&batch, 2, 1e-6).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].winner.scores.affinity, 5.);
        assert_eq!(pairs[0].loser.scores.affinity, 0.);
        assert!(pairs[1].affinity_gap() > 0.);
    }

    #[test]
    fn all_ties_is_degenerate() {
        let batch = vec![scored(2.), scored(2.), scored(2.), scored(2.)];
        assert!(build_pairs(&batch, 2, 1e-6).is_err());
    }

    #[test]
    fn pair_count_is_capped() {
        let batch: Vec<_> = (0..10).map(|i| scored(i as f64)).collect();
        let pairs = build_pairs(&batch, 3, 1e-6).unwrap();
        assert_eq!(pairs.len(), 3);
    }
}
