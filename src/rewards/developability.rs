//! Biophysical property evaluators used as constraints: non-specific
//! binding, self-association and (in)stability. All of them are "higher is
//! worse" scores compared against a threshold.
use crate::rewards::Evaluator;
use crate::shared::geometry::count_clashes;
use crate::shared::{AntibodyCandidate, AntigenContext};
use anyhow::Result;

fn window_max(values: &[f64], window: usize) -> f64 {
    if values.is_empty() || window == 0 {
        return 0.;
    }
    let w = window.min(values.len());
    values
        .windows(w)
        .map(|chunk| chunk.iter().sum::<f64>() / w as f64)
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Positive-charge patches drive polyreactivity: score is the worst
/// windowed average of rectified positive charge.
#[derive(Clone, Debug)]
pub struct NonSpecificBinding {
    pub window: usize,
}

impl Default for NonSpecificBinding {
    fn default() -> NonSpecificBinding {
        NonSpecificBinding { window: 5 }
    }
}

impl Evaluator for NonSpecificBinding {
    fn name(&self) -> &'static str {
        "non-specific-binding"
    }

    fn score(&self, candidate: &AntibodyCandidate, _antigen: &AntigenContext) -> Result<f64> {
        let charges: Vec<f64> = (0..candidate.len())
            .map(|pos| candidate.sequence.charge(pos).max(0.))
            .collect();
        Ok(window_max(&charges, self.window))
    }
}

/// Hydrophobic surface patches drive self-association: worst windowed
/// average of rectified hydropathy.
#[derive(Clone, Debug)]
pub struct SelfAssociation {
    pub window: usize,
}

impl Default for SelfAssociation {
    fn default() -> SelfAssociation {
        SelfAssociation { window: 5 }
    }
}

impl Evaluator for SelfAssociation {
    fn name(&self) -> &'static str {
        "self-association"
    }

    fn score(&self, candidate: &AntibodyCandidate, _antigen: &AntigenContext) -> Result<f64> {
        let hydro: Vec<f64> = (0..candidate.len())
            .map(|pos| candidate.sequence.hydropathy(pos).max(0.))
            .collect();
        Ok(window_max(&hydro, self.window))
    }
}

/// Destabilization score: net-charge imbalance, glycine/proline excess in
/// the designed span, and steric clashes in the backbone.
#[derive(Clone, Debug)]
pub struct Stability {
    /// Frames closer than this (angstroms) count as a clash
    pub clash_distance: f64,
    pub clash_weight: f64,
}

impl Default for Stability {
    fn default() -> Stability {
        Stability {
            clash_distance: 3.,
            clash_weight: 1.,
        }
    }
}

impl Evaluator for Stability {
    fn name(&self) -> &'static str {
        "stability"
    }

    fn score(&self, candidate: &AntibodyCandidate, _antigen: &AntigenContext) -> Result<f64> {
        let length = candidate.len() as f64;
        let net_charge: f64 = (0..candidate.len())
            .map(|pos| candidate.sequence.charge(pos))
            .sum();
        let charge_imbalance = net_charge.abs() / length;

        let flexible = candidate
            .sequence
            .seq
            .iter()
            .enumerate()
            .filter(|(pos, aa)| candidate.cdr.contains(*pos) && (**aa == b'G' || **aa == b'P'))
            .count() as f64;
        let flexible_excess = (flexible / candidate.cdr.len() as f64 - 0.2).max(0.);

        let clashes = count_clashes(&candidate.frames, self.clash_distance) as f64;

        Ok(charge_imbalance + flexible_excess + self.clash_weight * clashes / length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{AminoAcid, DesignSpan, ResidueFrame};

    fn candidate(seq: &str) -> AntibodyCandidate {
        let aa = AminoAcid::from_string(seq).unwrap();
        let frames = (0..aa.len())
            .map(|i| ResidueFrame::at_position(3.8 * i as f64, 0., 0.))
            .collect();
        AntibodyCandidate::new(aa, frames, DesignSpan::new(0, seq.len()).unwrap()).unwrap()
    }

    fn dummy_antigen() -> AntigenContext {
        AntigenContext::new(
            AminoAcid::from_string("A").unwrap(),
            vec![ResidueFrame::default()],
        )
        .unwrap()
    }

    #[test]
    fn charge_patch_scores_higher() {
        let eval = NonSpecificBinding::default();
        let ag = dummy_antigen();
        let patchy = eval.score(&candidate("AAKRKRKAA"), &ag).unwrap();
        let neutral = eval.score(&candidate("AASTSTSAA"), &ag).unwrap();
        assert!(patchy > neutral);
        assert_eq!(neutral, 0.);
    }

    #[test]
    fn hydrophobic_patch_scores_higher() {
        let eval = SelfAssociation::default();
        let ag = dummy_antigen();
        let oily = eval.score(&candidate("AAILVIVAA"), &ag).unwrap();
        let polar = eval.score(&candidate("AADEDEDAA"), &ag).unwrap();
        assert!(oily > polar);
    }

    #[test]
    fn clashes_destabilize() {
        let eval = Stability::default();
        let ag = dummy_antigen();
        let aa = AminoAcid::from_string("AAAAA").unwrap();
        let spread: Vec<ResidueFrame> = (0..5)
            .map(|i| ResidueFrame::at_position(3.8 * i as f64, 0., 0.))
            .collect();
        let collapsed: Vec<ResidueFrame> = (0..5)
            .map(|i| ResidueFrame::at_position(0.1 * i as f64, 0., 0.))
            .collect();
        let span = DesignSpan::new(0, 5).unwrap();
        let ok = AntibodyCandidate::new(aa.clone(), spread, span).unwrap();
        let bad = AntibodyCandidate::new(aa, collapsed, span).unwrap();
        assert!(eval.score(&bad, &ag).unwrap() > eval.score(&ok, &ag).unwrap());
    }

    #[test]
    fn glycine_rich_loops_destabilize() {
        let eval = Stability::default();
        let ag = dummy_antigen();
        let floppy = eval.score(&candidate("GGGGGGGG"), &ag).unwrap();
        let rigid = eval.score(&candidate("ATYNSWVQ"), &ag).unwrap();
        assert!(floppy > rigid);
    }
}
