//! Contact-based statistical potential for antibody-antigen binding
use crate::rewards::Evaluator;
use crate::shared::sequence::{AMINO_ACIDS, CHARGE, HYDROPATHY};
use crate::shared::{AntibodyCandidate, AntigenContext};
use anyhow::Result;
use ndarray::Array2;
use once_cell::sync::Lazy;

// Pairwise interaction energies in the Miyazawa-Jernigan spirit:
// hydrophobic-hydrophobic and opposite-charge contacts are favorable
// (negative). Built from the residue property tables rather than stored
// as 400 literals.
static CONTACT_ENERGY: Lazy<Array2<f64>> = Lazy::new(|| {
    let n = AMINO_ACIDS.len();
    Array2::from_shape_fn((n, n), |(a, b)| {
        let hydro = -0.08 * (HYDROPATHY[a] + HYDROPATHY[b]) - 0.04 * HYDROPATHY[a] * HYDROPATHY[b];
        let electro = 0.5 * CHARGE[a] * CHARGE[b];
        hydro + electro
    })
});

#[derive(Clone, Debug)]
pub struct ContactAffinity {
    /// Residues closer than this (angstroms) are in contact
    pub contact_cutoff: f64,
}

impl Default for ContactAffinity {
    fn default() -> ContactAffinity {
        ContactAffinity { contact_cutoff: 8. }
    }
}

impl Evaluator for ContactAffinity {
    fn name(&self) -> &'static str {
        "contact-affinity"
    }

    /// Minus the total interface contact energy, so that higher is
    /// stronger predicted binding
    fn score(&self, candidate: &AntibodyCandidate, antigen: &AntigenContext) -> Result<f64> {
        let ab_indices = candidate.sequence.indices();
        let ag_indices = antigen.sequence.indices();

        let mut energy = 0.;
        for (ii, frame_ab) in candidate.frames.iter().enumerate() {
            for (jj, frame_ag) in antigen.frames.iter().enumerate() {
                if frame_ab.distance(frame_ag) < self.contact_cutoff {
                    energy += CONTACT_ENERGY[[ab_indices[ii], ag_indices[jj]]];
                }
            }
        }
        Ok(-energy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{AminoAcid, DesignSpan, ResidueFrame};

    fn candidate(seq: &str, y: f64) -> AntibodyCandidate {
        let aa = AminoAcid::from_string(seq).unwrap();
        let frames = (0..aa.len())
            .map(|i| ResidueFrame::at_position(3.8 * i as f64, y, 0.))
            .collect();
        AntibodyCandidate::new(aa, frames, DesignSpan::new(0, seq.len()).unwrap()).unwrap()
    }

    fn antigen(seq: &str) -> AntigenContext {
        let aa = AminoAcid::from_string(seq).unwrap();
        let frames = (0..aa.len())
            .map(|i| ResidueFrame::at_position(3.8 * i as f64, 0., 0.))
            .collect();
        AntigenContext::new(aa, frames).unwrap()
    }

    #[test]
    fn no_contact_no_score() {
        let eval = ContactAffinity::default();
        let far = candidate("ILVF", 100.);
        let score = eval.score(&far, &antigen("ILVF")).unwrap();
        assert_eq!(score, 0.);
    }

    #[test]
    fn opposite_charges_bind_better_than_like_charges() {
        let eval = ContactAffinity::default();
        let ag = antigen("DDDD");
        let positive = eval.score(&candidate("KKKK", 5.), &ag).unwrap();
        let negative = eval.score(&candidate("DDDD", 5.), &ag).unwrap();
        assert!(positive > negative);
    }

    #[test]
    fn hydrophobic_contacts_are_favorable() {
        let eval = ContactAffinity::default();
        let ag = antigen("IIII");
        let oily = eval.score(&candidate("IIII", 5.), &ag).unwrap();
        let polar = eval.score(&candidate("SSSS", 5.), &ag).unwrap();
        assert!(oily > polar);
    }
}
