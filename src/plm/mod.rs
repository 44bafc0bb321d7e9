//! Structure-aware protein language model.
//!
//! A learned per-residue embedding table combined with a structural pooling
//! step: each antibody residue also sees its spatial neighbours (antibody
//! and antigen alike) through a gaussian kernel on frame distances. The
//! diffusion model conditions on these embeddings, which keeps the number
//! of parameters trained on paired antibody-antigen data small.
use crate::shared::{AntibodyCandidate, AntigenContext};
use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::shared::sequence::AMINO_ACIDS;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlmEncoder {
    /// One embedding row per amino acid (20 x dim)
    pub embeddings: Array2<f64>,
    /// Length scale of the structural pooling kernel, in angstroms
    pub pooling_sigma: f64,
    /// Relative weight of the pooled neighbour term
    pub neighbour_weight: f64,
}

impl PlmEncoder {
    pub fn new(dim: usize, seed: u64) -> Result<PlmEncoder> {
        if dim == 0 {
            return Err(anyhow!("Embedding dimension must be non-zero"));
        }
        let mut rng = SmallRng::seed_from_u64(seed);
        let normal = Normal::new(0., 1. / (dim as f64).sqrt()).map_err(|e| anyhow!("{}", e))?;
        let embeddings =
            Array2::from_shape_fn((AMINO_ACIDS.len(), dim), |_| normal.sample(&mut rng));
        Ok(PlmEncoder {
            embeddings,
            pooling_sigma: 8.,
            neighbour_weight: 0.5,
        })
    }

    pub fn dim(&self) -> usize {
        self.embeddings.dim().1
    }

    /// Per-residue embeddings of the antibody in the context of the antigen
    /// (L x dim). Deterministic given the table and the inputs.
    pub fn embed(
        &self,
        candidate: &AntibodyCandidate,
        antigen: &AntigenContext,
    ) -> Result<Array2<f64>> {
        let dim = self.dim();
        let ab_indices = candidate.sequence.indices();
        let ag_indices = antigen.sequence.indices();

        let mut out = Array2::<f64>::zeros((candidate.len(), dim));
        for ii in 0..candidate.len() {
            let mut row = self.embeddings.row(ab_indices[ii]).to_owned();

            // structural pooling over both chains
            let mut pooled = Array1::<f64>::zeros(dim);
            let mut total_weight = 0.;
            let frame_i = &candidate.frames[ii];
            for (jj, frame_j) in candidate.frames.iter().enumerate() {
                if ii == jj {
                    continue;
                }
                let w = self.kernel(frame_i.distance(frame_j));
                pooled.scaled_add(w, &self.embeddings.row(ab_indices[jj]));
                total_weight += w;
            }
            for (jj, frame_j) in antigen.frames.iter().enumerate() {
                let w = self.kernel(frame_i.distance(frame_j));
                pooled.scaled_add(w, &self.embeddings.row(ag_indices[jj]));
                total_weight += w;
            }
            if total_weight > 0. {
                row.scaled_add(self.neighbour_weight / total_weight, &pooled);
            }
            out.row_mut(ii).assign(&row);
        }
        Ok(out)
    }

    fn kernel(&self, distance: f64) -> f64 {
        (-distance * distance / (2. * self.pooling_sigma * self.pooling_sigma)).exp()
    }

    /// Blank-slate encoder with zeroed embeddings (every residue looks alike)
    pub fn uniform(&self) -> PlmEncoder {
        PlmEncoder {
            embeddings: Array2::zeros(self.embeddings.dim()),
            pooling_sigma: self.pooling_sigma,
            neighbour_weight: self.neighbour_weight,
        }
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<PlmEncoder> {
        let reader = BufReader::new(File::open(path)?);
        let encoder: PlmEncoder = serde_json::from_reader(reader)?;
        if encoder.embeddings.dim().0 != AMINO_ACIDS.len() {
            return Err(anyhow!(
                "Embedding table has {} rows, expected {}",
                encoder.embeddings.dim().0,
                AMINO_ACIDS.len()
            ));
        }
        Ok(encoder)
    }

    pub fn similar_to(&self, other: &PlmEncoder) -> bool {
        self.embeddings.dim() == other.embeddings.dim()
            && (&self.embeddings - &other.embeddings)
                .iter()
                .all(|&x| x.abs() < 1e-6)
            && (self.pooling_sigma - other.pooling_sigma).abs() < 1e-6
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{AminoAcid, DesignSpan, ResidueFrame};

    fn toy_pair() -> (AntibodyCandidate, AntigenContext) {
        let ab = AntibodyCandidate::new(
            AminoAcid::from_string("ACDEF").unwrap(),
            (0..5)
                .map(|i| ResidueFrame::at_position(3.8 * i as f64, 0., 0.))
                .collect(),
            DesignSpan::new(1, 4).unwrap(),
        )
        .unwrap();
        let ag = AntigenContext::new(
            AminoAcid::from_string("WYK").unwrap(),
            (0..3)
                .map(|i| ResidueFrame::at_position(3.8 * i as f64, 6., 0.))
                .collect(),
        )
        .unwrap();
        (ab, ag)
    }

    #[test]
    fn embedding_shape_and_determinism() {
        let (ab, ag) = toy_pair();
        let enc = PlmEncoder::new(16, 0).unwrap();
        let e1 = enc.embed(&ab, &ag).unwrap();
        let e2 = enc.embed(&ab, &ag).unwrap();
        assert_eq!(e1.dim(), (5, 16));
        assert!((&e1 - &e2).iter().all(|&x| x == 0.));
    }

    #[test]
    fn structure_changes_the_embedding() {
        let (ab, ag) = toy_pair();
        let enc = PlmEncoder::new(16, 0).unwrap();
        let e1 = enc.embed(&ab, &ag).unwrap();

        let mut moved = ab.clone();
        moved.frames[2] = ResidueFrame::at_position(100., 100., 100.);
        let e2 = enc.embed(&moved, &ag).unwrap();
        assert!((&e1 - &e2).iter().any(|&x| x.abs() > 1e-12));
    }

    #[test]
    fn uniform_encoder_is_all_zero() {
        let (ab, ag) = toy_pair();
        let enc = PlmEncoder::new(8, 1).unwrap().uniform();
        let e = enc.embed(&ab, &ag).unwrap();
        assert!(e.iter().all(|&x| x == 0.));
    }
}
