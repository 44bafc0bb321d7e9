//! Amino-acid sequences and the relaxed (profile) representation used by
//! the discrete part of the diffusion process.
use crate::shared::utils::{clamped_ln, Normalize2};
use anyhow::{anyhow, Result};
use ndarray::{s, Array2};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The 20 standard amino acids, in alphabetical one-letter order.
pub static AMINO_ACIDS: [u8; 20] = *b"ACDEFGHIKLMNPQRSTVWY";

static AMINO_ACIDS_INV: Lazy<[Option<usize>; 256]> = Lazy::new(|| {
    let mut inv = [None; 256];
    for (idx, aa) in AMINO_ACIDS.iter().enumerate() {
        inv[*aa as usize] = Some(idx);
    }
    inv
});

/// Kyte-Doolittle hydropathy, indexed like `AMINO_ACIDS`
pub static HYDROPATHY: [f64; 20] = [
    1.8, 2.5, -3.5, -3.5, 2.8, -0.4, -3.2, 4.5, -3.9, 3.8, 1.9, -3.5, -1.6, -3.5, -4.5, -0.8,
    -0.7, 4.2, -0.9, -1.3,
];

/// Net side-chain charge at physiological pH, indexed like `AMINO_ACIDS`
/// (histidine counted as +0.1)
pub static CHARGE: [f64; 20] = [
    0., 0., -1., -1., 0., 0., 0.1, 0., 1., 0., 0., 0., 0., 0., 1., 0., 0., 0., 0., 0.,
];

pub fn amino_acid_index(aa: u8) -> Result<usize> {
    AMINO_ACIDS_INV[aa as usize].ok_or(anyhow!("Not an amino-acid one-letter code: {}", aa as char))
}

#[derive(Default, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AminoAcid {
    pub seq: Vec<u8>,
}

impl fmt::Display for AminoAcid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.seq))
    }
}

impl Serialize for AminoAcid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AminoAcid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AminoAcid::from_string(&s).map_err(serde::de::Error::custom)
    }
}

impl AminoAcid {
    pub fn from_string(s: &str) -> Result<AminoAcid> {
        for c in s.bytes() {
            amino_acid_index(c)?;
        }
        Ok(AminoAcid {
            seq: s.as_bytes().to_vec(),
        })
    }

    pub fn from_indices(indices: &[usize]) -> Result<AminoAcid> {
        let mut seq = Vec::with_capacity(indices.len());
        for &idx in indices {
            if idx >= AMINO_ACIDS.len() {
                return Err(anyhow!("Amino-acid index out of range: {}", idx));
            }
            seq.push(AMINO_ACIDS[idx]);
        }
        Ok(AminoAcid { seq })
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Indices into the `AMINO_ACIDS` alphabet. The constructors guarantee
    /// that every byte is valid, so this cannot fail.
    pub fn indices(&self) -> Vec<usize> {
        self.seq
            .iter()
            .map(|&aa| AMINO_ACIDS_INV[aa as usize].unwrap())
            .collect()
    }

    pub fn hydropathy(&self, position: usize) -> f64 {
        HYDROPATHY[AMINO_ACIDS_INV[self.seq[position] as usize].unwrap()]
    }

    pub fn charge(&self, position: usize) -> f64 {
        CHARGE[AMINO_ACIDS_INV[self.seq[position] as usize].unwrap()]
    }
}

/// Position-wise categorical distribution over amino acids (L x 20),
/// each row a normalized probability vector. This is the state of the
/// sequence channel during diffusion.
#[derive(Default, Clone, Debug, Serialize, Deserialize)]
pub struct SequenceProfile {
    pub probas: Array2<f64>,
}

impl SequenceProfile {
    pub fn new(probas: Array2<f64>) -> Result<SequenceProfile> {
        if probas.dim().1 != AMINO_ACIDS.len() {
            return Err(anyhow!(
                "A sequence profile needs {} columns (got {})",
                AMINO_ACIDS.len(),
                probas.dim().1
            ));
        }
        Ok(SequenceProfile {
            probas: probas.normalize_rows()?,
        })
    }

    /// Delta distribution on an observed sequence
    pub fn from_sequence(seq: &AminoAcid) -> Result<SequenceProfile> {
        if seq.is_empty() {
            return Err(anyhow!("Empty sequence"));
        }
        let mut probas = Array2::<f64>::zeros((seq.len(), AMINO_ACIDS.len()));
        for (pos, idx) in seq.indices().into_iter().enumerate() {
            probas[[pos, idx]] = 1.;
        }
        Ok(SequenceProfile { probas })
    }

    pub fn uniform(length: usize) -> Result<SequenceProfile> {
        if length == 0 {
            return Err(anyhow!("Empty sequence"));
        }
        Ok(SequenceProfile {
            probas: Array2::from_elem((length, AMINO_ACIDS.len()), 1. / AMINO_ACIDS.len() as f64),
        })
    }

    pub fn len(&self) -> usize {
        self.probas.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.probas.dim().0 == 0
    }

    /// Most likely residue at each position
    pub fn argmax_sequence(&self) -> Result<AminoAcid> {
        let mut indices = Vec::with_capacity(self.len());
        for pos in 0..self.len() {
            let row = self.probas.slice(s![pos, ..]);
            let (best, _) = row
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
                .ok_or(anyhow!("Empty profile row"))?;
            indices.push(best);
        }
        AminoAcid::from_indices(&indices)
    }

    /// log P(seq) under the profile, position-wise independent
    pub fn log_probability(&self, seq: &AminoAcid) -> Result<f64> {
        if seq.len() != self.len() {
            return Err(anyhow!(
                "Sequence length {} does not match profile length {}",
                seq.len(),
                self.len()
            ));
        }
        Ok(seq
            .indices()
            .into_iter()
            .enumerate()
            .map(|(pos, idx)| clamped_ln(self.probas[[pos, idx]]))
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    #[test]
    fn rejects_invalid_residue() {
        assert!(AminoAcid::from_string("ACDX").is_err());
        assert!(AminoAcid::from_string("ACDE").is_ok());
    }

    #[test]
    fn roundtrip_indices() {
        let aa = AminoAcid::from_string("WYACK").unwrap();
        let back = AminoAcid::from_indices(&aa.indices()).unwrap();
        assert_eq!(aa, back);
    }

    #[test]
    fn delta_profile_recovers_sequence() {
        let aa = AminoAcid::from_string("GHIKLM").unwrap();
        let profile = SequenceProfile::from_sequence(&aa).unwrap();
        assert_eq!(profile.argmax_sequence().unwrap(), aa);
        assert_approx_eq!(profile.log_probability(&aa).unwrap(), 0.);
    }
}
