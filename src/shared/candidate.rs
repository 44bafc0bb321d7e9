//! Antibody candidates and the antigen they are designed against
use crate::shared::geometry::ResidueFrame;
use crate::shared::sequence::AminoAcid;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Half-open interval of designed positions (the CDR loop being redesigned)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignSpan {
    pub start: usize,
    pub end: usize,
}

impl DesignSpan {
    pub fn new(start: usize, end: usize) -> Result<DesignSpan> {
        if start >= end {
            return Err(anyhow!("Empty design span {}..{}", start, end));
        }
        Ok(DesignSpan { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        false // the constructor rejects empty spans
    }

    pub fn contains(&self, position: usize) -> bool {
        position >= self.start && position < self.end
    }
}

/// A designed antibody: sequence plus backbone frames, with the CDR span
/// that the model is allowed to modify.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AntibodyCandidate {
    pub sequence: AminoAcid,
    pub frames: Vec<ResidueFrame>,
    pub cdr: DesignSpan,
}

impl AntibodyCandidate {
    pub fn new(
        sequence: AminoAcid,
        frames: Vec<ResidueFrame>,
        cdr: DesignSpan,
    ) -> Result<AntibodyCandidate> {
        if sequence.is_empty() {
            return Err(anyhow!("Antibody sequence is empty"));
        }
        if sequence.len() != frames.len() {
            return Err(anyhow!(
                "Sequence length {} does not match the number of frames {}",
                sequence.len(),
                frames.len()
            ));
        }
        if cdr.end > sequence.len() {
            return Err(anyhow!(
                "Design span {}..{} out of bounds for a length-{} antibody",
                cdr.start,
                cdr.end,
                sequence.len()
            ));
        }
        Ok(AntibodyCandidate {
            sequence,
            frames,
            cdr,
        })
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// The (fixed) antigen epitope the model conditions on
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AntigenContext {
    pub sequence: AminoAcid,
    pub frames: Vec<ResidueFrame>,
}

impl AntigenContext {
    pub fn new(sequence: AminoAcid, frames: Vec<ResidueFrame>) -> Result<AntigenContext> {
        if sequence.is_empty() {
            return Err(anyhow!("Antigen epitope is empty"));
        }
        if sequence.len() != frames.len() {
            return Err(anyhow!(
                "Epitope sequence length {} does not match the number of frames {}",
                sequence.len(),
                frames.len()
            ));
        }
        Ok(AntigenContext { sequence, frames })
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}
