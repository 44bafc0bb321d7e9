//! Loading of SAbDab-style summary files (tab-separated) listing
//! antibody-antigen complexes and their measured affinities.
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// One antibody-antigen complex from the summary file
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ComplexRecord {
    pub pdb: String,
    pub heavy_chain: Option<String>,
    pub light_chain: Option<String>,
    pub antigen_chain: Option<String>,
    /// Dissociation constant, molar. Lower is stronger binding.
    pub affinity: f64,
}

impl ComplexRecord {
    /// -log10(Kd), the scale used to rank binders
    pub fn log_affinity(&self) -> f64 {
        -self.affinity.log10()
    }
}

// The raw row of a SAbDab summary file. Empty fields are written as
// "None" or "NOT", depending on the column and the export date.
#[derive(Debug, Deserialize)]
struct SummaryRow {
    pdb: String,
    #[serde(rename = "Hchain")]
    hchain: String,
    #[serde(rename = "Lchain")]
    lchain: String,
    antigen_chain: String,
    affinity: String,
}

fn clean_field(field: &str) -> Option<String> {
    match field.trim() {
        "" | "None" | "NA" | "NOT" => None,
        s => Some(s.to_string()),
    }
}

/// Read a summary table from any reader. Rows without a usable affinity
/// are skipped (most SAbDab entries have no measurement).
pub fn read_summary<R: Read>(reader: R) -> Result<Vec<ComplexRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.deserialize() {
        let row: SummaryRow = result.map_err(|e| anyhow!("Invalid summary row: {}", e))?;
        let affinity = match clean_field(&row.affinity).and_then(|s| s.parse::<f64>().ok()) {
            Some(a) if a.is_finite() && a > 0. => a,
            _ => {
                skipped += 1;
                continue;
            }
        };
        records.push(ComplexRecord {
            pdb: row.pdb.clone(),
            heavy_chain: clean_field(&row.hchain),
            light_chain: clean_field(&row.lchain),
            antigen_chain: clean_field(&row.antigen_chain),
            affinity,
        });
    }
    if skipped > 0 {
        log::warn!(
            "Skipped {} complexes without a usable affinity measurement",
            skipped
        );
    }
    if records.is_empty() {
        return Err(anyhow!("No complex with a usable affinity in the summary"));
    }
    Ok(records)
}

pub fn load_summary(path: &Path) -> Result<Vec<ComplexRecord>> {
    let file = std::fs::File::open(path)
        .map_err(|e| anyhow!("Error opening the summary file {}: {}", path.display(), e))?;
    read_summary(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    static SUMMARY: &str = "pdb\tHchain\tLchain\tantigen_chain\taffinity\n\
        7xyz\tH\tL\tA\t1e-9\n\
        8abc\tH\tNone\tB\tNone\n\
        9def\tA\tB\tC\t2.5e-7\n";

    #[test]
    fn skips_rows_without_affinity() {
        let records = read_summary(SUMMARY.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pdb, "7xyz");
        assert_approx_eq!(records[0].log_affinity(), 9.);
        assert_eq!(records[1].pdb, "9def");
    }

    #[test]
    fn missing_chain_becomes_none() {
        let summary = "pdb\tHchain\tLchain\tantigen_chain\taffinity\n\
            7xyz\tH\tNone\tA\t1e-8\n";
        let records = read_summary(summary.as_bytes()).unwrap();
        assert_eq!(records[0].light_chain, None);
        assert_eq!(records[0].heavy_chain.as_deref(), Some("H"));
    }

    #[test]
    fn all_skipped_is_an_error() {
        let summary = "pdb\tHchain\tLchain\tantigen_chain\taffinity\n\
            7xyz\tH\tL\tA\tNone\n";
        assert!(read_summary(summary.as_bytes()).is_err());
    }
}
