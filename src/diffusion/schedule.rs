//! Noise schedules shared by the sequence and the structure channels
use crate::shared::sequence::AMINO_ACIDS;
use crate::shared::SequenceProfile;
use anyhow::{anyhow, Result};
use serde::{de, ser::SerializeStruct, Deserialize, Deserializer, Serialize, Serializer};
use std::f64::consts::PI;

const BETA_MIN: f64 = 1e-4;
const BETA_MAX: f64 = 0.05;
const COSINE_OFFSET: f64 = 0.008;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleKind {
    Linear,
    Cosine,
}

/// Precomputed diffusion schedule. `alpha_bar(t)` is the fraction of signal
/// left after t corruption steps: 1 at t=0, close to 0 at t=nb_steps.
#[derive(Clone, Debug, PartialEq)]
pub struct DiffusionSchedule {
    pub kind: ScheduleKind,
    pub nb_steps: usize,
    /// Maximum translation noise, in angstroms
    pub sigma_translation: f64,
    alpha_bar: Vec<f64>,
}

impl Serialize for DiffusionSchedule {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("DiffusionSchedule", 3)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("nb_steps", &self.nb_steps)?;
        state.serialize_field("sigma_translation", &self.sigma_translation)?;
        state.end()
    }
}

// The alpha_bar table is derived data, rebuilt on load
impl<'de> Deserialize<'de> for DiffusionSchedule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ScheduleData {
            kind: ScheduleKind,
            nb_steps: usize,
            sigma_translation: f64,
        }
        let data = ScheduleData::deserialize(deserializer)?;
        let mut schedule =
            DiffusionSchedule::new(data.kind, data.nb_steps).map_err(de::Error::custom)?;
        schedule.sigma_translation = data.sigma_translation;
        Ok(schedule)
    }
}

impl Default for DiffusionSchedule {
    fn default() -> DiffusionSchedule {
        DiffusionSchedule::new(ScheduleKind::Cosine, 50).unwrap()
    }
}

impl DiffusionSchedule {
    pub fn new(kind: ScheduleKind, nb_steps: usize) -> Result<DiffusionSchedule> {
        if nb_steps == 0 {
            return Err(anyhow!("A diffusion schedule needs at least one step"));
        }
        let alpha_bar = match kind {
            ScheduleKind::Linear => {
                let mut acc = 1.;
                let mut bars = vec![1.];
                for t in 0..nb_steps {
                    let beta =
                        BETA_MIN + (BETA_MAX - BETA_MIN) * (t as f64) / ((nb_steps - 1).max(1) as f64);
                    acc *= 1. - beta;
                    bars.push(acc);
                }
                bars
            }
            ScheduleKind::Cosine => {
                let f = |t: f64| {
                    let x = (t / (nb_steps as f64) + COSINE_OFFSET) / (1. + COSINE_OFFSET);
                    (x * PI / 2.).cos().powi(2)
                };
                (0..=nb_steps).map(|t| f(t as f64) / f(0.)).collect()
            }
        };
        Ok(DiffusionSchedule {
            kind,
            nb_steps,
            sigma_translation: 10.,
            alpha_bar,
        })
    }

    /// Fraction of signal left after `t` steps
    pub fn alpha_bar(&self, t: usize) -> Result<f64> {
        self.alpha_bar
            .get(t)
            .copied()
            .ok_or(anyhow!("Step {} outside the schedule (0..={})", t, self.nb_steps))
    }

    /// Noise added at step `t` (1-indexed, like the corruption process)
    pub fn beta(&self, t: usize) -> Result<f64> {
        if t == 0 || t > self.nb_steps {
            return Err(anyhow!("Step {} outside the schedule (1..={})", t, self.nb_steps));
        }
        Ok(1. - self.alpha_bar[t] / self.alpha_bar[t - 1])
    }

    /// Standard deviation of the translation noise accumulated up to `t`
    pub fn sigma(&self, t: usize) -> Result<f64> {
        Ok(self.sigma_translation * (1. - self.alpha_bar(t)?).sqrt())
    }

    /// Rotation corruption factor at `t` (0 = untouched, 1 = fully random)
    pub fn rotation_mix(&self, t: usize) -> Result<f64> {
        Ok(1. - self.alpha_bar(t)?)
    }

    /// Uniform-mixing corruption kernel applied to a sequence profile:
    /// `Q_t p = alpha_bar * p + (1 - alpha_bar) / 20`
    pub fn corrupt_profile(&self, profile: &SequenceProfile, t: usize) -> Result<SequenceProfile> {
        let ab = self.alpha_bar(t)?;
        let mixed = profile
            .probas
            .mapv(|p| ab * p + (1. - ab) / AMINO_ACIDS.len() as f64);
        SequenceProfile::new(mixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::AminoAcid;
    use approx_eq::assert_approx_eq;

    #[test]
    fn alpha_bar_is_decreasing() {
        for kind in [ScheduleKind::Linear, ScheduleKind::Cosine] {
            let schedule = DiffusionSchedule::new(kind, 40).unwrap();
            assert_approx_eq!(schedule.alpha_bar(0).unwrap(), 1.);
            for t in 1..=40 {
                assert!(schedule.alpha_bar(t).unwrap() < schedule.alpha_bar(t - 1).unwrap());
                assert!(schedule.alpha_bar(t).unwrap() > 0.);
            }
        }
    }

    #[test]
    fn beta_consistent_with_alpha_bar() {
        let schedule = DiffusionSchedule::new(ScheduleKind::Linear, 20).unwrap();
        for t in 1..=20 {
            let rebuilt =
                schedule.alpha_bar(t - 1).unwrap() * (1. - schedule.beta(t).unwrap());
            assert_approx_eq!(rebuilt, schedule.alpha_bar(t).unwrap());
        }
    }

    #[test]
    fn full_corruption_is_uniform() {
        let schedule = DiffusionSchedule::new(ScheduleKind::Cosine, 50).unwrap();
        let profile =
            SequenceProfile::from_sequence(&AminoAcid::from_string("ACD").unwrap()).unwrap();
        let corrupted = schedule.corrupt_profile(&profile, 50).unwrap();
        for &p in corrupted.probas.iter() {
            assert!((p - 0.05).abs() < 0.05);
        }
    }

    #[test]
    fn serde_rebuilds_the_table() {
        let schedule = DiffusionSchedule::new(ScheduleKind::Cosine, 30).unwrap();
        let json = serde_json::to_string(&schedule).unwrap();
        let back: DiffusionSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(schedule, back);
    }
}
