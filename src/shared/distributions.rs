//! Distributions used during sampling from the diffusion model
use anyhow::{anyhow, Result};
use rand::Rng;
use rand_distr::{Distribution, WeightedAliasIndex};

/// Generate an integer with a given probability
#[derive(Clone, Debug)]
pub struct DiscreteDistribution {
    distribution: WeightedAliasIndex<f64>,
}

impl DiscreteDistribution {
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if !weights.iter().all(|&x| x >= 0.) {
            return Err(anyhow!(
                "Error when creating distribution: negative weights"
            ))?;
        }

        let distribution = match weights.iter().sum::<f64>().abs() < 1e-10 {
            true => WeightedAliasIndex::new(vec![1.; weights.len()]) // when all the values are 0, all the values are equiprobable.
                .map_err(|e| anyhow!(format!("Error when creating distribution: {}", e)))?,
            false => WeightedAliasIndex::new(weights)
                .map_err(|e| anyhow!(format!("Error when creating distribution: {}", e)))?,
        };
        Ok(DiscreteDistribution { distribution })
    }

    pub fn generate<R: Rng>(&self, rng: &mut R) -> usize {
        self.distribution.sample(rng)
    }
}

impl Default for DiscreteDistribution {
    fn default() -> Self {
        DiscreteDistribution {
            distribution: WeightedAliasIndex::new(vec![1.]).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn discrete_rejects_negative_weights() {
        assert!(DiscreteDistribution::new(vec![0.5, -0.1]).is_err());
    }

    #[test]
    fn discrete_zero_weights_fall_back_to_uniform() {
        let d = DiscreteDistribution::new(vec![0., 0., 0.]).unwrap();
        let mut rng = SmallRng::seed_from_u64(0);
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[d.generate(&mut rng)] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
