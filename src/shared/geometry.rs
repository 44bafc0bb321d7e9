//! Rigid-body residue frames for the structure channel of the diffusion
//! process. A frame is the position of a residue's Calpha plus the
//! orientation of its backbone.
use anyhow::{anyhow, Result};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{de, ser::SerializeStruct, Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Debug, PartialEq)]
pub struct ResidueFrame {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Default for ResidueFrame {
    fn default() -> ResidueFrame {
        ResidueFrame {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }
}

// nalgebra is compiled without serde support, so frames are stored as plain
// coordinate arrays ([x, y, z] and [w, i, j, k]).
impl Serialize for ResidueFrame {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("ResidueFrame", 2)?;
        let t = [self.translation.x, self.translation.y, self.translation.z];
        let q = self.rotation.quaternion();
        let r = [q.w, q.i, q.j, q.k];
        state.serialize_field("translation", &t)?;
        state.serialize_field("rotation", &r)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ResidueFrame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FrameData {
            translation: [f64; 3],
            rotation: [f64; 4],
        }
        let data = FrameData::deserialize(deserializer)?;
        let [w, i, j, k] = data.rotation;
        if (w * w + i * i + j * j + k * k).sqrt() < 1e-6 {
            return Err(de::Error::custom("Degenerate rotation quaternion"));
        }
        Ok(ResidueFrame {
            translation: Vector3::new(
                data.translation[0],
                data.translation[1],
                data.translation[2],
            ),
            rotation: UnitQuaternion::from_quaternion(Quaternion::new(w, i, j, k)),
        })
    }
}

impl ResidueFrame {
    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> ResidueFrame {
        ResidueFrame {
            translation,
            rotation,
        }
    }

    pub fn at_position(x: f64, y: f64, z: f64) -> ResidueFrame {
        ResidueFrame {
            translation: Vector3::new(x, y, z),
            rotation: UnitQuaternion::identity(),
        }
    }

    pub fn distance(&self, other: &ResidueFrame) -> f64 {
        (self.translation - other.translation).norm()
    }

    /// Angle (radians) between the two orientations
    pub fn angular_distance(&self, other: &ResidueFrame) -> f64 {
        self.rotation.angle_to(&other.rotation)
    }

    /// Move the orientation toward the identity along the geodesic
    /// (factor 0 = unchanged, factor 1 = identity)
    pub fn relax_rotation(&self, factor: f64) -> ResidueFrame {
        ResidueFrame {
            translation: self.translation,
            rotation: self.rotation.powf(1. - factor.clamp(0., 1.)),
        }
    }
}

/// Calpha RMSD between two frame lists of equal length
pub fn ca_rmsd(a: &[ResidueFrame], b: &[ResidueFrame]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(anyhow!(
            "Cannot compute the RMSD of structures with different lengths ({} vs {})",
            a.len(),
            b.len()
        ));
    }
    if a.is_empty() {
        return Err(anyhow!("Cannot compute the RMSD of empty structures"));
    }
    let sum_sq: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(fa, fb)| (fa.translation - fb.translation).norm_squared())
        .sum();
    Ok((sum_sq / a.len() as f64).sqrt())
}

/// Uniform random rotation (normalized 4d gaussian)
pub fn random_rotation<R: Rng>(rng: &mut R) -> UnitQuaternion<f64> {
    let normal = Normal::new(0., 1.).unwrap();
    let q = Quaternion::new(
        normal.sample(rng),
        normal.sample(rng),
        normal.sample(rng),
        normal.sample(rng),
    );
    UnitQuaternion::from_quaternion(q)
}

/// Isotropic gaussian displacement with standard deviation `sigma`
pub fn random_displacement<R: Rng>(rng: &mut R, sigma: f64) -> Vector3<f64> {
    let normal = Normal::new(0., sigma.max(0.)).unwrap();
    Vector3::new(normal.sample(rng), normal.sample(rng), normal.sample(rng))
}

/// Number of residue pairs closer than `min_distance` (sequence neighbours
/// excluded, they are covalently linked anyway)
pub fn count_clashes(frames: &[ResidueFrame], min_distance: f64) -> usize {
    let mut clashes = 0;
    for ii in 0..frames.len() {
        for jj in (ii + 2)..frames.len() {
            if frames[ii].distance(&frames[jj]) < min_distance {
                clashes += 1;
            }
        }
    }
    clashes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn rmsd_of_identical_structures_is_zero() {
        let frames = vec![
            ResidueFrame::at_position(0., 0., 0.),
            ResidueFrame::at_position(3.8, 0., 0.),
        ];
        assert_approx_eq!(ca_rmsd(&frames, &frames).unwrap(), 0.);
    }

    #[test]
    fn rmsd_length_mismatch_errors() {
        let a = vec![ResidueFrame::default()];
        let b = vec![ResidueFrame::default(), ResidueFrame::default()];
        assert!(ca_rmsd(&a, &b).is_err());
    }

    #[test]
    fn relax_rotation_reaches_identity() {
        let mut rng = SmallRng::seed_from_u64(0);
        let frame = ResidueFrame::new(Vector3::zeros(), random_rotation(&mut rng));
        let relaxed = frame.relax_rotation(1.);
        assert!(relaxed.rotation.angle_to(&UnitQuaternion::identity()) < 1e-10);
    }

    #[test]
    fn clash_count_ignores_neighbours() {
        let frames = vec![
            ResidueFrame::at_position(0., 0., 0.),
            ResidueFrame::at_position(1., 0., 0.),
            ResidueFrame::at_position(2., 0., 0.),
        ];
        // 0-1 and 1-2 are neighbours, only 0-2 is a candidate pair
        assert_eq!(count_clashes(&frames, 3.), 1);
        assert_eq!(count_clashes(&frames, 1.), 0);
    }

    #[test]
    fn frame_serde_roundtrip() {
        let mut rng = SmallRng::seed_from_u64(7);
        let frame = ResidueFrame::new(Vector3::new(1., -2., 0.5), random_rotation(&mut rng));
        let json = serde_json::to_string(&frame).unwrap();
        let back: ResidueFrame = serde_json::from_str(&json).unwrap();
        assert!(frame.distance(&back) < 1e-10);
        assert!(frame.angular_distance(&back) < 1e-10);
    }
}
