//! # Point-Group Symmetry and Orientation Sampling
//!
//! A [`Symmetry`] names one of the point groups used for particle reconstruction;
//! a [`SymmetryGroup`] carries its explicit rotation operators and generates the
//! coarse orientation grid used for cold-start searches.
//!
//! ## Sampling
//!
//! Projection directions come from a Saff-Kuijlaars spiral over the whole sphere
//! with `round(4π / step²)` points. A direction survives only when it is the
//! canonical member of its orbit under the group: greatest `z`, then smallest
//! azimuth. When mirrors are excluded the orbit also includes the image of the
//! direction reflected through the `xy` plane. Every surviving direction is then
//! combined with in-plane rotations `0, step, 2·step, …` below 360°.

use super::transform::{EmanAngles, RigidTransform, axis_rotation_about};
use nalgebra::{UnitQuaternion, Vector3};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

const OPERATOR_TOLERANCE: f64 = 1e-6;
const CANONICAL_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SymmetryError {
    #[error("Unrecognized symmetry '{0}' (expected c<n>, d<n>, tet, oct or icos)")]
    Unrecognized(String),
    #[error("Symmetry order must be at least 1, got {0}")]
    InvalidOrder(usize),
    #[error("Operator closure for {symmetry} produced more than {order} elements")]
    ClosureOverflow { symmetry: String, order: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symmetry {
    Cyclic(usize),
    Dihedral(usize),
    Tetrahedral,
    Octahedral,
    Icosahedral,
}

impl Symmetry {
    pub fn order(&self) -> usize {
        match self {
            Symmetry::Cyclic(n) => *n,
            Symmetry::Dihedral(n) => 2 * n,
            Symmetry::Tetrahedral => 12,
            Symmetry::Octahedral => 24,
            Symmetry::Icosahedral => 60,
        }
    }

    fn generators(&self) -> Vec<UnitQuaternion<f64>> {
        let z = Vector3::z();
        let diagonal = Vector3::new(1.0, 1.0, 1.0);
        match *self {
            Symmetry::Cyclic(n) => vec![axis_rotation_about(&z, 360.0 / n as f64)],
            Symmetry::Dihedral(n) => vec![
                axis_rotation_about(&z, 360.0 / n as f64),
                axis_rotation_about(&Vector3::x(), 180.0),
            ],
            Symmetry::Tetrahedral => vec![
                axis_rotation_about(&z, 180.0),
                axis_rotation_about(&diagonal, 120.0),
            ],
            Symmetry::Octahedral => vec![
                axis_rotation_about(&z, 90.0),
                axis_rotation_about(&diagonal, 120.0),
            ],
            Symmetry::Icosahedral => {
                let golden = (1.0 + 5f64.sqrt()) / 2.0;
                let tilt = (1.0 / golden).atan();
                let two_fold = Vector3::new(tilt.sin(), 0.0, tilt.cos());
                vec![
                    axis_rotation_about(&z, 72.0),
                    axis_rotation_about(&two_fold, 180.0),
                ]
            }
        }
    }
}

impl FromStr for Symmetry {
    type Err = SymmetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "tet" => return Ok(Symmetry::Tetrahedral),
            "oct" => return Ok(Symmetry::Octahedral),
            "icos" => return Ok(Symmetry::Icosahedral),
            _ => {}
        }

        let mut chars = name.chars();
        let kind = chars.next();
        let n: usize = chars
            .as_str()
            .parse()
            .map_err(|_| SymmetryError::Unrecognized(s.to_string()))?;
        if n == 0 {
            return Err(SymmetryError::InvalidOrder(n));
        }
        match kind {
            Some('c') => Ok(Symmetry::Cyclic(n)),
            Some('d') => Ok(Symmetry::Dihedral(n)),
            _ => Err(SymmetryError::Unrecognized(s.to_string())),
        }
    }
}

impl fmt::Display for Symmetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symmetry::Cyclic(n) => write!(f, "c{}", n),
            Symmetry::Dihedral(n) => write!(f, "d{}", n),
            Symmetry::Tetrahedral => write!(f, "tet"),
            Symmetry::Octahedral => write!(f, "oct"),
            Symmetry::Icosahedral => write!(f, "icos"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymmetryGroup {
    symmetry: Symmetry,
    operators: Vec<UnitQuaternion<f64>>,
}

impl SymmetryGroup {
    pub fn new(symmetry: Symmetry) -> Result<Self, SymmetryError> {
        let order = symmetry.order();
        let generators = symmetry.generators();
        let mut operators = vec![UnitQuaternion::identity()];
        let mut frontier = 0;

        while frontier < operators.len() {
            let current = operators[frontier];
            frontier += 1;
            for generator in &generators {
                let candidate = generator * current;
                let known = operators
                    .iter()
                    .any(|op| op.angle_to(&candidate).to_degrees() < OPERATOR_TOLERANCE);
                if !known {
                    operators.push(candidate);
                    if operators.len() > order {
                        return Err(SymmetryError::ClosureOverflow {
                            symmetry: symmetry.to_string(),
                            order,
                        });
                    }
                }
            }
        }

        debug!(%symmetry, operators = operators.len(), "Built symmetry group");
        Ok(Self {
            symmetry,
            operators,
        })
    }

    pub fn parse(name: &str) -> Result<Self, SymmetryError> {
        Self::new(name.parse()?)
    }

    pub fn symmetry(&self) -> Symmetry {
        self.symmetry
    }

    pub fn operators(&self) -> &[UnitQuaternion<f64>] {
        &self.operators
    }

    pub fn order(&self) -> usize {
        self.operators.len()
    }

    /// Every transform equivalent to `xf` under the group, `xf ∘ g`, identity first.
    pub fn symmetry_mates(&self, xf: &RigidTransform) -> Vec<RigidTransform> {
        self.operators
            .iter()
            .map(|g| xf.compose(&RigidTransform::from_rotation(*g)))
            .collect()
    }

    /// Deterministic, duplicate-free orientations covering the asymmetric unit.
    pub fn gen_orientations(&self, step: f64, include_mirror: bool) -> Vec<RigidTransform> {
        let in_plane = in_plane_angles(step);
        let directions: Vec<Vector3<f64>> = saff_spiral(step)
            .into_iter()
            .filter(|d| self.is_canonical(d, include_mirror))
            .collect();

        let orientations: Vec<RigidTransform> = directions
            .iter()
            .flat_map(|d| {
                let alt = d.z.clamp(-1.0, 1.0).acos().to_degrees();
                let az = (90.0 - azimuth(d)).rem_euclid(360.0);
                in_plane.iter().map(move |&phi| {
                    RigidTransform::from_eman(EmanAngles { alt, az, phi }, Vector3::zeros())
                })
            })
            .collect();

        debug!(
            symmetry = %self.symmetry,
            step,
            include_mirror,
            directions = directions.len(),
            orientations = orientations.len(),
            "Generated orientation grid"
        );
        orientations
    }

    fn is_canonical(&self, direction: &Vector3<f64>, include_mirror: bool) -> bool {
        let mirrored = Vector3::new(direction.x, direction.y, -direction.z);
        let sources: &[Vector3<f64>] = if include_mirror {
            std::slice::from_ref(direction)
        } else {
            &[*direction, mirrored]
        };
        let own_azimuth = azimuth(direction);

        for source in sources {
            for op in &self.operators {
                let image = op * source;
                if image.z > direction.z + CANONICAL_TOLERANCE {
                    return false;
                }
                if (image.z - direction.z).abs() <= CANONICAL_TOLERANCE
                    && azimuth(&image) < own_azimuth - CANONICAL_TOLERANCE
                    && !is_pole(direction)
                {
                    return false;
                }
            }
        }
        true
    }
}

fn is_pole(direction: &Vector3<f64>) -> bool {
    direction.x.hypot(direction.y) < CANONICAL_TOLERANCE
}

fn azimuth(direction: &Vector3<f64>) -> f64 {
    direction.y.atan2(direction.x).to_degrees().rem_euclid(360.0)
}

fn in_plane_angles(step: f64) -> Vec<f64> {
    (0..)
        .map(|i| i as f64 * step)
        .take_while(|&phi| phi < 360.0 - CANONICAL_TOLERANCE)
        .collect()
}

fn saff_spiral(step: f64) -> Vec<Vector3<f64>> {
    let step_rad = step.to_radians();
    let n = ((4.0 * std::f64::consts::PI / (step_rad * step_rad)).round() as usize).max(2);
    let mut phi = 0.0_f64;

    (0..n)
        .map(|k| {
            let h = -1.0 + 2.0 * k as f64 / (n - 1) as f64;
            let theta = h.clamp(-1.0, 1.0).acos();
            if k == 0 || k == n - 1 {
                phi = 0.0;
            } else {
                phi = (phi + 3.6 / (n as f64 * (1.0 - h * h)).sqrt())
                    .rem_euclid(2.0 * std::f64::consts::PI);
            }
            Vector3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_symmetry_names_case_insensitively() {
        assert_eq!("c1".parse::<Symmetry>(), Ok(Symmetry::Cyclic(1)));
        assert_eq!("C4".parse::<Symmetry>(), Ok(Symmetry::Cyclic(4)));
        assert_eq!("d7".parse::<Symmetry>(), Ok(Symmetry::Dihedral(7)));
        assert_eq!("TET".parse::<Symmetry>(), Ok(Symmetry::Tetrahedral));
        assert_eq!("oct".parse::<Symmetry>(), Ok(Symmetry::Octahedral));
        assert_eq!("Icos".parse::<Symmetry>(), Ok(Symmetry::Icosahedral));
    }

    #[test]
    fn rejects_malformed_symmetry_names() {
        assert!(matches!(
            "h3".parse::<Symmetry>(),
            Err(SymmetryError::Unrecognized(_))
        ));
        assert!(matches!(
            "c".parse::<Symmetry>(),
            Err(SymmetryError::Unrecognized(_))
        ));
        assert_eq!("c0".parse::<Symmetry>(), Err(SymmetryError::InvalidOrder(0)));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for name in ["c1", "c6", "d2", "tet", "oct", "icos"] {
            let parsed: Symmetry = name.parse().unwrap();
            assert_eq!(parsed.to_string(), name);
        }
    }

    #[test]
    fn group_closure_reaches_expected_order() {
        for (name, order) in [
            ("c1", 1),
            ("c5", 5),
            ("d3", 6),
            ("tet", 12),
            ("oct", 24),
            ("icos", 60),
        ] {
            let group = SymmetryGroup::parse(name).unwrap();
            assert_eq!(group.order(), order, "order of {}", name);
        }
    }

    #[test]
    fn symmetry_mates_start_with_the_transform_itself() {
        let group = SymmetryGroup::parse("d2").unwrap();
        let xf = RigidTransform::from_eman(
            EmanAngles {
                alt: 20.0,
                az: 30.0,
                phi: 40.0,
            },
            Vector3::new(1.0, 2.0, 3.0),
        );

        let mates = group.symmetry_mates(&xf);

        assert_eq!(mates.len(), 4);
        assert!(mates[0].approx_eq(&xf, 1e-4, 1e-12));
        for mate in &mates {
            assert_eq!(mate.translation(), xf.translation());
        }
    }

    #[test]
    fn c1_grid_is_large_enough_and_duplicate_free() {
        let group = SymmetryGroup::parse("c1").unwrap();

        let orientations = group.gen_orientations(15.0, true);

        let minimum = (360.0_f64 / 15.0).powi(2) / 4.0;
        assert!(orientations.len() as f64 >= minimum);
        assert_eq!(orientations.len() % 24, 0);
    }

    #[test]
    fn c1_grid_has_no_pair_closer_than_tolerance() {
        let group = SymmetryGroup::parse("c1").unwrap();

        let orientations = group.gen_orientations(15.0, true);

        for (i, a) in orientations.iter().enumerate() {
            for b in &orientations[i + 1..] {
                assert!(a.spin_distance(b) > 1e-6);
            }
        }
    }

    #[test]
    fn grid_is_deterministic() {
        let group = SymmetryGroup::parse("c3").unwrap();

        let first = group.gen_orientations(20.0, true);
        let second = group.gen_orientations(20.0, true);

        assert_eq!(first, second);
    }

    #[test]
    fn cyclic_symmetry_shrinks_the_grid_by_its_order() {
        let c1 = SymmetryGroup::parse("c1").unwrap().gen_orientations(10.0, true);
        let c4 = SymmetryGroup::parse("c4").unwrap().gen_orientations(10.0, true);

        let ratio = c1.len() as f64 / c4.len() as f64;
        assert!(ratio > 3.0 && ratio < 5.0, "ratio was {}", ratio);
    }

    #[test]
    fn excluding_mirrors_keeps_the_upper_hemisphere() {
        let group = SymmetryGroup::parse("c1").unwrap();

        let orientations = group.gen_orientations(20.0, false);

        assert!(!orientations.is_empty());
        for xf in &orientations {
            assert!(xf.eman_angles().alt <= 90.0 + 1e-9);
        }
    }
}
