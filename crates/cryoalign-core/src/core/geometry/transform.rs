use nalgebra::{DVector, Isometry3, Point3, Translation3, Unit, UnitQuaternion, Vector3};
use std::ops::Mul;

const GIMBAL_EPSILON: f64 = 1e-9;

/// Euler angles in the `(alt, az, phi)` convention, `R = Rz(phi) · Rx(alt) · Rz(az)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EmanAngles {
    pub alt: f64,
    pub az: f64,
    pub phi: f64,
}

/// Euler angles in the `xyz` convention: `xtilt` about x, then `ytilt` about y,
/// then `ztilt` about z, i.e. `R = Rz(ztilt) · Ry(ytilt) · Rx(xtilt)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct XyzAngles {
    pub xtilt: f64,
    pub ytilt: f64,
    pub ztilt: f64,
}

impl XyzAngles {
    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            xtilt: values.first().copied().unwrap_or(0.0),
            ytilt: values.get(1).copied().unwrap_or(0.0),
            ztilt: values.get(2).copied().unwrap_or(0.0),
        }
    }

    pub fn to_vector(self) -> DVector<f64> {
        DVector::from_vec(vec![self.xtilt, self.ytilt, self.ztilt])
    }
}

/// A rotation followed by a translation, acting on points as `R·p + t`.
///
/// Composition follows function composition: `a.compose(&b)` (or `a * b`) applies
/// `b` first. The translation is always expressed in pixels of the box size the
/// caller is currently working at; see [`RigidTransform::rescaled`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    iso: Isometry3<f64>,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            iso: Isometry3::identity(),
        }
    }

    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            iso: Isometry3::from_parts(Translation3::from(translation), rotation),
        }
    }

    pub fn from_rotation(rotation: UnitQuaternion<f64>) -> Self {
        Self::new(rotation, Vector3::zeros())
    }

    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(UnitQuaternion::identity(), translation)
    }

    pub fn from_eman(angles: EmanAngles, translation: Vector3<f64>) -> Self {
        let rotation = axis_rotation(&Vector3::z_axis(), angles.phi)
            * axis_rotation(&Vector3::x_axis(), angles.alt)
            * axis_rotation(&Vector3::z_axis(), angles.az);
        Self::new(rotation, translation)
    }

    pub fn from_xyz(angles: XyzAngles, translation: Vector3<f64>) -> Self {
        let rotation = UnitQuaternion::from_euler_angles(
            angles.xtilt.to_radians(),
            angles.ytilt.to_radians(),
            angles.ztilt.to_radians(),
        );
        Self::new(rotation, translation)
    }

    pub fn rotation(&self) -> &UnitQuaternion<f64> {
        &self.iso.rotation
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.iso.translation.vector
    }

    pub fn with_translation(&self, translation: Vector3<f64>) -> Self {
        Self::new(self.iso.rotation, translation)
    }

    /// Adds `delta` to the translation, leaving the rotation untouched.
    pub fn translated(&self, delta: Vector3<f64>) -> Self {
        self.with_translation(self.translation() + delta)
    }

    pub fn compose(&self, other: &RigidTransform) -> Self {
        Self {
            iso: self.iso * other.iso,
        }
    }

    pub fn inverse(&self) -> Self {
        Self {
            iso: self.iso.inverse(),
        }
    }

    pub fn apply(&self, point: &Point3<f64>) -> Point3<f64> {
        self.iso.transform_point(point)
    }

    /// Rotation angle of this transform in degrees, in `[0, 180]`.
    pub fn rotation_angle(&self) -> f64 {
        self.iso.rotation.angle().to_degrees()
    }

    /// Angle in degrees of the relative rotation `self⁻¹ ∘ other`.
    pub fn spin_distance(&self, other: &RigidTransform) -> f64 {
        self.iso.rotation.angle_to(&other.iso.rotation).to_degrees()
    }

    /// Moves the translation from `from_box` pixels to `to_box` pixels.
    pub fn rescaled(&self, from_box: usize, to_box: usize) -> Self {
        let scale = to_box as f64 / from_box as f64;
        self.with_translation(self.translation() * scale)
    }

    /// Folds every translation component into `(-box/2, box/2]` (periodic box).
    pub fn wrapped(&self, box_size: usize) -> Self {
        let size = box_size as f64;
        let half = (box_size / 2) as f64;
        let wrap = |v: f64| {
            let folded = v.rem_euclid(size);
            if folded > half { folded - size } else { folded }
        };
        let t = self.translation();
        self.with_translation(Vector3::new(wrap(t.x), wrap(t.y), wrap(t.z)))
    }

    pub fn eman_angles(&self) -> EmanAngles {
        let m = self.iso.rotation.to_rotation_matrix().into_inner();
        let alt = m[(2, 2)].clamp(-1.0, 1.0).acos();
        let (az, phi) = if alt.sin().abs() > GIMBAL_EPSILON {
            (m[(2, 0)].atan2(m[(2, 1)]), m[(0, 2)].atan2(-m[(1, 2)]))
        } else {
            (0.0, m[(1, 0)].atan2(m[(0, 0)]))
        };
        EmanAngles {
            alt: alt.to_degrees(),
            az: az.to_degrees().rem_euclid(360.0),
            phi: phi.to_degrees().rem_euclid(360.0),
        }
    }

    pub fn xyz_angles(&self) -> XyzAngles {
        let (roll, pitch, yaw) = self.iso.rotation.euler_angles();
        XyzAngles {
            xtilt: roll.to_degrees(),
            ytilt: pitch.to_degrees(),
            ztilt: yaw.to_degrees(),
        }
    }

    /// Rotation-only parameter vector `[xtilt, ytilt, ztilt]`.
    pub fn to_xyz_params(&self) -> DVector<f64> {
        self.xyz_angles().to_vector()
    }

    pub fn from_xyz_params(params: &[f64], translation: Vector3<f64>) -> Self {
        Self::from_xyz(XyzAngles::from_slice(params), translation)
    }

    /// Parameter vector `[tx, ty, tz, alt, az, phi]`.
    pub fn to_eman_params(&self) -> DVector<f64> {
        let t = self.translation();
        let a = self.eman_angles();
        DVector::from_vec(vec![t.x, t.y, t.z, a.alt, a.az, a.phi])
    }

    /// Inverse of [`RigidTransform::to_eman_params`]. Missing trailing entries are zero.
    pub fn from_eman_params(params: &[f64]) -> Self {
        let get = |i: usize| params.get(i).copied().unwrap_or(0.0);
        Self::from_eman(
            EmanAngles {
                alt: get(3),
                az: get(4),
                phi: get(5),
            },
            Vector3::new(get(0), get(1), get(2)),
        )
    }

    pub fn approx_eq(&self, other: &RigidTransform, angle_tol: f64, shift_tol: f64) -> bool {
        self.spin_distance(other) <= angle_tol
            && (self.translation() - other.translation()).norm() <= shift_tol
    }
}

impl Mul for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: RigidTransform) -> RigidTransform {
        self.compose(&rhs)
    }
}

impl<'a> Mul<&'a RigidTransform> for &'a RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: &'a RigidTransform) -> RigidTransform {
        self.compose(rhs)
    }
}

pub fn axis_rotation(axis: &Unit<Vector3<f64>>, angle_degrees: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(axis, angle_degrees.to_radians())
}

pub fn axis_rotation_about(axis: &Vector3<f64>, angle_degrees: f64) -> UnitQuaternion<f64> {
    axis_rotation(&Unit::new_normalize(*axis), angle_degrees)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn sample_a() -> RigidTransform {
        RigidTransform::from_eman(
            EmanAngles {
                alt: 37.0,
                az: 112.0,
                phi: -48.0,
            },
            Vector3::new(1.5, -2.0, 0.75),
        )
    }

    fn sample_b() -> RigidTransform {
        RigidTransform::from_xyz(
            XyzAngles {
                xtilt: 10.0,
                ytilt: -25.0,
                ztilt: 140.0,
            },
            Vector3::new(-3.0, 4.0, 1.0),
        )
    }

    #[test]
    fn inverse_of_composition_reverses_order() {
        let a = sample_a();
        let b = sample_b();

        let lhs = (a * b).inverse();
        let rhs = b.inverse() * a.inverse();

        assert!(lhs.approx_eq(&rhs, 1e-4, 1e-9));
    }

    #[test]
    fn compose_applies_right_operand_first() {
        let a = RigidTransform::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let b = RigidTransform::from_rotation(axis_rotation(&Vector3::z_axis(), 90.0));
        let p = Point3::new(1.0, 0.0, 0.0);

        let moved = (a * b).apply(&p);

        assert!((moved - Point3::new(1.0, 1.0, 0.0)).norm() < TOL);
    }

    #[test]
    fn composition_is_associative_but_not_commutative() {
        let a = sample_a();
        let b = sample_b();
        let c = RigidTransform::from_translation(Vector3::new(0.0, 5.0, -1.0));

        assert!(((a * b) * c).approx_eq(&(a * (b * c)), 1e-4, 1e-9));
        assert!(!(a * b).approx_eq(&(b * a), 1e-3, 1e-3));
    }

    #[test]
    fn eman_angles_round_trip() {
        let original = EmanAngles {
            alt: 63.0,
            az: 201.0,
            phi: 17.5,
        };
        let xf = RigidTransform::from_eman(original, Vector3::zeros());

        let recovered = xf.eman_angles();

        assert!((recovered.alt - original.alt).abs() < 1e-7);
        assert!((recovered.az - original.az).abs() < 1e-7);
        assert!((recovered.phi - original.phi).abs() < 1e-7);
    }

    #[test]
    fn eman_angles_at_the_pole_fold_into_phi() {
        let xf = RigidTransform::from_eman(
            EmanAngles {
                alt: 0.0,
                az: 30.0,
                phi: 40.0,
            },
            Vector3::zeros(),
        );

        let recovered = RigidTransform::from_eman(xf.eman_angles(), Vector3::zeros());

        assert!(xf.spin_distance(&recovered) < 1e-4);
        assert!((xf.eman_angles().phi - 70.0).abs() < 1e-7);
    }

    #[test]
    fn xyz_angles_round_trip() {
        let original = XyzAngles {
            xtilt: 10.0,
            ytilt: 0.0,
            ztilt: 0.0,
        };
        let xf = RigidTransform::from_xyz(original, Vector3::zeros());

        let recovered = xf.xyz_angles();

        assert!((recovered.xtilt - 10.0).abs() < 1e-9);
        assert!(recovered.ytilt.abs() < 1e-9);
        assert!(recovered.ztilt.abs() < 1e-9);
        assert!((xf.rotation_angle() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn eman_params_round_trip() {
        let xf = sample_a();

        let back = RigidTransform::from_eman_params(xf.to_eman_params().as_slice());

        assert!(xf.approx_eq(&back, 1e-4, 1e-9));
    }

    #[test]
    fn rescaling_round_trip_restores_translation() {
        let xf = sample_b();

        let there_and_back = xf.rescaled(64, 24).rescaled(24, 64);

        assert!((there_and_back.translation() - xf.translation()).norm() < 1e-12);
        assert_eq!(there_and_back.rotation(), xf.rotation());
    }

    #[test]
    fn rescaling_scales_by_box_ratio() {
        let xf = RigidTransform::from_translation(Vector3::new(8.0, -4.0, 2.0));

        let small = xf.rescaled(64, 32);

        assert_eq!(small.translation(), Vector3::new(4.0, -2.0, 1.0));
    }

    #[test]
    fn wrapping_folds_translation_into_half_open_box() {
        let xf = RigidTransform::from_translation(Vector3::new(40.0, -40.0, 32.0));

        let wrapped = xf.wrapped(64);

        assert_eq!(wrapped.translation(), Vector3::new(-24.0, 24.0, 32.0));
    }

    #[test]
    fn spin_distance_is_symmetric_and_measures_relative_rotation() {
        let a = RigidTransform::from_rotation(axis_rotation(&Vector3::y_axis(), 20.0));
        let b = RigidTransform::from_rotation(axis_rotation(&Vector3::y_axis(), 55.0));

        assert!((a.spin_distance(&b) - 35.0).abs() < 1e-9);
        assert!((b.spin_distance(&a) - 35.0).abs() < 1e-9);
        assert!(a.spin_distance(&a) < 1e-4);
    }

    #[test]
    fn spin_distance_ignores_translation() {
        let a = sample_a();
        let b = a.translated(Vector3::new(10.0, 10.0, 10.0));

        assert!(a.spin_distance(&b) < 1e-4);
    }
}
