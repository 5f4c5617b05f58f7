use super::particle::HalfSet;
use crate::core::geometry::transform::RigidTransform;

/// Best orientation found for one single-particle image.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub id: usize,
    pub src: String,
    pub idx: usize,
    /// Projection transform, translation in full-box pixels.
    pub projection: RigidTransform,
    pub score: f64,
    pub class: HalfSet,
}

/// Best 3D alignment found for one sub-tomogram.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtomogramAlignment {
    pub id: usize,
    pub src: String,
    pub idx: usize,
    /// Inverse of the transform mapping the reference onto the particle.
    pub align3d: RigidTransform,
    /// Mean of the per-tilt scores.
    pub score: f64,
    pub orig_idx: Option<usize>,
}

/// Re-scored projection of one sub-tilt under the best 3D alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtiltAlignment {
    pub src: String,
    pub idx: usize,
    /// `tilt ∘ best`.
    pub projection: RigidTransform,
    pub score: f64,
    pub ptcl3d_id: usize,
    pub class: HalfSet,
    pub tilt_id: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SptAlignment {
    pub volume: SubtomogramAlignment,
    pub subtilts: Vec<SubtiltAlignment>,
}
