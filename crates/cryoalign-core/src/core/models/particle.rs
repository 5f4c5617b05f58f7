use crate::core::geometry::transform::RigidTransform;
use crate::core::imaging::ctf::CtfParams;
use std::fmt;
use std::sync::Arc;

/// Gold-standard half set a particle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HalfSet {
    Even,
    Odd,
}

impl HalfSet {
    pub fn from_index(index: usize) -> Self {
        if index % 2 == 0 {
            HalfSet::Even
        } else {
            HalfSet::Odd
        }
    }

    pub fn index(&self) -> usize {
        match self {
            HalfSet::Even => 0,
            HalfSet::Odd => 1,
        }
    }
}

impl fmt::Display for HalfSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// One single-particle projection image.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleRecord {
    /// Position of the particle in the input list.
    pub id: usize,
    pub src: String,
    pub idx: usize,
    /// Existing projection orientation, translation in full-box pixels.
    pub prior: Option<RigidTransform>,
    pub ctf: Option<CtfParams>,
    pub class: Option<HalfSet>,
}

impl ParticleRecord {
    pub fn new(id: usize, src: impl Into<String>, idx: usize) -> Self {
        Self {
            id,
            src: src.into(),
            idx,
            prior: None,
            ctf: None,
            class: None,
        }
    }

    pub fn with_prior(mut self, prior: RigidTransform) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn with_ctf(mut self, ctf: CtfParams) -> Self {
        self.ctf = Some(ctf);
        self
    }

    pub fn with_class(mut self, class: HalfSet) -> Self {
        self.class = Some(class);
        self
    }

    pub fn half_set(&self) -> HalfSet {
        self.class.unwrap_or_else(|| HalfSet::from_index(self.id))
    }
}

/// One image of a sub-tilt series together with its tilt geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtiltRecord {
    pub src: String,
    pub idx: usize,
    /// Projection transform of this tilt relative to the sub-tomogram frame.
    pub projection: RigidTransform,
    pub tilt_id: usize,
}

/// One sub-tomogram and the sub-tilt images it was reconstructed from.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtomogramRecord {
    pub id: usize,
    pub src: String,
    pub idx: usize,
    /// Existing 3D alignment (reference to particle frame inverted), full-box pixels.
    pub align3d: Option<RigidTransform>,
    /// Index of the particle in the list the half sets were assigned from.
    pub orig_idx: Option<usize>,
    pub subtilts: Vec<SubtiltRecord>,
}

impl SubtomogramRecord {
    pub fn half_set(&self) -> HalfSet {
        HalfSet::from_index(self.orig_idx.unwrap_or(self.id))
    }
}

/// Even and odd references, shared read-only by every particle of a run.
#[derive(Debug)]
pub struct ReferencePair<R: ?Sized> {
    pub even: Arc<R>,
    pub odd: Arc<R>,
}

impl<R: ?Sized> Clone for ReferencePair<R> {
    fn clone(&self) -> Self {
        Self {
            even: Arc::clone(&self.even),
            odd: Arc::clone(&self.odd),
        }
    }
}

impl<R: ?Sized> ReferencePair<R> {
    /// One reference serving both half sets.
    pub fn shared(reference: Arc<R>) -> Self {
        Self {
            even: Arc::clone(&reference),
            odd: reference,
        }
    }

    pub fn gold_standard(even: Arc<R>, odd: Arc<R>) -> Self {
        Self { even, odd }
    }

    pub fn for_half(&self, half: HalfSet) -> &Arc<R> {
        match half {
            HalfSet::Even => &self.even,
            HalfSet::Odd => &self.odd,
        }
    }
}
