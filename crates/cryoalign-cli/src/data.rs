//! Particle lists (CSV) and the synthetic stack manifest (TOML) read and written by
//! the commands.
//!
//! Every transform is stored as six columns: the translation `tx, ty, tz` in pixels
//! of the full box followed by the Euler angles `alt, az, phi` in degrees. A prior is
//! present when all three angles are filled in; missing translations read as zero.

use crate::error::{CliError, Result};
use cryoalign::core::geometry::transform::RigidTransform;
use cryoalign::core::imaging::ctf::CtfParams;
use cryoalign::core::imaging::{GaussianModel, SyntheticStack};
use cryoalign::core::models::particle::{HalfSet, ParticleRecord, SubtiltRecord, SubtomogramRecord};
use cryoalign::core::models::result::{AlignmentRecord, SptAlignment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

fn parse_error(path: &Path, source: impl Into<anyhow::Error>) -> CliError {
    CliError::FileParsing {
        path: path.to_path_buf(),
        source: source.into(),
    }
}

fn eman_columns(xf: &RigidTransform) -> [f64; 6] {
    let p = xf.to_eman_params();
    [p[0], p[1], p[2], p[3], p[4], p[5]]
}

fn optional_transform(
    what: &str,
    line: usize,
    translation: [Option<f64>; 3],
    angles: [Option<f64>; 3],
) -> Result<Option<RigidTransform>> {
    match angles {
        [None, None, None] => {
            if translation.iter().any(Option::is_some) {
                debug!(line, "Ignoring a {} translation without angles.", what);
            }
            Ok(None)
        }
        [Some(alt), Some(az), Some(phi)] => {
            let [tx, ty, tz] = translation.map(|t| t.unwrap_or(0.0));
            Ok(Some(RigidTransform::from_eman_params(&[tx, ty, tz, alt, az, phi])))
        }
        _ => Err(CliError::Data(format!(
            "row {}: the {} needs all of alt, az and phi",
            line, what
        ))),
    }
}

// --- Single-particle lists ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaParticleRow {
    pub id: usize,
    pub src: String,
    pub idx: usize,
    #[serde(default)]
    pub tx: Option<f64>,
    #[serde(default)]
    pub ty: Option<f64>,
    #[serde(default)]
    pub tz: Option<f64>,
    #[serde(default)]
    pub alt: Option<f64>,
    #[serde(default)]
    pub az: Option<f64>,
    #[serde(default)]
    pub phi: Option<f64>,
    #[serde(default)]
    pub defocus: Option<f64>,
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub cs: Option<f64>,
    #[serde(default)]
    pub ampcont: Option<f64>,
    #[serde(default)]
    pub bfactor: Option<f64>,
    #[serde(default)]
    pub class: Option<usize>,
}

impl SpaParticleRow {
    fn into_record(self, line: usize) -> Result<ParticleRecord> {
        let mut record = ParticleRecord::new(self.id, self.src, self.idx);
        if let Some(prior) = optional_transform(
            "prior",
            line,
            [self.tx, self.ty, self.tz],
            [self.alt, self.az, self.phi],
        )? {
            record = record.with_prior(prior);
        }
        if let Some(defocus) = self.defocus {
            let (Some(voltage), Some(cs), Some(ampcont)) = (self.voltage, self.cs, self.ampcont)
            else {
                return Err(CliError::Data(format!(
                    "row {}: a defocus needs voltage, cs and ampcont",
                    line
                )));
            };
            record = record.with_ctf(CtfParams {
                defocus,
                voltage,
                cs,
                ampcont,
                bfactor: self.bfactor.unwrap_or(0.0),
            });
        }
        if let Some(class) = self.class {
            record = record.with_class(HalfSet::from_index(class));
        }
        Ok(record)
    }

    fn from_record(record: &ParticleRecord) -> Self {
        let prior = record.prior.as_ref().map(eman_columns);
        let column = |i: usize| prior.map(|p| p[i]);
        Self {
            id: record.id,
            src: record.src.clone(),
            idx: record.idx,
            tx: column(0),
            ty: column(1),
            tz: column(2),
            alt: column(3),
            az: column(4),
            phi: column(5),
            defocus: record.ctf.map(|c| c.defocus),
            voltage: record.ctf.map(|c| c.voltage),
            cs: record.ctf.map(|c| c.cs),
            ampcont: record.ctf.map(|c| c.ampcont),
            bfactor: record.ctf.map(|c| c.bfactor),
            class: record.class.map(|c| c.index()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedParticleRow {
    pub id: usize,
    pub src: String,
    pub idx: usize,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub alt: f64,
    pub az: f64,
    pub phi: f64,
    pub score: f64,
    pub class: usize,
}

impl From<&AlignmentRecord> for AlignedParticleRow {
    fn from(record: &AlignmentRecord) -> Self {
        let [tx, ty, tz, alt, az, phi] = eman_columns(&record.projection);
        Self {
            id: record.id,
            src: record.src.clone(),
            idx: record.idx,
            tx,
            ty,
            tz,
            alt,
            az,
            phi,
            score: record.score,
            class: record.class.index(),
        }
    }
}

pub fn read_spa_particles(path: &Path) -> Result<Vec<ParticleRecord>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| parse_error(path, e))?;
    let mut records = Vec::new();
    for (line, row) in reader.deserialize::<SpaParticleRow>().enumerate() {
        let row = row.map_err(|e| parse_error(path, e))?;
        records.push(row.into_record(line + 1)?);
    }
    info!("Read {} particle(s) from {:?}", records.len(), path);
    Ok(records)
}

pub fn write_spa_particles(path: &Path, records: &[ParticleRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(SpaParticleRow::from_record(record))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_alignments(path: &Path, records: &[AlignmentRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(AlignedParticleRow::from(record))?;
    }
    writer.flush()?;
    info!("Wrote {} aligned particle(s) to {:?}", records.len(), path);
    Ok(())
}

// --- Sub-tomogram lists ---

/// One sub-tilt of a sub-tomogram. The sub-tomogram columns repeat on every row of
/// the same `ptcl3d_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtiltRow {
    pub ptcl3d_id: usize,
    pub src3d: String,
    pub idx3d: usize,
    #[serde(default)]
    pub orig_idx: Option<usize>,
    #[serde(default)]
    pub tx: Option<f64>,
    #[serde(default)]
    pub ty: Option<f64>,
    #[serde(default)]
    pub tz: Option<f64>,
    #[serde(default)]
    pub alt: Option<f64>,
    #[serde(default)]
    pub az: Option<f64>,
    #[serde(default)]
    pub phi: Option<f64>,
    pub src: String,
    pub idx: usize,
    pub tilt_id: usize,
    pub proj_tx: f64,
    pub proj_ty: f64,
    pub proj_tz: f64,
    pub proj_alt: f64,
    pub proj_az: f64,
    pub proj_phi: f64,
}

impl SubtiltRow {
    fn subtilt(&self) -> SubtiltRecord {
        SubtiltRecord {
            src: self.src.clone(),
            idx: self.idx,
            projection: RigidTransform::from_eman_params(&[
                self.proj_tx,
                self.proj_ty,
                self.proj_tz,
                self.proj_alt,
                self.proj_az,
                self.proj_phi,
            ]),
            tilt_id: self.tilt_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedVolumeRow {
    pub id: usize,
    pub src: String,
    pub idx: usize,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub alt: f64,
    pub az: f64,
    pub phi: f64,
    pub score: f64,
    pub orig_idx: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedSubtiltRow {
    pub src: String,
    pub idx: usize,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub alt: f64,
    pub az: f64,
    pub phi: f64,
    pub score: f64,
    pub ptcl3d_id: usize,
    pub class: usize,
    pub tilt_id: usize,
}

/// Groups sub-tilt rows into sub-tomograms, in order of first appearance.
pub fn read_subtomograms(path: &Path) -> Result<Vec<SubtomogramRecord>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| parse_error(path, e))?;
    let mut records: Vec<SubtomogramRecord> = Vec::new();
    let mut positions: HashMap<usize, usize> = HashMap::new();

    for (line, row) in reader.deserialize::<SubtiltRow>().enumerate() {
        let row = row.map_err(|e| parse_error(path, e))?;
        let line = line + 1;
        match positions.get(&row.ptcl3d_id) {
            Some(&position) => {
                let record = &mut records[position];
                if record.src != row.src3d || record.idx != row.idx3d {
                    return Err(CliError::Data(format!(
                        "row {}: sub-tomogram {} is listed as both {}#{} and {}#{}",
                        line, row.ptcl3d_id, record.src, record.idx, row.src3d, row.idx3d
                    )));
                }
                record.subtilts.push(row.subtilt());
            }
            None => {
                let align3d = optional_transform(
                    "alignment",
                    line,
                    [row.tx, row.ty, row.tz],
                    [row.alt, row.az, row.phi],
                )?;
                positions.insert(row.ptcl3d_id, records.len());
                records.push(SubtomogramRecord {
                    id: row.ptcl3d_id,
                    src: row.src3d.clone(),
                    idx: row.idx3d,
                    align3d,
                    orig_idx: row.orig_idx,
                    subtilts: vec![row.subtilt()],
                });
            }
        }
    }
    info!("Read {} sub-tomogram(s) from {:?}", records.len(), path);
    Ok(records)
}

pub fn write_subtomograms(path: &Path, records: &[SubtomogramRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        let align3d = record.align3d.as_ref().map(eman_columns);
        let column = |i: usize| align3d.map(|p| p[i]);
        for subtilt in &record.subtilts {
            let [proj_tx, proj_ty, proj_tz, proj_alt, proj_az, proj_phi] =
                eman_columns(&subtilt.projection);
            writer.serialize(SubtiltRow {
                ptcl3d_id: record.id,
                src3d: record.src.clone(),
                idx3d: record.idx,
                orig_idx: record.orig_idx,
                tx: column(0),
                ty: column(1),
                tz: column(2),
                alt: column(3),
                az: column(4),
                phi: column(5),
                src: subtilt.src.clone(),
                idx: subtilt.idx,
                tilt_id: subtilt.tilt_id,
                proj_tx,
                proj_ty,
                proj_tz,
                proj_alt,
                proj_az,
                proj_phi,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_spt_alignments(
    volume_path: &Path,
    subtilt_path: &Path,
    alignments: &[SptAlignment],
) -> Result<()> {
    let mut volumes = csv::Writer::from_path(volume_path)?;
    let mut subtilts = csv::Writer::from_path(subtilt_path)?;
    let mut subtilt_count = 0;

    for alignment in alignments {
        let volume = &alignment.volume;
        let [tx, ty, tz, alt, az, phi] = eman_columns(&volume.align3d);
        volumes.serialize(AlignedVolumeRow {
            id: volume.id,
            src: volume.src.clone(),
            idx: volume.idx,
            tx,
            ty,
            tz,
            alt,
            az,
            phi,
            score: volume.score,
            orig_idx: volume.orig_idx,
        })?;

        for subtilt in &alignment.subtilts {
            let [tx, ty, tz, alt, az, phi] = eman_columns(&subtilt.projection);
            subtilts.serialize(AlignedSubtiltRow {
                src: subtilt.src.clone(),
                idx: subtilt.idx,
                tx,
                ty,
                tz,
                alt,
                az,
                phi,
                score: subtilt.score,
                ptcl3d_id: subtilt.ptcl3d_id,
                class: subtilt.class.index(),
                tilt_id: subtilt.tilt_id,
            })?;
            subtilt_count += 1;
        }
    }
    volumes.flush()?;
    subtilts.flush()?;
    info!(
        "Wrote {} sub-tomogram(s) to {:?} and {} sub-tilt(s) to {:?}",
        alignments.len(),
        volume_path,
        subtilt_count,
        subtilt_path
    );
    Ok(())
}

// --- Orientation lists ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationRow {
    pub alt: f64,
    pub az: f64,
    pub phi: f64,
}

pub fn write_orientations(path: &Path, orientations: &[RigidTransform]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for orientation in orientations {
        let angles = orientation.eman_angles();
        writer.serialize(OrientationRow {
            alt: angles.alt,
            az: angles.az,
            phi: angles.phi,
        })?;
    }
    writer.flush()?;
    Ok(())
}

// --- Synthetic stack manifest ---

/// One image of a synthetic stack and the transform it is rendered under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestImage {
    pub src: String,
    pub idx: usize,
    /// `[tx, ty, tz, alt, az, phi]`.
    pub truth: [f64; 6],
}

/// Describes a [`SyntheticStack`]: the model it renders, its noise and wedge, and
/// the ground truth of every image. `model` is resolved relative to the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StackManifest {
    pub model: PathBuf,
    #[serde(default)]
    pub noise_sigma: f64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_wedge: Option<f64>,
    #[serde(rename = "image", default)]
    pub images: Vec<ManifestImage>,
}

impl StackManifest {
    pub fn new(model: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            noise_sigma: 0.0,
            seed: 0,
            missing_wedge: None,
            images: Vec::new(),
        }
    }

    pub fn push(&mut self, src: &str, idx: usize, truth: &RigidTransform) {
        self.images.push(ManifestImage {
            src: src.to_string(),
            idx,
            truth: eman_columns(truth),
        });
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("Reading stack manifest from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| parse_error(path, e))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string(self).map_err(|e| parse_error(path, e))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Loads the model and registers every image of the manifest found at `path`.
    pub fn open(&self, path: &Path) -> Result<SyntheticStack> {
        let model_path = match path.parent() {
            Some(dir) if self.model.is_relative() => dir.join(&self.model),
            _ => self.model.clone(),
        };
        let model = Arc::new(GaussianModel::load(&model_path)?);
        let mut stack = SyntheticStack::new(model).with_noise(self.noise_sigma, self.seed);
        if let Some(max_tilt) = self.missing_wedge {
            stack = stack.with_missing_wedge(max_tilt);
        }
        for image in &self.images {
            stack.insert(&image.src, image.idx, RigidTransform::from_eman_params(&image.truth));
        }
        info!(
            "Opened synthetic stack with {} image(s) rendered from {:?}",
            stack.len(),
            model_path
        );
        Ok(stack)
    }
}
