use crate::core::geometry::symmetry::{Symmetry, SymmetryError};
use thiserror::Error;

pub const DEFAULT_SPA_COARSE_STEP: f64 = 7.4;
pub const DEFAULT_SPT_COARSE_STEP: f64 = 7.5 - 1e-5;
pub const DEFAULT_INITIAL_POOL: usize = 32;
/// Standard deviation in degrees of the warm-start angular perturbations.
pub const DEFAULT_PERTURBATION_SPREAD: f64 = 5.0 / std::f64::consts::PI * 2.0;
pub const DEFAULT_SPT_MAX_ANGLE: f64 = 30.0;
pub const DEFAULT_MIN_RES_PIXELS: usize = 4;
pub const DEFAULT_MAX_ITERATIONS: usize = 50;
pub const DEFAULT_F_TOLERANCE: f64 = 1e-3;
pub const DEFAULT_X_TOLERANCE: f64 = 1e-2;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Invalid symmetry: {0}")]
    Symmetry(#[from] SymmetryError),
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(name, format!("must be a positive number, got {}", value)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionConfig {
    /// Highest resolution used for alignment, in Å. `None` keeps the full box.
    pub max_resolution: Option<f64>,
    /// Lowest resolution used by sub-tilt scoring, in Å.
    pub min_resolution: Option<f64>,
    /// Low-frequency shells excluded from projection scoring.
    pub min_res_pixels: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_resolution: None,
            min_resolution: None,
            min_res_pixels: DEFAULT_MIN_RES_PIXELS,
        }
    }
}

impl ResolutionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max) = self.max_resolution {
            check_positive("max_resolution", max)?;
        }
        if let Some(min) = self.min_resolution {
            check_positive("min_resolution", min)?;
        }
        if let (Some(max), Some(min)) = (self.max_resolution, self.min_resolution) {
            if min <= max {
                return Err(invalid(
                    "min_resolution",
                    format!("must be coarser than max_resolution ({} <= {})", min, max),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub max_iterations: usize,
    pub f_tolerance: f64,
    pub x_tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            f_tolerance: DEFAULT_F_TOLERANCE,
            x_tolerance: DEFAULT_X_TOLERANCE,
        }
    }
}

impl OptimizerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be at least 1"));
        }
        check_positive("f_tolerance", self.f_tolerance)?;
        check_positive("x_tolerance", self.x_tolerance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Exhaustive coarse search from the orientation grid.
    Global,
    /// Perturbations around the prior, skipping the first `strength` rungs.
    Local { strength: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpaAlignConfig {
    pub symmetry: Symmetry,
    pub coarse_step: f64,
    pub include_mirror: bool,
    pub search: SearchMode,
    pub initial_pool: usize,
    pub perturbation_spread: f64,
    /// Largest rotation away from the prior accepted during local refinement.
    pub max_angle: Option<f64>,
    pub resolution: ResolutionConfig,
    pub optimizer: OptimizerConfig,
    pub seed: u64,
}

#[derive(Default)]
pub struct SpaAlignConfigBuilder {
    symmetry: Option<Symmetry>,
    coarse_step: Option<f64>,
    include_mirror: Option<bool>,
    local_refine: Option<usize>,
    initial_pool: Option<usize>,
    perturbation_spread: Option<f64>,
    max_angle: Option<f64>,
    resolution: Option<ResolutionConfig>,
    optimizer: Option<OptimizerConfig>,
    seed: Option<u64>,
}

impl SpaAlignConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symmetry(mut self, symmetry: Symmetry) -> Self {
        self.symmetry = Some(symmetry);
        self
    }
    pub fn coarse_step(mut self, step: f64) -> Self {
        self.coarse_step = Some(step);
        self
    }
    pub fn include_mirror(mut self, include: bool) -> Self {
        self.include_mirror = Some(include);
        self
    }
    /// `0` runs the global search; any other value starts that many rungs in.
    pub fn local_refine(mut self, strength: usize) -> Self {
        self.local_refine = Some(strength);
        self
    }
    pub fn initial_pool(mut self, size: usize) -> Self {
        self.initial_pool = Some(size);
        self
    }
    pub fn perturbation_spread(mut self, degrees: f64) -> Self {
        self.perturbation_spread = Some(degrees);
        self
    }
    pub fn max_angle(mut self, degrees: f64) -> Self {
        self.max_angle = Some(degrees);
        self
    }
    pub fn resolution(mut self, resolution: ResolutionConfig) -> Self {
        self.resolution = Some(resolution);
        self
    }
    pub fn optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = Some(optimizer);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<SpaAlignConfig, ConfigError> {
        let coarse_step = self.coarse_step.unwrap_or(DEFAULT_SPA_COARSE_STEP);
        check_positive("coarse_step", coarse_step)?;
        let initial_pool = self.initial_pool.unwrap_or(DEFAULT_INITIAL_POOL);
        if initial_pool == 0 {
            return Err(invalid("initial_pool", "must be at least 1"));
        }
        let perturbation_spread = self
            .perturbation_spread
            .unwrap_or(DEFAULT_PERTURBATION_SPREAD);
        if !(perturbation_spread.is_finite() && perturbation_spread >= 0.0) {
            return Err(invalid(
                "perturbation_spread",
                format!("must be a non-negative number, got {}", perturbation_spread),
            ));
        }
        if let Some(angle) = self.max_angle {
            check_positive("max_angle", angle)?;
        }
        let resolution = self.resolution.unwrap_or_default();
        resolution.validate()?;
        let optimizer = self.optimizer.unwrap_or_default();
        optimizer.validate()?;

        Ok(SpaAlignConfig {
            symmetry: self.symmetry.unwrap_or(Symmetry::Cyclic(1)),
            coarse_step,
            include_mirror: self.include_mirror.unwrap_or(true),
            search: match self.local_refine {
                None | Some(0) => SearchMode::Global,
                Some(strength) => SearchMode::Local { strength },
            },
            initial_pool,
            perturbation_spread,
            max_angle: self.max_angle,
            resolution,
            optimizer,
            seed: self.seed.unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SptAlignConfig {
    pub symmetry: Symmetry,
    pub coarse_step: f64,
    pub include_mirror: bool,
    pub from_scratch: bool,
    /// Largest translation in full-box pixels; `None` uses `box/6` at every rung.
    pub max_shift: Option<usize>,
    /// Largest rotation away from the rung's starting point in local search.
    pub max_angle: f64,
    pub skip_align: bool,
    pub break_symmetry: Option<Symmetry>,
    pub initial_pool: usize,
    pub resolution: ResolutionConfig,
    pub optimizer: OptimizerConfig,
}

#[derive(Default)]
pub struct SptAlignConfigBuilder {
    symmetry: Option<Symmetry>,
    coarse_step: Option<f64>,
    include_mirror: Option<bool>,
    from_scratch: Option<bool>,
    max_shift: Option<usize>,
    max_angle: Option<f64>,
    skip_align: Option<bool>,
    break_symmetry: Option<Symmetry>,
    initial_pool: Option<usize>,
    resolution: Option<ResolutionConfig>,
    optimizer: Option<OptimizerConfig>,
}

impl SptAlignConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symmetry(mut self, symmetry: Symmetry) -> Self {
        self.symmetry = Some(symmetry);
        self
    }
    pub fn coarse_step(mut self, step: f64) -> Self {
        self.coarse_step = Some(step);
        self
    }
    pub fn include_mirror(mut self, include: bool) -> Self {
        self.include_mirror = Some(include);
        self
    }
    pub fn from_scratch(mut self, enabled: bool) -> Self {
        self.from_scratch = Some(enabled);
        self
    }
    pub fn max_shift(mut self, pixels: usize) -> Self {
        self.max_shift = Some(pixels);
        self
    }
    pub fn max_angle(mut self, degrees: f64) -> Self {
        self.max_angle = Some(degrees);
        self
    }
    pub fn skip_align(mut self, enabled: bool) -> Self {
        self.skip_align = Some(enabled);
        self
    }
    pub fn break_symmetry(mut self, symmetry: Symmetry) -> Self {
        self.break_symmetry = Some(symmetry);
        self
    }
    pub fn initial_pool(mut self, size: usize) -> Self {
        self.initial_pool = Some(size);
        self
    }
    pub fn resolution(mut self, resolution: ResolutionConfig) -> Self {
        self.resolution = Some(resolution);
        self
    }
    pub fn optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn build(self) -> Result<SptAlignConfig, ConfigError> {
        let coarse_step = self.coarse_step.unwrap_or(DEFAULT_SPT_COARSE_STEP);
        check_positive("coarse_step", coarse_step)?;
        let max_angle = self.max_angle.unwrap_or(DEFAULT_SPT_MAX_ANGLE);
        check_positive("max_angle", max_angle)?;
        let initial_pool = self.initial_pool.unwrap_or(DEFAULT_INITIAL_POOL);
        if initial_pool == 0 {
            return Err(invalid("initial_pool", "must be at least 1"));
        }
        let from_scratch = self.from_scratch.unwrap_or(false);
        let skip_align = self.skip_align.unwrap_or(false);
        if from_scratch && skip_align {
            return Err(invalid(
                "skip_align",
                "cannot skip alignment in a from-scratch search",
            ));
        }
        let resolution = self.resolution.unwrap_or_default();
        resolution.validate()?;
        let optimizer = self.optimizer.unwrap_or_default();
        optimizer.validate()?;

        Ok(SptAlignConfig {
            symmetry: self.symmetry.unwrap_or(Symmetry::Cyclic(1)),
            coarse_step,
            include_mirror: self.include_mirror.unwrap_or(true),
            from_scratch,
            max_shift: self.max_shift,
            max_angle,
            skip_align,
            break_symmetry: self.break_symmetry,
            initial_pool,
            resolution,
            optimizer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spa_builder_applies_defaults() {
        let config = SpaAlignConfigBuilder::new().build().unwrap();

        assert_eq!(config.symmetry, Symmetry::Cyclic(1));
        assert_eq!(config.coarse_step, 7.4);
        assert!(config.include_mirror);
        assert_eq!(config.search, SearchMode::Global);
        assert_eq!(config.initial_pool, 32);
        assert!((config.perturbation_spread - 3.183_098_861_837_907).abs() < 1e-12);
        assert_eq!(config.resolution.min_res_pixels, 4);
        assert_eq!(config.optimizer.max_iterations, 50);
    }

    #[test]
    fn spa_local_refine_zero_means_global() {
        let global = SpaAlignConfigBuilder::new().local_refine(0).build().unwrap();
        let local = SpaAlignConfigBuilder::new().local_refine(2).build().unwrap();

        assert_eq!(global.search, SearchMode::Global);
        assert_eq!(local.search, SearchMode::Local { strength: 2 });
    }

    #[test]
    fn spa_builder_rejects_invalid_values() {
        assert!(matches!(
            SpaAlignConfigBuilder::new().coarse_step(0.0).build(),
            Err(ConfigError::InvalidParameter {
                name: "coarse_step",
                ..
            })
        ));
        assert!(matches!(
            SpaAlignConfigBuilder::new().initial_pool(0).build(),
            Err(ConfigError::InvalidParameter {
                name: "initial_pool",
                ..
            })
        ));
        assert!(matches!(
            SpaAlignConfigBuilder::new()
                .resolution(ResolutionConfig {
                    max_resolution: Some(-3.0),
                    ..Default::default()
                })
                .build(),
            Err(ConfigError::InvalidParameter {
                name: "max_resolution",
                ..
            })
        ));
    }

    #[test]
    fn resolution_range_must_be_ordered() {
        let result = SptAlignConfigBuilder::new()
            .resolution(ResolutionConfig {
                max_resolution: Some(20.0),
                min_resolution: Some(10.0),
                ..Default::default()
            })
            .build();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "min_resolution",
                ..
            })
        ));
    }

    #[test]
    fn spt_builder_applies_defaults() {
        let config = SptAlignConfigBuilder::new().build().unwrap();

        assert!((config.coarse_step - (7.5 - 1e-5)).abs() < 1e-12);
        assert_eq!(config.max_angle, 30.0);
        assert!(!config.from_scratch);
        assert!(!config.skip_align);
        assert_eq!(config.max_shift, None);
        assert_eq!(config.break_symmetry, None);
    }

    #[test]
    fn spt_skip_align_conflicts_with_from_scratch() {
        let result = SptAlignConfigBuilder::new()
            .from_scratch(true)
            .skip_align(true)
            .build();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "skip_align",
                ..
            })
        ));
    }
}
