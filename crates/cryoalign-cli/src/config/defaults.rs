use cryoalign::engine::config as core_config;

pub struct DefaultsConfig {
    pub symmetry: String,
    pub include_mirror: bool,
    pub initial_pool: usize,
    pub spa_coarse_step: f64,
    pub spt_coarse_step: f64,
    pub local_refine: usize,
    pub perturbation_spread: f64,
    pub seed: u64,
    pub spt_max_angle: f64,
    pub min_res_pixels: usize,
    pub max_iterations: usize,
    pub f_tolerance: f64,
    pub x_tolerance: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            symmetry: "c1".to_string(),
            include_mirror: true,
            initial_pool: core_config::DEFAULT_INITIAL_POOL,
            spa_coarse_step: core_config::DEFAULT_SPA_COARSE_STEP,
            spt_coarse_step: core_config::DEFAULT_SPT_COARSE_STEP,
            local_refine: 0,
            perturbation_spread: core_config::DEFAULT_PERTURBATION_SPREAD,
            seed: 0,
            spt_max_angle: core_config::DEFAULT_SPT_MAX_ANGLE,
            min_res_pixels: core_config::DEFAULT_MIN_RES_PIXELS,
            max_iterations: core_config::DEFAULT_MAX_ITERATIONS,
            f_tolerance: core_config::DEFAULT_F_TOLERANCE,
            x_tolerance: core_config::DEFAULT_X_TOLERANCE,
        }
    }
}
