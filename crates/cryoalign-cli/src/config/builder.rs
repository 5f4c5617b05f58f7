use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FileOptimizerConfig, FileResolutionConfig};
use super::models::{DataPaths, SpaAppConfig, SptAppConfig};
use crate::cli::{DataArgs, SearchArgs, SpaArgs, SptArgs};
use crate::error::{CliError, Result};
use cryoalign::core::geometry::symmetry::Symmetry;
use cryoalign::engine::config as core_config;
use std::str::FromStr;

pub fn build_spa_config(args: &SpaArgs) -> Result<SpaAppConfig> {
    let defaults = DefaultsConfig::default();
    let mut file_config = load_file_config(&args.data, &args.search)?;

    let search_file = file_config.search.take().unwrap_or_default();
    let spa_file = file_config.spa.take().unwrap_or_default();

    let symmetry = parse_symmetry(
        args.search
            .symmetry
            .as_deref()
            .or(search_file.symmetry.as_deref())
            .unwrap_or(&defaults.symmetry),
    )?;
    let coarse_step = args
        .search
        .coarse_step
        .or(search_file.coarse_step)
        .unwrap_or(defaults.spa_coarse_step);
    let include_mirror = merge_mirror(&args.search, search_file.include_mirror, &defaults);
    let initial_pool = args
        .search
        .initial_pool
        .or(search_file.initial_pool)
        .unwrap_or(defaults.initial_pool);
    let local_refine = args
        .local_refine
        .or(spa_file.local_refine)
        .unwrap_or(defaults.local_refine);
    let perturbation_spread = spa_file
        .perturbation_spread
        .unwrap_or(defaults.perturbation_spread);
    let seed = args.seed.or(spa_file.seed).unwrap_or(defaults.seed);

    let resolution = merge_resolution(&args.search, file_config.resolution.take(), &defaults);
    let optimizer = merge_optimizer(&args.search, file_config.optimizer.take(), &defaults);

    let mut builder = core_config::SpaAlignConfigBuilder::new()
        .symmetry(symmetry)
        .coarse_step(coarse_step)
        .include_mirror(include_mirror)
        .initial_pool(initial_pool)
        .local_refine(local_refine)
        .perturbation_spread(perturbation_spread)
        .resolution(resolution)
        .optimizer(optimizer)
        .seed(seed);
    if let Some(max_angle) = args.max_angle.or(spa_file.max_angle) {
        builder = builder.max_angle(max_angle);
    }
    let core_config = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    Ok(SpaAppConfig {
        input_path: args.input.clone(),
        output_path: args.output.clone(),
        data: data_paths(&args.data),
        inline: args.data.inline,
        core_config,
    })
}

pub fn build_spt_config(args: &SptArgs) -> Result<SptAppConfig> {
    let defaults = DefaultsConfig::default();
    let mut file_config = load_file_config(&args.data, &args.search)?;

    let search_file = file_config.search.take().unwrap_or_default();
    let spt_file = file_config.spt.take().unwrap_or_default();

    let symmetry = parse_symmetry(
        args.search
            .symmetry
            .as_deref()
            .or(search_file.symmetry.as_deref())
            .unwrap_or(&defaults.symmetry),
    )?;
    let coarse_step = args
        .search
        .coarse_step
        .or(search_file.coarse_step)
        .unwrap_or(defaults.spt_coarse_step);
    let include_mirror = merge_mirror(&args.search, search_file.include_mirror, &defaults);
    let initial_pool = args
        .search
        .initial_pool
        .or(search_file.initial_pool)
        .unwrap_or(defaults.initial_pool);
    let max_angle = args
        .max_angle
        .or(spt_file.max_angle)
        .unwrap_or(defaults.spt_max_angle);

    // Either source can switch a mode on; neither can switch it off.
    let from_scratch = args.from_scratch || spt_file.from_scratch.unwrap_or(false);
    let skip_align = args.skip_align || spt_file.skip_align.unwrap_or(false);

    let resolution = merge_resolution(&args.search, file_config.resolution.take(), &defaults);
    let optimizer = merge_optimizer(&args.search, file_config.optimizer.take(), &defaults);

    let mut builder = core_config::SptAlignConfigBuilder::new()
        .symmetry(symmetry)
        .coarse_step(coarse_step)
        .include_mirror(include_mirror)
        .initial_pool(initial_pool)
        .max_angle(max_angle)
        .from_scratch(from_scratch)
        .skip_align(skip_align)
        .resolution(resolution)
        .optimizer(optimizer);
    if let Some(max_shift) = args.max_shift.or(spt_file.max_shift) {
        builder = builder.max_shift(max_shift);
    }
    if let Some(name) = args.break_sym.as_deref().or(spt_file.break_symmetry.as_deref()) {
        builder = builder.break_symmetry(parse_symmetry(name)?);
    }
    let core_config = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    Ok(SptAppConfig {
        input_path: args.input.clone(),
        output_path: args.output.clone(),
        subtilt_output_path: args.output_subtilts.clone(),
        data: data_paths(&args.data),
        inline: args.data.inline,
        core_config,
    })
}

fn load_file_config(data: &DataArgs, search: &SearchArgs) -> Result<FileConfig> {
    let file_config = if let Some(config_path) = &data.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };
    apply_set_values(file_config, &search.set_values)
}

fn data_paths(data: &DataArgs) -> DataPaths {
    DataPaths {
        reference: data.reference.clone(),
        reference_odd: data.reference_odd.clone(),
        stack: data.stack.clone(),
    }
}

fn parse_symmetry(name: &str) -> Result<Symmetry> {
    Symmetry::from_str(name).map_err(|e| CliError::Config(e.to_string()))
}

fn merge_mirror(args: &SearchArgs, file_val: Option<bool>, defaults: &DefaultsConfig) -> bool {
    if args.no_mirror {
        false
    } else {
        file_val.unwrap_or(defaults.include_mirror)
    }
}

fn merge_resolution(
    args: &SearchArgs,
    file_val: Option<FileResolutionConfig>,
    defaults: &DefaultsConfig,
) -> core_config::ResolutionConfig {
    let file_val = file_val.unwrap_or_default();
    core_config::ResolutionConfig {
        max_resolution: args.max_res.or(file_val.max_resolution),
        min_resolution: args.min_res.or(file_val.min_resolution),
        min_res_pixels: file_val.min_res_pixels.unwrap_or(defaults.min_res_pixels),
    }
}

fn merge_optimizer(
    args: &SearchArgs,
    file_val: Option<FileOptimizerConfig>,
    defaults: &DefaultsConfig,
) -> core_config::OptimizerConfig {
    let file_val = file_val.unwrap_or_default();
    core_config::OptimizerConfig {
        max_iterations: args
            .max_iterations
            .or(file_val.max_iterations)
            .unwrap_or(defaults.max_iterations),
        f_tolerance: file_val.f_tolerance.unwrap_or(defaults.f_tolerance),
        x_tolerance: file_val.x_tolerance.unwrap_or(defaults.x_tolerance),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value)))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    if set_values.is_empty() {
        return Ok(config);
    }
    for kv_pair in set_values {
        let parts: Vec<_> = kv_pair.splitn(2, '=').collect();
        if parts.len() != 2 {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        }
        let key = parts[0];
        let value_str = parts[1];

        match key {
            "search.symmetry" => {
                config.search.get_or_insert_with(Default::default).symmetry =
                    Some(value_str.to_string());
            }
            "search.coarse-step" => {
                config.search.get_or_insert_with(Default::default).coarse_step =
                    Some(parse_value(key, value_str, "float")?);
            }
            "search.include-mirror" => {
                config.search.get_or_insert_with(Default::default).include_mirror =
                    Some(parse_value(key, value_str, "boolean")?);
            }
            "search.initial-pool" => {
                config.search.get_or_insert_with(Default::default).initial_pool =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "spa.local-refine" => {
                config.spa.get_or_insert_with(Default::default).local_refine =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "spa.max-angle" => {
                config.spa.get_or_insert_with(Default::default).max_angle =
                    Some(parse_value(key, value_str, "float")?);
            }
            "spa.perturbation-spread" => {
                config.spa.get_or_insert_with(Default::default).perturbation_spread =
                    Some(parse_value(key, value_str, "float")?);
            }
            "spa.seed" => {
                config.spa.get_or_insert_with(Default::default).seed =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "spt.from-scratch" => {
                config.spt.get_or_insert_with(Default::default).from_scratch =
                    Some(parse_value(key, value_str, "boolean")?);
            }
            "spt.skip-align" => {
                config.spt.get_or_insert_with(Default::default).skip_align =
                    Some(parse_value(key, value_str, "boolean")?);
            }
            "spt.max-shift" => {
                config.spt.get_or_insert_with(Default::default).max_shift =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "spt.max-angle" => {
                config.spt.get_or_insert_with(Default::default).max_angle =
                    Some(parse_value(key, value_str, "float")?);
            }
            "spt.break-symmetry" => {
                config.spt.get_or_insert_with(Default::default).break_symmetry =
                    Some(value_str.to_string());
            }
            "resolution.max-resolution" => {
                config.resolution.get_or_insert_with(Default::default).max_resolution =
                    Some(parse_value(key, value_str, "float")?);
            }
            "resolution.min-resolution" => {
                config.resolution.get_or_insert_with(Default::default).min_resolution =
                    Some(parse_value(key, value_str, "float")?);
            }
            "resolution.min-res-pixels" => {
                config.resolution.get_or_insert_with(Default::default).min_res_pixels =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "optimizer.max-iterations" => {
                config.optimizer.get_or_insert_with(Default::default).max_iterations =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "optimizer.f-tolerance" => {
                config.optimizer.get_or_insert_with(Default::default).f_tolerance =
                    Some(parse_value(key, value_str, "float")?);
            }
            "optimizer.x-tolerance" => {
                config.optimizer.get_or_insert_with(Default::default).x_tolerance =
                    Some(parse_value(key, value_str, "float")?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}
