use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use backdrop::{ClockPolicy, HostOptions};
use effectconfig::BackdropConfig;
use tracing::{debug, info};

use crate::cli::RunArgs;
use crate::paths::AppPaths;

/// A parsed configuration and the file it came from, if any.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: BackdropConfig,
    pub path: Option<PathBuf>,
}

/// Loads an explicit config file, or the default one when it exists, or the
/// built-in defaults.
pub fn load_config(explicit: Option<&Path>, paths: &AppPaths) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = BackdropConfig::from_path(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        return Ok(LoadedConfig {
            config,
            path: Some(path.to_path_buf()),
        });
    }

    let default_path = paths.config_file();
    if default_path.is_file() {
        let config = BackdropConfig::from_path(&default_path).with_context(|| {
            format!(
                "failed to load configuration from {}",
                default_path.display()
            )
        })?;
        info!(path = %default_path.display(), "loaded configuration");
        Ok(LoadedConfig {
            config,
            path: Some(default_path),
        })
    } else {
        debug!(path = %default_path.display(), "no configuration file; using defaults");
        Ok(LoadedConfig {
            config: BackdropConfig::default(),
            path: None,
        })
    }
}

/// Applies command-line overrides on top of a file configuration and
/// re-validates the result.
pub fn apply_overrides(config: &mut BackdropConfig, args: &RunArgs) -> Result<()> {
    if let Some(size) = args.size.as_deref() {
        let (width, height) = parse_surface_size(size)?;
        config.window.width = width;
        config.window.height = height;
    }
    if let Some(density) = args.density {
        config.particle_field.density = density;
    }
    if let Some(seed) = args.seed {
        config.particle_field.seed = Some(seed);
    }
    if let Some(color) = args.laser_color {
        config.laser_flow.color = color;
    }
    if args.no_laser {
        config.laser_flow.enabled = false;
    }
    if args.no_particles {
        config.particle_field.enabled = false;
    }
    if let Some(antialias) = args.antialias {
        config.window.antialias = antialias;
    }
    if let Some(cap) = args.dpr_cap {
        config.laser_flow.device_pixel_ratio_cap = cap;
        config.particle_field.device_pixel_ratio_cap = cap;
    }
    config
        .validate()
        .context("command-line overrides produced an invalid configuration")
}

pub fn host_options(args: &RunArgs) -> Result<HostOptions> {
    let clock = match args.freeze_at {
        Some(time) if !time.is_finite() || time < 0.0 => {
            bail!("--freeze-at must be a non-negative number of seconds")
        }
        Some(time) => ClockPolicy::Frozen { time },
        None => ClockPolicy::Animate,
    };
    Ok(HostOptions {
        clock,
        ..HostOptions::default()
    })
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow!("expected WxH format, e.g. 1920x1080"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}
