use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

use crate::bins::{self, BinningScheme};
use crate::grid::Axis;
use crate::monitor::Direction;


/// Speed of light in vacuum, in micrometres per second.
pub const C_0: f64 = 2.997_924_58e14;
/// Free-space wave impedance, in ohms.
pub const ETA_0: f64 = 376.730_313_668;
/// Vacuum permittivity, in farads per micrometre.
pub const EPSILON_0: f64 = 8.854_187_812_8e-18;
/// Vacuum permeability, in henries per micrometre.
pub const MU_0: f64 = 1.256_637_062_12e-12;
/// Coordinates closer than this (relative to their magnitude) are treated as equal.
pub const COORD_TOLERANCE: f64 = 1e-9;
/// Slack allowed outside the unit disk before direction cosines are declared evanescent.
pub const KSPACE_TOLERANCE: f64 = 1e-12;
/// Exact projections further than this multiple of the near-field extent trigger a warning.
pub const EXACT_DISTANCE_RATIO: f64 = 1e3;
/// Far-field projections closer than this multiple of the near-field extent trigger a warning.
pub const FAR_FIELD_DISTANCE_RATIO: f64 = 10.0;

/// Transverse profile of the demonstration aperture field.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub enum Profile {
    Uniform,
    /// Gaussian amplitude with 1/e field radius `waist`, in micrometres.
    Gaussian { waist: f64 },
}

/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    /// Vacuum wavelength, in micrometres.
    pub wavelength: f64,
    pub medium_refr_index: Complex64,
    /// Aperture extent along the two in-plane axes.
    pub aperture_size: [f64; 2],
    /// Number of grid cells across the aperture along each in-plane axis.
    pub aperture_cells: [usize; 2],
    pub normal_axis: Axis,
    pub normal_dir: Direction,
    pub profile: Profile,
    pub binning: BinningScheme,
    pub proj_distance: Option<f64>,
    #[serde(default = "default_far_field_approx")]
    pub far_field_approx: bool,
    pub pts_per_wavelength: Option<f64>,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

fn default_far_field_approx() -> bool {
    true
}

fn default_directory() -> PathBuf {
    PathBuf::from("fieldproj_run")
}

impl Settings {
    pub fn frequency(&self) -> f64 {
        C_0 / self.wavelength
    }
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("Error loading configuration")?;

    let config: Settings = settings
        .try_deserialize()
        .context("Error deserializing configuration")?;

    validate_config(&config)?;

    Ok(config)
}

pub fn load_config() -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    let config_file = if local_config.exists() {
        info!("Using local configuration: {:?}", local_config);
        local_config
    } else {
        info!("Using default configuration: {:?}", default_config_file);
        default_config_file
    };

    let settings = Config::builder()
        .add_source(File::from(config_file).required(true))
        .add_source(Environment::with_prefix("fieldproj"))
        .build()
        .context("Error loading configuration")?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("Error deserializing configuration")?;

    let args = CliArgs::parse();
    apply_cli_overrides(&mut config, &args)?;

    validate_config(&config)?;

    Ok(config)
}

/// Override configuration values with any given on the command line.
pub fn apply_cli_overrides(config: &mut Settings, args: &CliArgs) -> Result<()> {
    if let Some(wavelength) = args.w {
        config.wavelength = wavelength;
    }
    if let Some(medium) = args.ri0 {
        config.medium_refr_index = medium;
    }
    if let Some(distance) = args.distance {
        config.proj_distance = Some(distance);
    }
    if args.exact {
        config.far_field_approx = false;
    }
    if let Some(ppw) = args.ppw {
        config.pts_per_wavelength = Some(ppw);
    }
    if let Some(waist) = args.waist {
        config.profile = Profile::Gaussian { waist };
    }
    if let Some(dir) = &args.dir {
        config.directory = dir.clone();
    }

    if let Some(simple) = &args.simple {
        config.binning = BinningScheme {
            scheme: bins::Scheme::Simple {
                num_theta: simple[0],
                num_phi: simple[1],
            },
        };
    } else if let Some(kspace) = &args.kspace {
        config.binning = BinningScheme {
            scheme: bins::Scheme::KSpace {
                num_ux: kspace[0],
                num_uy: kspace[1],
                max_u: 1.0,
            },
        };
    } else if args.interval {
        let (Some(theta_values), Some(phi_values)) = (&args.theta, &args.phi) else {
            bail!("Interval binning requires both --theta and --phi");
        };
        let (thetas, theta_spacings) = parse_interval_specification(theta_values)
            .map_err(|err| anyhow!("Error in theta specification: {}", err))?;
        let (phis, phi_spacings) = parse_interval_specification(phi_values)
            .map_err(|err| anyhow!("Error in phi specification: {}", err))?;
        config.binning = BinningScheme {
            scheme: bins::Scheme::Interval {
                thetas,
                theta_spacings,
                phis,
                phi_spacings,
            },
        };
    }

    Ok(())
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the FIELDPROJ_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("FIELDPROJ_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("Failed to get current executable path")?;
    let mut current_dir = exe_path
        .parent()
        .context("Failed to get executable directory")?
        .to_path_buf();
    loop {
        if current_dir.join("config").is_dir() {
            return Ok(current_dir);
        }
        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => bail!("Could not find project root directory"),
        }
    }
}

pub fn validate_config(config: &Settings) -> Result<()> {
    if !(config.wavelength > 0.0) {
        bail!("Wavelength must be greater than 0");
    }
    if config.medium_refr_index.re <= 0.0 {
        bail!("Medium refractive index must have a positive real part");
    }
    if config.aperture_size.iter().any(|&s| !(s >= 0.0)) {
        bail!("Aperture size must be non-negative");
    }
    if config.aperture_cells.iter().any(|&n| n == 0) {
        bail!("Aperture must have at least one cell along each axis");
    }
    if let Some(distance) = config.proj_distance {
        if !(distance > 0.0) {
            bail!("Projection distance must be greater than 0");
        }
    }
    if !config.far_field_approx && config.proj_distance.is_none() {
        bail!("Exact projection requires a projection distance");
    }
    if let Some(ppw) = config.pts_per_wavelength {
        if !(ppw > 0.0) {
            bail!("Points per wavelength must be greater than 0");
        }
    }
    if let Profile::Gaussian { waist } = config.profile {
        if !(waist > 0.0) {
            bail!("Gaussian waist must be greater than 0");
        }
    }
    config.binning.validate()?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "fieldproj - near-to-far-field projection of planar aperture fields")]
pub struct CliArgs {
    /// Vacuum wavelength in micrometres.
    #[arg(short, long)]
    w: Option<f64>,

    /// The refractive index of the background medium.
    #[arg(long)]
    ri0: Option<Complex64>,

    /// Projection distance from the aperture centre, in micrometres.
    #[arg(short, long)]
    distance: Option<f64>,

    /// Evaluate the exact radiation integral instead of the far-field approximation.
    /// Requires a projection distance.
    #[arg(long)]
    exact: bool,

    /// Resample the aperture currents to this many points per wavelength before projecting.
    #[arg(long)]
    ppw: Option<f64>,

    /// Use a Gaussian aperture profile with this waist, in micrometres.
    #[arg(long)]
    waist: Option<f64>,

    /// Output directory.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Use a simple angular grid with the specified numbers of theta and phi points.
    #[arg(long, num_args = 2, value_delimiter = ' ', group = "binning")]
    simple: Option<Vec<usize>>,

    /// Use a direction-cosine grid with the specified numbers of ux and uy points.
    #[arg(long, num_args = 2, value_delimiter = ' ', group = "binning")]
    kspace: Option<Vec<usize>>,

    /// Use an interval angular grid with specified intervals for theta and phi in degrees.
    #[arg(long, group = "binning")]
    interval: bool,

    /// Theta angles for interval binning (must be used with --interval)
    /// Format: start step1 mid1 step2 mid2 ... stepN end
    #[arg(long, requires = "interval", num_args = 3.., value_delimiter = ' ')]
    theta: Option<Vec<f64>>,

    /// Phi angles for interval binning (must be used with --interval)
    /// Format: start step1 mid1 step2 mid2 ... stepN end
    #[arg(long, requires = "interval", num_args = 3.., value_delimiter = ' ')]
    phi: Option<Vec<f64>>,
}

/// Parse interval specification in the format:
/// start step1 mid1 step2 mid2 ... stepN end
/// This returns two vectors:
/// 1. positions: [start, mid1, mid2, ..., end]
/// 2. spacings: [step1, step2, ..., stepN]
fn parse_interval_specification(values: &[f64]) -> Result<(Vec<f64>, Vec<f64>), String> {
    if values.len() < 3 {
        return Err(format!(
            "Insufficient values for interval specification: need at least 3, got {}",
            values.len()
        ));
    }
    if values.len() % 2 == 0 {
        return Err("Interval specification must have an odd number of values".to_string());
    }

    let mut positions = vec![values[0]];
    let mut spacings = Vec::new();

    for pair in values[1..].chunks_exact(2) {
        let (step, pos) = (pair[0], pair[1]);
        if step <= 0.0 {
            return Err(format!("Step size must be positive. Got {}", step));
        }
        let last = positions[positions.len() - 1];
        if pos < last {
            return Err(format!(
                "Positions must be monotonically increasing. Got {} after {}",
                pos, last
            ));
        }
        spacings.push(step);
        positions.push(pos);
    }

    Ok((positions, spacings))
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Wavelength: {:.6}
  - Medium Refractive Index: {:.6} + {:.6}i
  - Aperture: {:?} um, {:?} cells, normal {}{}
  - Profile: {:?}
  - Projection Distance: {:?}
  - Far-Field Approximation: {}
  - Points per Wavelength: {:?}
  ",
            self.wavelength,
            self.medium_refr_index.re,
            self.medium_refr_index.im,
            self.aperture_size,
            self.aperture_cells,
            self.normal_dir,
            self.normal_axis,
            self.profile,
            self.proj_distance,
            self.far_field_approx,
            self.pts_per_wavelength,
        )
    }
}
