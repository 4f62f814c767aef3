//! Demonstration problem: a planar aperture radiating into a homogeneous medium.
//!
//! The aperture carries a plane wave travelling along its normal, with either a uniform or
//! a Gaussian amplitude profile. Its tangential fields are recorded on a colocated plane
//! monitor and projected onto the observation grid described by the settings.

use std::fs;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use ndarray::Array1;
use num_complex::Complex64;
use tracing::info;

use crate::dataset::{FieldDataset, MonitorBox};
use crate::field::{FieldComponent, FieldKind, ScalarField, SpectralAxis};
use crate::grid::{pop_axis, unpop_axis, Axis, Grid};
use crate::medium::Medium;
use crate::monitor::{ProjectionMonitor, ProjectionSurface};
use crate::output;
use crate::projected::ProjectedFieldData;
use crate::projection::{FieldProjector, NearFieldSurface};
use crate::result::Results;
use crate::settings::{Profile, Settings};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::{BinningScheme, Scheme};
    use crate::monitor::Direction;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn settings() -> Settings {
        Settings {
            wavelength: 1.0,
            medium_refr_index: Complex64::new(1.0, 0.0),
            aperture_size: [2.0, 2.0],
            aperture_cells: [20, 20],
            normal_axis: Axis::Z,
            normal_dir: Direction::Plus,
            profile: Profile::Uniform,
            binning: BinningScheme {
                scheme: Scheme::Simple {
                    num_theta: 91,
                    num_phi: 73,
                },
            },
            proj_distance: Some(1e4),
            far_field_approx: true,
            pts_per_wavelength: None,
            directory: PathBuf::from("fieldproj_test_run"),
        }
    }

    #[test]
    fn aperture_flux_matches_plane_wave() {
        let settings = settings();
        let aperture = aperture_fields(&settings).unwrap();
        let eta = Medium::vacuum().eta().re;
        assert_relative_eq!(aperture.flux().unwrap()[[0, 0]], 0.5 / eta * 4.0, epsilon = 1e-12);
    }

    #[test]
    fn aperture_propagates_along_each_normal() {
        for axis in Axis::ALL {
            for direction in [Direction::Plus, Direction::Minus] {
                let mut settings = settings();
                settings.normal_axis = axis;
                settings.normal_dir = direction;
                let flux = aperture_fields(&settings).unwrap().flux().unwrap()[[0, 0]];
                assert!(flux * direction.sign() > 0.0, "{}{}", direction, axis);
            }
        }
    }

    #[test]
    fn radiated_power_balances_aperture_flux() {
        let mut problem = Problem::new(settings()).unwrap();
        problem.solve().unwrap();
        let results = problem.result.as_ref().unwrap();
        let powers = results.powers.unwrap();
        let ratio = powers.diffracted / powers.input;
        assert!((0.85..1.15).contains(&ratio), "ratio: {}", ratio);
        // broadside peak
        assert_relative_eq!(results.peak_direction[0], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn line_aperture_is_two_dimensional() {
        let mut settings = settings();
        settings.aperture_size = [2.0, 0.0];
        let mut problem = Problem::new(settings).unwrap();
        problem.solve().unwrap();
        assert!(problem.projected.as_ref().unwrap().is_2d);
    }

    #[test]
    fn writeup_needs_a_solution() {
        let problem = Problem::new(settings()).unwrap();
        assert!(problem.writeup().is_err());
    }
}

/// Build the recorded tangential fields of the aperture described by `settings`.
///
/// In-plane axes with a positive size are sampled with `aperture_cells + 1` points from
/// edge to edge. An axis with zero size is collapsed to a single sample, which makes the
/// problem two-dimensional.
pub fn aperture_fields(settings: &Settings) -> crate::error::Result<FieldDataset> {
    let normal = settings.normal_axis;
    let medium = Medium::new(settings.medium_refr_index);
    let frequency = settings.frequency();

    let steps: [Option<f64>; 2] = [0, 1].map(|i| {
        let size = settings.aperture_size[i];
        (size > 0.0).then(|| size / settings.aperture_cells[i] as f64)
    });
    let thickness = steps
        .iter()
        .flatten()
        .copied()
        .fold(settings.wavelength / 10.0, f64::min);

    let mut min = [0.0; 2];
    let mut max = [0.0; 2];
    let mut cells = [1; 2];
    let mut size = [f64::INFINITY; 2];
    for i in 0..2 {
        match steps[i] {
            Some(h) => {
                let half = settings.aperture_size[i] / 2.0;
                min[i] = -half;
                max[i] = half + h;
                cells[i] = settings.aperture_cells[i] + 1;
                size[i] = settings.aperture_size[i];
            }
            None => {
                min[i] = -0.5;
                max[i] = 0.5;
            }
        }
    }
    let grid = Grid::uniform(
        unpop_axis(-thickness / 2.0, min, normal),
        unpop_axis(thickness / 2.0, max, normal),
        unpop_axis(1, cells, normal),
    )?;
    let monitor = MonitorBox::new([0.0; 3], unpop_axis(0.0, size, normal)).colocated();

    let mut coords = grid.colocated_coords();
    coords[normal.index()] = Array1::from(vec![0.0]);
    for (i, axis) in normal.plane().into_iter().enumerate() {
        if steps[i].is_none() {
            coords[axis.index()] = Array1::from(vec![0.0]);
        }
    }

    let profile = settings.profile;
    let amplitude = move |position: [f64; 3]| -> Complex64 {
        let (_, [a, b]) = pop_axis(position, normal);
        match profile {
            Profile::Uniform => Complex64::new(1.0, 0.0),
            Profile::Gaussian { waist } => Complex64::new((-(a * a + b * b) / (waist * waist)).exp(), 0.0),
        }
    };
    // E along the first in-plane axis, H along the second, with S = E x H along the normal
    let handedness = if normal == Axis::Y { -1.0 } else { 1.0 };
    let h_scale = settings.normal_dir.sign() * handedness / medium.eta();

    let [t1, t2] = normal.plane();
    let field = |scale: Complex64| {
        ScalarField::from_fn(coords.clone(), 1, 1, move |position, _, _| amplitude(position) * scale)
    };
    let zero = Complex64::default();
    FieldDataset::new(
        monitor,
        grid,
        SpectralAxis::Frequency(Array1::from(vec![frequency])),
        [
            (FieldComponent::new(FieldKind::E, t1), field(Complex64::new(1.0, 0.0))),
            (FieldComponent::new(FieldKind::E, t2), field(zero)),
            (FieldComponent::new(FieldKind::H, t1), field(zero)),
            (FieldComponent::new(FieldKind::H, t2), field(h_scale)),
        ],
    )
}

/// A solvable aperture projection.
#[derive(Debug, Clone)]
pub struct Problem {
    pub settings: Settings,
    pub medium: Medium,
    pub aperture: FieldDataset,
    pub projected: Option<ProjectedFieldData>,
    pub result: Option<Results>,
}

impl Problem {
    pub fn new(settings: Settings) -> Result<Self> {
        let aperture = aperture_fields(&settings).context("Failed to build aperture fields")?;
        Ok(Self {
            medium: Medium::new(settings.medium_refr_index),
            settings,
            aperture,
            projected: None,
            result: None,
        })
    }

    /// The projection monitor around the aperture, with the observation grid from the settings.
    pub fn monitor(&self) -> crate::error::Result<ProjectionMonitor> {
        let grid = self.settings.binning.to_grid(
            self.settings.normal_axis,
            self.settings.normal_dir,
            self.settings.proj_distance,
        )?;
        let mut monitor = ProjectionMonitor::new(self.aperture.monitor.center, self.aperture.monitor.size, grid)
            .with_normal_dir(self.settings.normal_dir);
        if !self.settings.far_field_approx {
            monitor = monitor.exact();
        }
        if let Some(ppw) = self.settings.pts_per_wavelength {
            monitor = monitor.with_pts_per_wavelength(ppw);
        }
        Ok(monitor)
    }

    pub fn projector(&self) -> FieldProjector {
        FieldProjector::new(
            vec![NearFieldSurface::new(
                self.aperture.clone(),
                ProjectionSurface::new(self.settings.normal_axis, self.settings.normal_dir),
            )],
            self.medium,
        )
    }

    /// Project the aperture fields and summarise the result.
    pub fn solve(&mut self) -> Result<()> {
        let monitor = self.monitor()?;
        let projector = self.projector();
        let warnings: Vec<String> = projector
            .warnings(&monitor)?
            .iter()
            .map(ToString::to_string)
            .collect();

        info!("Projecting aperture onto {} grid...", monitor.grid.name());
        let start = Instant::now();
        let projected = projector.project(&monitor)?;
        info!("Projection took {:.2?}", start.elapsed());

        let input = self.settings.normal_dir.sign() * self.aperture.flux()?[[0, 0]];
        let radiated = output::radiated_power(&projected).map(|p| p[0]);
        let result = Results::new(&projected, self.settings.wavelength, input, radiated, warnings);
        info!("Results:\n{}", result);

        self.projected = Some(projected);
        self.result = Some(result);
        Ok(())
    }

    /// Write the power grid, the JSON summary and the resolved settings to the output directory.
    pub fn writeup(&self) -> Result<()> {
        let (Some(projected), Some(result)) = (&self.projected, &self.result) else {
            bail!("Problem has not been solved yet");
        };
        let dir = &self.settings.directory;
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        output::write_power_grid(&dir.join("power_grid"), projected)?;
        output::write_summary(&dir.join("summary.json"), result)?;
        output::write_settings(&dir.join("settings.toml"), &self.settings)?;
        info!("Results written to {}", dir.display());
        Ok(())
    }
}
