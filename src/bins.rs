//! Observation grids described in configuration terms.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{FieldProjError, Result};
use crate::grid::Axis;
use crate::monitor::{AngleGrid, CartesianGrid, Direction, KSpaceGrid, ProjectionGrid};


/// How the far field is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scheme {
    /// Uniform polar and azimuthal sampling of the whole sphere.
    Simple { num_theta: usize, num_phi: usize },
    /// Piecewise-uniform angles. `thetas` and `phis` are knots in degrees and each
    /// spacing applies between consecutive knots.
    Interval {
        thetas: Vec<f64>,
        theta_spacings: Vec<f64>,
        phis: Vec<f64>,
        phi_spacings: Vec<f64>,
    },
    /// Uniform direction cosines in `[-max_u, max_u]` on the hemisphere the aperture faces.
    KSpace {
        num_ux: usize,
        num_uy: usize,
        max_u: f64,
    },
    /// Points on a square plane parallel to the aperture at the projection distance.
    Cartesian {
        num_1: usize,
        num_2: usize,
        half_width: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinningScheme {
    pub scheme: Scheme,
}

/// Expand interval knots and spacings into a sorted list of angles.
pub fn interval_angles(knots: &[f64], spacings: &[f64]) -> Vec<f64> {
    let mut angles = Vec::new();
    for (window, &step) in knots.windows(2).zip(spacings) {
        let (start, end) = (window[0], window[1]);
        let num = ((end - start) / step).ceil() as usize;
        angles.extend((0..num).map(|i| start + i as f64 * step).filter(|&a| a < end));
    }
    if let Some(&last) = knots.last() {
        angles.push(last);
    }
    angles
}

/// Knots must be finite and strictly increasing, with one positive spacing per interval.
fn check_intervals(name: &str, knots: &[f64], spacings: &[f64]) -> Result<()> {
    if knots.len() < 2 || spacings.len() != knots.len() - 1 {
        return Err(FieldProjError::setup(format!(
            "Interval {name} need at least two knots and one spacing per interval, got {} knots and {} spacings.",
            knots.len(),
            spacings.len()
        )));
    }
    if let Some(&step) = spacings.iter().find(|&&s| !(s.is_finite() && s > 0.0)) {
        return Err(FieldProjError::setup(format!(
            "Interval {name} spacings must be finite and positive, got {step}."
        )));
    }
    if knots.iter().any(|k| !k.is_finite()) || knots.windows(2).any(|w| w[1] <= w[0]) {
        return Err(FieldProjError::setup(format!(
            "Interval {name} knots must be finite and strictly increasing, got {knots:?}."
        )));
    }
    Ok(())
}

impl BinningScheme {
    pub fn validate(&self) -> Result<()> {
        match &self.scheme {
            Scheme::Interval {
                thetas,
                theta_spacings,
                phis,
                phi_spacings,
            } => {
                check_intervals("thetas", thetas, theta_spacings)?;
                check_intervals("phis", phis, phi_spacings)
            }
            _ => Ok(()),
        }
    }

    /// The observation grid for an aperture facing `direction` along `normal_axis`.
    pub fn to_grid(
        &self,
        normal_axis: Axis,
        direction: Direction,
        proj_distance: Option<f64>,
    ) -> Result<ProjectionGrid> {
        self.validate()?;
        let grid = match &self.scheme {
            Scheme::Simple { num_theta, num_phi } => ProjectionGrid::Angle(AngleGrid {
                theta: Array1::linspace(0.0, std::f64::consts::PI, *num_theta),
                phi: Array1::linspace(0.0, 2.0 * std::f64::consts::PI, *num_phi),
                proj_distance,
            }),
            Scheme::Interval {
                thetas,
                theta_spacings,
                phis,
                phi_spacings,
            } => ProjectionGrid::Angle(AngleGrid {
                theta: interval_angles(thetas, theta_spacings)
                    .into_iter()
                    .map(f64::to_radians)
                    .collect(),
                phi: interval_angles(phis, phi_spacings)
                    .into_iter()
                    .map(f64::to_radians)
                    .collect(),
                proj_distance,
            }),
            Scheme::KSpace {
                num_ux,
                num_uy,
                max_u,
            } => ProjectionGrid::KSpace(KSpaceGrid {
                proj_axis: normal_axis,
                direction,
                ux: Array1::linspace(-max_u, *max_u, *num_ux),
                uy: Array1::linspace(-max_u, *max_u, *num_uy),
                proj_distance,
            }),
            Scheme::Cartesian {
                num_1,
                num_2,
                half_width,
            } => {
                let distance = proj_distance.ok_or_else(|| {
                    FieldProjError::setup("A Cartesian observation grid needs a projection distance.")
                })?;
                ProjectionGrid::Cartesian(CartesianGrid {
                    proj_axis: normal_axis,
                    coord1: Array1::linspace(-half_width, *half_width, *num_1),
                    coord2: Array1::linspace(-half_width, *half_width, *num_2),
                    proj_distance: direction.sign() * distance,
                })
            }
        };
        Ok(grid)
    }
}
