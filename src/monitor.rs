//! Observation grids and the projection monitor that owns them.
//!
//! Projected fields can be requested on four kinds of grid:
//! - angles `(theta, phi)` at an optional fixed radius
//! - a Cartesian plane at a fixed offset along a projection axis
//! - direction cosines `(ux, uy)` at an optional fixed radius
//! - the discrete reciprocal directions of a periodic aperture (see [`crate::diffraction`])
//!
//! All of them describe their points through [`ObservationGrid`], which is the only
//! interface the projector uses.

use ndarray::{Array1, Array3};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coords::{car_2_sph, kspace_2_sph, sph_2_car, sph_2_kspace};
use crate::dataset::MonitorBox;
use crate::diffraction::DiffractionGrid;
use crate::error::{FieldProjError, Result};
use crate::grid::{pop_axis, unpop_axis, Axis};
use crate::medium::Medium;
use crate::projected::propagation_factor;


/// Sign of an outward surface normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "-")]
    Minus,
    #[serde(rename = "+")]
    Plus,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Plus => 1.0,
            Direction::Minus => -1.0,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Direction::Plus => Direction::Minus,
            Direction::Minus => Direction::Plus,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Plus => write!(f, "+"),
            Direction::Minus => write!(f, "-"),
        }
    }
}

/// An observation point relative to the projection origin. `r` is `None` when only the
/// angular dependence is wanted. Directions that do not exist carry NaN angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalPoint {
    pub r: Option<f64>,
    pub theta: f64,
    pub phi: f64,
}

impl SphericalPoint {
    pub fn is_valid(&self) -> bool {
        self.theta.is_finite() && self.phi.is_finite()
    }
}

/// A set of far-field observation points arranged on a 3D index grid.
pub trait ObservationGrid {
    fn shape(&self) -> [usize; 3];

    /// Every grid point as a spherical point relative to the projection origin.
    fn coordinates_to_spherical(&self, frequency: f64, medium: &Medium) -> Array3<SphericalPoint>;

    /// Coordinates reported for a point in this grid's own parameterization.
    fn spherical_to_output_coords(&self, point: &SphericalPoint) -> [f64; 3];

    fn proj_distance(&self) -> Option<f64>;

    /// Whether projected fields can be moved to another distance by rescaling.
    fn renormalizable(&self) -> bool {
        true
    }

    /// Scale factor applied to the radiation-vector combination at distance `dist`.
    fn propagation_factor(&self, dist: Option<f64>, k: Complex64, is_2d: bool) -> Complex64 {
        propagation_factor(dist, k, is_2d)
    }
}

/// Polar and azimuthal angles, in radians.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleGrid {
    pub theta: Array1<f64>,
    pub phi: Array1<f64>,
    pub proj_distance: Option<f64>,
}

impl ObservationGrid for AngleGrid {
    fn shape(&self) -> [usize; 3] {
        [1, self.theta.len(), self.phi.len()]
    }

    fn coordinates_to_spherical(&self, _frequency: f64, _medium: &Medium) -> Array3<SphericalPoint> {
        Array3::from_shape_fn((1, self.theta.len(), self.phi.len()), |(_, i, j)| SphericalPoint {
            r: self.proj_distance,
            theta: self.theta[i],
            phi: self.phi[j],
        })
    }

    fn spherical_to_output_coords(&self, point: &SphericalPoint) -> [f64; 3] {
        [point.r.unwrap_or(f64::NAN), point.theta, point.phi]
    }

    fn proj_distance(&self) -> Option<f64> {
        self.proj_distance
    }
}

/// Points on a plane normal to `proj_axis`, `proj_distance` from the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct CartesianGrid {
    pub proj_axis: Axis,
    /// Coordinates along the first and second in-plane axes of `proj_axis`.
    pub coord1: Array1<f64>,
    pub coord2: Array1<f64>,
    pub proj_distance: f64,
}

impl ObservationGrid for CartesianGrid {
    fn shape(&self) -> [usize; 3] {
        unpop_axis(1, [self.coord1.len(), self.coord2.len()], self.proj_axis)
    }

    fn coordinates_to_spherical(&self, _frequency: f64, _medium: &Medium) -> Array3<SphericalPoint> {
        let [n0, n1, n2] = self.shape();
        Array3::from_shape_fn((n0, n1, n2), |(i, j, k)| {
            let (_, [a, b]) = pop_axis([i, j, k], self.proj_axis);
            let [x, y, z] = unpop_axis(
                self.proj_distance,
                [self.coord1[a], self.coord2[b]],
                self.proj_axis,
            );
            let (r, theta, phi) = car_2_sph(x, y, z);
            SphericalPoint {
                r: Some(r),
                theta,
                phi,
            }
        })
    }

    fn spherical_to_output_coords(&self, point: &SphericalPoint) -> [f64; 3] {
        let (x, y, z) = sph_2_car(point.r.unwrap_or(0.0), point.theta, point.phi);
        [x, y, z]
    }

    fn proj_distance(&self) -> Option<f64> {
        Some(self.proj_distance)
    }
}

/// Direction cosines along the in-plane axes of `proj_axis`, on the hemisphere given by
/// `direction`.
#[derive(Debug, Clone, PartialEq)]
pub struct KSpaceGrid {
    pub proj_axis: Axis,
    pub direction: Direction,
    pub ux: Array1<f64>,
    pub uy: Array1<f64>,
    pub proj_distance: Option<f64>,
}

impl ObservationGrid for KSpaceGrid {
    fn shape(&self) -> [usize; 3] {
        [self.ux.len(), self.uy.len(), 1]
    }

    fn coordinates_to_spherical(&self, _frequency: f64, _medium: &Medium) -> Array3<SphericalPoint> {
        Array3::from_shape_fn((self.ux.len(), self.uy.len(), 1), |(i, j, _)| {
            let (theta, phi) =
                kspace_2_sph(self.ux[i], self.uy[j], self.proj_axis, self.direction.sign());
            SphericalPoint {
                r: self.proj_distance,
                theta,
                phi,
            }
        })
    }

    fn spherical_to_output_coords(&self, point: &SphericalPoint) -> [f64; 3] {
        let (ux, uy) = sph_2_kspace(point.theta, point.phi, self.proj_axis);
        [ux, uy, point.r.unwrap_or(f64::NAN)]
    }

    fn proj_distance(&self) -> Option<f64> {
        self.proj_distance
    }
}

/// The observation grid of a projection, one variant per parameterization.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionGrid {
    Angle(AngleGrid),
    Cartesian(CartesianGrid),
    KSpace(KSpaceGrid),
    Diffraction(DiffractionGrid),
}

impl ProjectionGrid {
    fn inner(&self) -> &dyn ObservationGrid {
        match self {
            ProjectionGrid::Angle(grid) => grid,
            ProjectionGrid::Cartesian(grid) => grid,
            ProjectionGrid::KSpace(grid) => grid,
            ProjectionGrid::Diffraction(grid) => grid,
        }
    }

    /// Same grid observed at a different distance.
    pub fn with_proj_distance(&self, proj_distance: f64) -> Result<Self> {
        let mut grid = self.clone();
        match &mut grid {
            ProjectionGrid::Angle(g) => g.proj_distance = Some(proj_distance),
            ProjectionGrid::Cartesian(g) => g.proj_distance = proj_distance,
            ProjectionGrid::KSpace(g) => g.proj_distance = Some(proj_distance),
            ProjectionGrid::Diffraction(_) => {
                return Err(FieldProjError::setup(
                    "diffraction orders have no projection distance",
                ))
            }
        }
        Ok(grid)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProjectionGrid::Angle(_) => "angle",
            ProjectionGrid::Cartesian(_) => "cartesian",
            ProjectionGrid::KSpace(_) => "kspace",
            ProjectionGrid::Diffraction(_) => "diffraction",
        }
    }
}

impl ObservationGrid for ProjectionGrid {
    fn shape(&self) -> [usize; 3] {
        self.inner().shape()
    }

    fn coordinates_to_spherical(&self, frequency: f64, medium: &Medium) -> Array3<SphericalPoint> {
        self.inner().coordinates_to_spherical(frequency, medium)
    }

    fn spherical_to_output_coords(&self, point: &SphericalPoint) -> [f64; 3] {
        self.inner().spherical_to_output_coords(point)
    }

    fn proj_distance(&self) -> Option<f64> {
        self.inner().proj_distance()
    }

    fn renormalizable(&self) -> bool {
        self.inner().renormalizable()
    }

    fn propagation_factor(&self, dist: Option<f64>, k: Complex64, is_2d: bool) -> Complex64 {
        self.inner().propagation_factor(dist, k, is_2d)
    }
}

/// One planar face of a near-field recording region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionSurface {
    pub axis: Axis,
    pub direction: Direction,
    pub excluded: bool,
}

impl ProjectionSurface {
    pub fn new(axis: Axis, direction: Direction) -> Self {
        Self {
            axis,
            direction,
            excluded: false,
        }
    }
}

/// Where near fields were recorded and what to project them onto.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionMonitor {
    pub center: [f64; 3],
    pub size: [f64; 3],
    pub grid: ProjectionGrid,
    pub far_field_approx: bool,
    /// Projection origin; the monitor center when unset. Source positions are taken
    /// relative to it, so it sets the phase reference of the projected fields.
    pub custom_origin: Option<[f64; 3]>,
    /// Outward normal of a planar monitor. A recorded surface on the monitor's normal
    /// axis facing the other way has its currents flipped. Ignored for box monitors.
    pub normal_dir: Direction,
    pub exclude_surfaces: Vec<(Axis, Direction)>,
    pub pts_per_wavelength: Option<f64>,
}

impl ProjectionMonitor {
    pub fn new(center: [f64; 3], size: [f64; 3], grid: ProjectionGrid) -> Self {
        Self {
            center,
            size,
            grid,
            far_field_approx: true,
            custom_origin: None,
            normal_dir: Direction::Plus,
            exclude_surfaces: Vec::new(),
            pts_per_wavelength: None,
        }
    }

    pub fn exact(mut self) -> Self {
        self.far_field_approx = false;
        self
    }

    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.custom_origin = Some(origin);
        self
    }

    pub fn with_normal_dir(mut self, direction: Direction) -> Self {
        self.normal_dir = direction;
        self
    }

    pub fn excluding(mut self, axis: Axis, direction: Direction) -> Self {
        self.exclude_surfaces.push((axis, direction));
        self
    }

    pub fn with_pts_per_wavelength(mut self, pts_per_wavelength: f64) -> Self {
        self.pts_per_wavelength = Some(pts_per_wavelength);
        self
    }

    pub fn local_origin(&self) -> [f64; 3] {
        self.custom_origin.unwrap_or(self.center)
    }

    /// Faces of the monitor that carry near-field data. A planar monitor has one face
    /// facing `normal_dir`; a box has six, with excluded ones flagged.
    pub fn projection_surfaces(&self) -> Result<Vec<ProjectionSurface>> {
        let bounds = MonitorBox::new(self.center, self.size);
        match bounds.zero_dims().as_slice() {
            [] => Ok(Axis::ALL
                .into_iter()
                .flat_map(|axis| {
                    [Direction::Minus, Direction::Plus].map(|direction| ProjectionSurface {
                        axis,
                        direction,
                        excluded: self.exclude_surfaces.contains(&(axis, direction)),
                    })
                })
                .collect()),
            [normal] => Ok(vec![ProjectionSurface::new(*normal, self.normal_dir)]),
            _ => Err(FieldProjError::setup(
                "projection monitor must be planar or a box with non-zero volume",
            )),
        }
    }

    /// Geometry of one face of the monitor.
    pub fn surface_box(&self, surface: &ProjectionSurface) -> MonitorBox {
        let i = surface.axis.index();
        let mut center = self.center;
        let mut size = self.size;
        center[i] += surface.direction.sign() * size[i] / 2.0;
        size[i] = 0.0;
        MonitorBox::new(center, size)
    }
}
