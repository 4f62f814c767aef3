//! Near-to-far-field projection of recorded surface fields.
//!
//! The recorded tangential fields on each enabled surface are replaced by equivalent
//! surface currents `J = n x H` and `M = -n x E`, which are then radiated into the
//! background medium. Two kernels are available:
//! - the far-field approximation, where the radiation vectors `N` and `L` are formed once
//!   per direction and scaled by a scalar propagation factor
//! - the exact kernel, summing the full free-space Green's function over every source and
//!   observation point pair
//!
//! Frequencies are independent and are projected in parallel.

use std::f64::consts::PI;
use std::fmt;
use std::time::Instant;

use nalgebra::Vector3;
use ndarray::{s, Array1, Array2, Array3, Array4};
use num_complex::Complex64;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::coords::{car_2_sph_field, phi_unit, radial_unit, theta_unit};
use crate::dataset::{FieldDataset, MonitorBox};
use crate::error::{FieldProjError, Result};
use crate::field::{stencil, Stencil};
use crate::grid::{unpop_axis, Axis};
use crate::medium::Medium;
use crate::monitor::{ObservationGrid, ProjectionMonitor, ProjectionSurface, SphericalPoint};
use crate::projected::{trapezoid_weights, FieldSet, ProjectedFieldData};
use crate::settings::{EXACT_DISTANCE_RATIO, FAR_FIELD_DISTANCE_RATIO};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldComponent, ScalarField, SpectralAxis};
    use crate::grid::Grid;
    use crate::monitor::{AngleGrid, Direction, ProjectionGrid};
    use approx::assert_relative_eq;

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    /// Uniform tangential fields on a unit square normal to z at the origin.
    fn unit_square(e: [f64; 2], h: [f64; 2]) -> FieldDataset {
        let grid = Grid::uniform([-0.5, -0.5, -0.05], [0.6, 0.6, 0.05], [11, 11, 1]).unwrap();
        let monitor = MonitorBox::new([0.0; 3], [1.0, 1.0, 0.0]).colocated();
        let mut coords = grid.colocated_coords();
        coords[2] = Array1::from(vec![0.0]);
        let spectral = SpectralAxis::Frequency(Array1::from(vec![3e14]));
        let field = |v: f64| ScalarField::from_fn(coords.clone(), 1, 1, move |_, _, _| c(v));
        FieldDataset::new(
            monitor,
            grid.clone(),
            spectral,
            [
                (FieldComponent::Ex, field(e[0])),
                (FieldComponent::Ey, field(e[1])),
                (FieldComponent::Hx, field(h[0])),
                (FieldComponent::Hy, field(h[1])),
            ],
        )
        .unwrap()
    }

    fn on_axis(distance: Option<f64>) -> ProjectionMonitor {
        let grid = ProjectionGrid::Angle(AngleGrid {
            theta: Array1::from(vec![0.0]),
            phi: Array1::from(vec![0.0]),
            proj_distance: distance,
        });
        ProjectionMonitor::new([0.0; 3], [1.0, 1.0, 0.0], grid)
    }

    #[test]
    fn radiation_vectors_of_unit_square() {
        let data = unit_square([1.0, 1.0], [1.0, 1.0]);
        let projector = FieldProjector::new(
            vec![NearFieldSurface::new(data, ProjectionSurface::new(Axis::Z, Direction::Plus))],
            Medium::vacuum(),
        );
        let projected = projector.project(&on_axis(None)).unwrap();
        let eta = Medium::vacuum().eta();
        // N = (-1, 1, 0), L = (1, -1, 0) with no propagation factor
        assert_relative_eq!((projected.fields.e[1][[0, 0, 0, 0]] - (1.0 + eta)).norm(), 0.0, epsilon = 1e-9);
        assert_relative_eq!((projected.fields.e[2][[0, 0, 0, 0]] - (1.0 - eta)).norm(), 0.0, epsilon = 1e-9);
        assert_relative_eq!((projected.fields.h[1][[0, 0, 0, 0]] - (1.0 - 1.0 / eta)).norm(), 0.0, epsilon = 1e-9);
        assert_relative_eq!((projected.fields.h[2][[0, 0, 0, 0]] - (1.0 + 1.0 / eta)).norm(), 0.0, epsilon = 1e-9);
        assert_eq!(projected.fields.e[0][[0, 0, 0, 0]], Complex64::default());
        assert!(!projected.is_2d);
    }

    #[test]
    fn flipped_normal_negates_fields() {
        let data = unit_square([1.0, 0.0], [0.0, 1.0]);
        let plus = FieldProjector::new(
            vec![NearFieldSurface::new(data.clone(), ProjectionSurface::new(Axis::Z, Direction::Plus))],
            Medium::vacuum(),
        );
        let minus = FieldProjector::new(
            vec![NearFieldSurface::new(data, ProjectionSurface::new(Axis::Z, Direction::Minus))],
            Medium::vacuum(),
        );
        let monitor = on_axis(Some(1e4));
        let a = plus.project(&monitor).unwrap();
        let b = minus.project(&monitor.clone().with_normal_dir(Direction::Minus)).unwrap();
        for n in 0..3 {
            for (x, y) in a.fields.e[n].iter().zip(b.fields.e[n].iter()) {
                assert_relative_eq!((x + y).norm(), 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn planar_monitor_normal_orients_its_surface() {
        let data = unit_square([1.0, 0.0], [0.0, 1.0]);
        let project = |surface_dir: Direction, monitor_dir: Direction| {
            FieldProjector::new(
                vec![NearFieldSurface::new(data.clone(), ProjectionSurface::new(Axis::Z, surface_dir))],
                Medium::vacuum(),
            )
            .project(&on_axis(Some(1e4)).with_normal_dir(monitor_dir))
            .unwrap()
        };
        let outward = project(Direction::Plus, Direction::Plus);
        let disagreeing = project(Direction::Plus, Direction::Minus);
        let inward = project(Direction::Minus, Direction::Minus);
        // the declared normal wins over the surface direction
        assert_eq!(disagreeing, inward);
        for (x, y) in outward.fields.e[1].iter().zip(disagreeing.fields.e[1].iter()) {
            assert_relative_eq!((x + y).norm(), 0.0, epsilon = 1e-12);
        }

        // a surface along another axis keeps its own direction
        let surface = ProjectionSurface::new(Axis::X, Direction::Plus);
        let monitor = on_axis(None).with_normal_dir(Direction::Minus);
        assert_eq!(FieldProjector::orientation(&monitor, &surface), 1.0);
    }

    #[test]
    fn origin_sets_the_phase_reference() {
        let data = unit_square([1.0, 0.0], [0.0, 1.0]);
        let projector = FieldProjector::new(
            vec![NearFieldSurface::new(data, ProjectionSurface::new(Axis::Z, Direction::Plus))],
            Medium::vacuum(),
        );
        let mut centered = on_axis(None);
        if let ProjectionGrid::Angle(grid) = &mut centered.grid {
            grid.theta = Array1::from(vec![0.4]);
        }
        let shifted = centered.clone().with_origin([0.3, 0.0, 0.0]);
        let a = projector.project(&centered).unwrap();
        let b = projector.project(&shifted).unwrap();
        assert_eq!(b.origin, [0.3, 0.0, 0.0]);
        // same magnitude, different phase
        let (ea, eb) = (a.fields.e[1][[0, 0, 0, 0]], b.fields.e[1][[0, 0, 0, 0]]);
        assert_relative_eq!(ea.norm(), eb.norm(), max_relative = 1e-9);
        assert!((ea - eb).norm() > 1e-3 * ea.norm());
        assert_relative_eq!(a.power()[[0, 0, 0, 0]], b.power()[[0, 0, 0, 0]], max_relative = 1e-9);
    }

    #[test]
    fn excluded_and_invalid_inputs() {
        let data = unit_square([1.0, 0.0], [0.0, 1.0]);
        let mut surface = ProjectionSurface::new(Axis::Z, Direction::Plus);
        surface.excluded = true;
        let projector = FieldProjector::new(vec![NearFieldSurface::new(data.clone(), surface)], Medium::vacuum());
        assert!(matches!(projector.project(&on_axis(None)), Err(FieldProjError::Setup(_))));

        let projector = FieldProjector::new(
            vec![NearFieldSurface::new(data, ProjectionSurface::new(Axis::Z, Direction::Plus))],
            Medium::vacuum(),
        );
        // exact kernel needs a distance
        assert!(matches!(projector.project(&on_axis(None).exact()), Err(FieldProjError::Setup(_))));
    }

    #[test]
    fn exact_kernel_approaches_far_field() {
        let data = unit_square([1.0, 0.0], [0.0, 1.0 / 376.730313668]);
        let projector = FieldProjector::new(
            vec![NearFieldSurface::new(data, ProjectionSurface::new(Axis::Z, Direction::Plus))],
            Medium::vacuum(),
        );
        let monitor = on_axis(Some(2000.0));
        let approx = projector.project(&monitor).unwrap();
        let exact = projector.project(&monitor.clone().exact()).unwrap();
        let a = approx.fields.e[1][[0, 0, 0, 0]];
        let b = exact.fields.e[1][[0, 0, 0, 0]];
        assert_relative_eq!((a - b).norm() / a.norm(), 0.0, epsilon = 1e-2);
        assert!(exact.fields.e[0][[0, 0, 0, 0]].norm() < 1e-2 * b.norm());
    }

    #[test]
    fn backward_projection_is_flagged() {
        let data = unit_square([1.0, 0.0], [0.0, 1.0]);
        let projector = FieldProjector::new(
            vec![NearFieldSurface::new(data, ProjectionSurface::new(Axis::Z, Direction::Plus))],
            Medium::vacuum(),
        );
        let mut monitor = on_axis(Some(1e6));
        assert!(projector.warnings(&monitor).unwrap().is_empty());
        if let ProjectionGrid::Angle(grid) = &mut monitor.grid {
            grid.theta = Array1::from(vec![0.9 * PI]);
        }
        let warnings = projector.warnings(&monitor).unwrap();
        assert_eq!(warnings, vec![ProjectionWarning::Backward]);

        let near = on_axis(Some(2.0));
        assert!(matches!(
            projector.warnings(&near).unwrap().as_slice(),
            [ProjectionWarning::NearFieldDistance { .. }]
        ));
        assert!(matches!(
            projector.warnings(&on_axis(Some(1e5)).exact()).unwrap().as_slice(),
            [ProjectionWarning::ExactDistance { .. }]
        ));
    }

    #[test]
    fn resampling_keeps_uniform_result() {
        let data = unit_square([1.0, 0.0], [0.0, 1.0]);
        let projector = FieldProjector::new(
            vec![NearFieldSurface::new(data, ProjectionSurface::new(Axis::Z, Direction::Plus))],
            Medium::vacuum(),
        );
        let plain = projector.project(&on_axis(None)).unwrap();
        let resampled = projector
            .project(&on_axis(None).with_pts_per_wavelength(20.0))
            .unwrap();
        let a = plain.fields.e[1][[0, 0, 0, 0]];
        let b = resampled.fields.e[1][[0, 0, 0, 0]];
        assert_relative_eq!((a - b).norm() / a.norm(), 0.0, epsilon = 1e-9);
    }
}

/// Recorded near fields on one face of the projection monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct NearFieldSurface {
    pub data: FieldDataset,
    pub surface: ProjectionSurface,
}

impl NearFieldSurface {
    pub fn new(data: FieldDataset, surface: ProjectionSurface) -> Self {
        Self { data, surface }
    }
}

/// Non-fatal conditions under which projected fields may be physically meaningless or
/// needlessly expensive.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionWarning {
    /// Some observation points lie behind the only recording surface.
    Backward,
    /// Exact kernel used far beyond the near-field extent.
    ExactDistance { distance: f64, extent: f64 },
    /// Far-field approximation used closer than it is valid.
    NearFieldDistance { distance: f64, limit: f64 },
}

impl fmt::Display for ProjectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionWarning::Backward => write!(
                f,
                "Some observation points lie behind the projection surface; the projected fields there may not be physical."
            ),
            ProjectionWarning::ExactDistance { distance, extent } => write!(
                f,
                "Projecting to {distance} um with the exact kernel, far beyond the near-field extent of {extent} um. The far-field approximation is faster and just as accurate here."
            ),
            ProjectionWarning::NearFieldDistance { distance, limit } => write!(
                f,
                "Projecting to {distance} um with the far-field approximation, closer than {limit} um; consider the exact kernel."
            ),
        }
    }
}

/// Equivalent currents on one surface, at points relative to the projection origin.
struct SurfaceCurrents {
    points: Vec<Vector3<f64>>,
    weights: Vec<f64>,
    /// Indexed `(point, frequency)`.
    j: Array2<Vector3<Complex64>>,
    m: Array2<Vector3<Complex64>>,
}

impl SurfaceCurrents {
    /// `(N, L)` for direction `r_hat` at frequency index `f`.
    fn radiation_vectors(
        &self,
        r_hat: &Vector3<f64>,
        k: Complex64,
        f: usize,
    ) -> (Vector3<Complex64>, Vector3<Complex64>) {
        let mut n = Vector3::zeros();
        let mut l = Vector3::zeros();
        for (p, (point, weight)) in self.points.iter().zip(&self.weights).enumerate() {
            let phase = (-Complex64::i() * k * r_hat.dot(point)).exp() * *weight;
            n += self.j[[p, f]] * phase;
            l += self.m[[p, f]] * phase;
        }
        (n, l)
    }

    /// Cartesian `(E, H)` at `obs` from the full free-space Green's function.
    fn exact_fields(
        &self,
        obs: &Vector3<f64>,
        k: Complex64,
        eta: Complex64,
        f: usize,
    ) -> (Vector3<Complex64>, Vector3<Complex64>) {
        let ik = Complex64::i() * k;
        // i omega mu and i omega epsilon expressed through k and eta
        let iwmu = ik * eta;
        let iweps = ik / eta;

        let mut e = Vector3::zeros();
        let mut h = Vector3::zeros();
        for (p, (point, weight)) in self.points.iter().zip(&self.weights).enumerate() {
            let r_vec = obs - point;
            let r = r_vec.norm();
            if r == 0.0 {
                continue;
            }
            let r_hat = (r_vec / r).map(Complex64::from);
            let g = (ik * r).exp() / (4.0 * PI * r);
            let grad_g = r_hat * ((ik - 1.0 / r) * g);
            let kr = k * r;
            let outer = (3.0 - 3.0 * Complex64::i() * kr - kr * kr) * g / (r * r);
            let diag = (Complex64::i() * kr - 1.0) * g / (r * r);

            let j = self.j[[p, f]];
            let m = self.m[[p, f]];
            let ggj = r_hat * (r_hat.dot(&j) * outer) + j * diag;
            let ggm = r_hat * (r_hat.dot(&m) * outer) + m * diag;

            let weight = Complex64::from(*weight);
            e += ((j * g + ggj / (k * k)) * iwmu - grad_g.cross(&m)) * weight;
            h += ((m * g + ggm / (k * k)) * iweps + grad_g.cross(&j)) * weight;
        }
        (e, h)
    }
}

/// Linear resampling of `(t1, t2, spectral, mode)` samples along plane axis `axis`.
fn resample_plane(values: &Array4<Complex64>, coords: &Array1<f64>, targets: &Array1<f64>, axis: usize) -> Array4<Complex64> {
    let nd_axis = ndarray::Axis(axis);
    let mut shape = values.raw_dim();
    shape[axis] = targets.len();
    let mut out = Array4::<Complex64>::zeros(shape);
    for (t, &target) in targets.iter().enumerate() {
        let mut lane = out.index_axis_mut(nd_axis, t);
        match stencil(coords, target, false) {
            Stencil::Outside => {}
            Stencil::Single(i) => lane.assign(&values.index_axis(nd_axis, i)),
            Stencil::Pair(i, w) => {
                let below = &values.index_axis(nd_axis, i) * Complex64::from(1.0 - w);
                let above = &values.index_axis(nd_axis, i + 1) * Complex64::from(w);
                lane.assign(&(below + above));
            }
        }
    }
    out
}

/// Projects near fields recorded on one or more surfaces into a background medium.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldProjector {
    pub surfaces: Vec<NearFieldSurface>,
    pub medium: Medium,
}

impl FieldProjector {
    pub fn new(surfaces: Vec<NearFieldSurface>, medium: Medium) -> Self {
        Self { surfaces, medium }
    }

    fn enabled_surfaces(&self) -> Result<Vec<&NearFieldSurface>> {
        let enabled: Vec<_> = self.surfaces.iter().filter(|s| !s.surface.excluded).collect();
        if enabled.is_empty() {
            return Err(FieldProjError::setup(
                "At least one projection surface must be enabled.",
            ));
        }
        Ok(enabled)
    }

    /// Frequencies shared by every enabled surface.
    fn frequencies(enabled: &[&NearFieldSurface]) -> Result<Array1<f64>> {
        let first = &enabled[0].data.spectral;
        let freqs = first.frequencies()?.clone();
        for surface in enabled {
            surface.data.spectral.frequencies()?;
            if !surface.data.spectral.matches(first) {
                return Err(FieldProjError::data(
                    "All projection surfaces must share the same frequencies.",
                ));
            }
            if surface.data.num_modes() > 1 {
                return Err(FieldProjError::setup(
                    "Near fields with more than one mode cannot be projected.",
                ));
            }
        }
        Ok(freqs)
    }

    /// Sign applied to the contribution of `surface`. On a planar monitor the declared
    /// `normal_dir` is the outward normal, and a surface facing the other way is flipped.
    fn orientation(monitor: &ProjectionMonitor, surface: &ProjectionSurface) -> f64 {
        let bounds = MonitorBox::new(monitor.center, monitor.size);
        match bounds.zero_dims().as_slice() {
            [normal] if *normal == surface.axis && surface.direction != monitor.normal_dir => -1.0,
            _ => 1.0,
        }
    }

    /// A 2D simulation is one where some axis has a single sample on every surface.
    fn is_2d(enabled: &[&NearFieldSurface]) -> bool {
        Axis::ALL.into_iter().any(|axis| {
            enabled.iter().all(|s| {
                s.surface.axis != axis
                    && s.data.colocation_boundaries()[axis.index()].len() == 1
            })
        })
    }

    fn surface_currents(
        &self,
        surface: &NearFieldSurface,
        origin: [f64; 3],
        orientation: f64,
        pts_per_wavelength: Option<f64>,
        frequencies: &Array1<f64>,
    ) -> Result<SurfaceCurrents> {
        let data = &surface.data;
        let normal = data.monitor.normal_axis()?;
        if normal != surface.surface.axis {
            return Err(FieldProjError::setup(format!(
                "surface declared normal to {} but its data is normal to {}",
                surface.surface.axis, normal
            )));
        }

        let tangential = data.colocated_tangential_fields()?;
        let [mut c1, mut c2] = tangential.coords;
        let [mut e1, mut e2] = tangential.e;
        let [mut h1, mut h2] = tangential.h;
        if normal == Axis::Y {
            h1.mapv_inplace(|v| -v);
            h2.mapv_inplace(|v| -v);
        }
        let [mut w1, mut w2] = data.diff_lengths()?;

        if let Some(ppw) = pts_per_wavelength {
            let f_max = frequencies.iter().copied().fold(f64::MIN, f64::max);
            let wavelength = self.medium.wavelength(f_max);
            for (axis, (coords, weights)) in [(&mut c1, &mut w1), (&mut c2, &mut w2)].into_iter().enumerate() {
                if coords.len() < 2 {
                    continue;
                }
                let (lo, hi) = (coords[0], coords[coords.len() - 1]);
                let num = (((hi - lo) / wavelength * ppw).ceil() as usize + 1).max(2);
                let targets = Array1::linspace(lo, hi, num);
                for values in [&mut e1, &mut e2, &mut h1, &mut h2] {
                    *values = resample_plane(values, coords, &targets, axis);
                }
                *weights = trapezoid_weights(&targets);
                *coords = targets;
            }
        }

        let (n1, n2, ns, _) = e1.dim();
        if (n1, n2) != (w1.len(), w2.len()) {
            return Err(FieldProjError::data(
                "surface fields do not match the plane area elements",
            ));
        }

        let n_hat = Vector3::from(unpop_axis(orientation * surface.surface.direction.sign(), [0.0, 0.0], normal))
            .map(Complex64::from);
        let offset = data.monitor.center[normal.index()];

        let mut points = Vec::with_capacity(n1 * n2);
        let mut weights = Vec::with_capacity(n1 * n2);
        let mut j = Array2::from_elem((n1 * n2, ns), Vector3::zeros());
        let mut m = Array2::from_elem((n1 * n2, ns), Vector3::zeros());
        let zero = Complex64::default();
        for (p, (a, b)) in itertools::iproduct!(0..n1, 0..n2).enumerate() {
            let [x, y, z] = unpop_axis(offset, [c1[a], c2[b]], normal);
            points.push(Vector3::new(x - origin[0], y - origin[1], z - origin[2]));
            weights.push(w1[a] * w2[b]);
            for f in 0..ns {
                let e = Vector3::from(unpop_axis(zero, [e1[[a, b, f, 0]], e2[[a, b, f, 0]]], normal));
                let h = Vector3::from(unpop_axis(zero, [h1[[a, b, f, 0]], h2[[a, b, f, 0]]], normal));
                j[[p, f]] = n_hat.cross(&h);
                m[[p, f]] = -n_hat.cross(&e);
            }
        }

        Ok(SurfaceCurrents {
            points,
            weights,
            j,
            m,
        })
    }

    /// Policy warnings that `project` would emit for `monitor`.
    pub fn warnings(&self, monitor: &ProjectionMonitor) -> Result<Vec<ProjectionWarning>> {
        let enabled = self.enabled_surfaces()?;
        let frequencies = Self::frequencies(&enabled)?;
        let f_max = frequencies.iter().copied().fold(f64::MIN, f64::max);
        let origin = Vector3::from(monitor.local_origin());
        let points = monitor.grid.coordinates_to_spherical(f_max, &self.medium);
        let valid = points.iter().filter(|p| p.is_valid());

        let mut warnings = Vec::new();

        if let [only] = enabled.as_slice() {
            let center = Vector3::from(only.data.monitor.center);
            let sign = Self::orientation(monitor, &only.surface) * only.surface.direction.sign();
            let n_hat = Vector3::from(unpop_axis(sign, [0.0, 0.0], only.surface.axis));
            let behind = |p: &SphericalPoint| {
                let r_hat = radial_unit(p.theta, p.phi);
                match p.r {
                    Some(r) => (origin + r_hat * r - center).dot(&n_hat) <= 0.0,
                    None => r_hat.dot(&n_hat) <= 0.0,
                }
            };
            if valid.clone().any(behind) {
                warnings.push(ProjectionWarning::Backward);
            }
        }

        let extent = enabled
            .iter()
            .flat_map(|s| {
                let (min, max) = s.data.monitor.bounds();
                Axis::ALL.into_iter().map(move |axis| {
                    let i = axis.index();
                    let span = max[i] - min[i];
                    if span.is_finite() {
                        span
                    } else {
                        let (lo, hi) = s.data.grid.span(axis);
                        hi - lo
                    }
                })
            })
            .fold(0.0, f64::max);
        let distances: Vec<f64> = valid.filter_map(|p| p.r).collect();

        if extent > 0.0 && !distances.is_empty() {
            let r_min = distances.iter().copied().fold(f64::INFINITY, f64::min);
            let r_max = distances.iter().copied().fold(0.0, f64::max);
            if monitor.far_field_approx {
                let fraunhofer = 2.0 * extent * extent / self.medium.wavelength(f_max);
                let limit = fraunhofer.max(FAR_FIELD_DISTANCE_RATIO * extent);
                if r_min < limit {
                    warnings.push(ProjectionWarning::NearFieldDistance {
                        distance: r_min,
                        limit,
                    });
                }
            } else if r_max > EXACT_DISTANCE_RATIO * extent {
                warnings.push(ProjectionWarning::ExactDistance {
                    distance: r_max,
                    extent,
                });
            }
        }

        Ok(warnings)
    }

    /// Project every enabled surface onto the grid of `monitor` and sum the contributions.
    pub fn project(&self, monitor: &ProjectionMonitor) -> Result<ProjectedFieldData> {
        let enabled = self.enabled_surfaces()?;
        let frequencies = Self::frequencies(&enabled)?;
        let is_2d = Self::is_2d(&enabled);
        let far_field_approx = monitor.far_field_approx;

        if !far_field_approx {
            if monitor.grid.proj_distance().is_none() {
                return Err(FieldProjError::setup(
                    "Exact projection requires a projection distance.",
                ));
            }
            if is_2d {
                return Err(FieldProjError::setup(
                    "Exact projection is not supported for 2D simulations; use the far-field approximation.",
                ));
            }
        }

        for warning in self.warnings(monitor)? {
            warn!("{}", warning);
        }

        let origin = monitor.local_origin();
        let currents = enabled
            .iter()
            .map(|s| {
                let orientation = Self::orientation(monitor, &s.surface);
                self.surface_currents(s, origin, orientation, monitor.pts_per_wavelength, &frequencies)
            })
            .collect::<Result<Vec<_>>>()?;

        let start = Instant::now();
        debug!(
            surfaces = currents.len(),
            sources = currents.iter().map(|c| c.points.len()).sum::<usize>(),
            frequencies = frequencies.len(),
            exact = !far_field_approx,
            is_2d,
            "projecting near fields"
        );

        let per_frequency: Vec<Array3<[Complex64; 6]>> = (0..frequencies.len())
            .into_par_iter()
            .map(|f| self.project_frequency(monitor, &currents, frequencies[f], f, is_2d))
            .collect();

        let [n0, n1, n2] = monitor.grid.shape();
        let shape = (n0, n1, n2, frequencies.len());
        let mut stacked: [Array4<Complex64>; 6] = std::array::from_fn(|_| Array4::zeros(shape));
        for (f, values) in per_frequency.iter().enumerate() {
            for (c, out) in stacked.iter_mut().enumerate() {
                out.slice_mut(s![.., .., .., f]).assign(&values.mapv(|v| v[c]));
            }
        }
        debug!(elapsed = ?start.elapsed(), "projection finished");

        let [er, et, ep, hr, ht, hp] = stacked;
        ProjectedFieldData::new(
            monitor.grid.clone(),
            frequencies,
            self.medium,
            origin,
            is_2d,
            far_field_approx,
            FieldSet {
                e: [er, et, ep],
                h: [hr, ht, hp],
            },
        )
    }

    /// Spherical `(Er, Etheta, Ephi, Hr, Htheta, Hphi)` at every grid point for one frequency.
    fn project_frequency(
        &self,
        monitor: &ProjectionMonitor,
        currents: &[SurfaceCurrents],
        frequency: f64,
        f: usize,
        is_2d: bool,
    ) -> Array3<[Complex64; 6]> {
        let k = self.medium.wavenumber(frequency);
        let eta = self.medium.eta();
        let nan = Complex64::new(f64::NAN, f64::NAN);

        monitor
            .grid
            .coordinates_to_spherical(frequency, &self.medium)
            .map(|point| {
                if !point.is_valid() {
                    return [nan; 6];
                }
                let (theta, phi) = (point.theta, point.phi);
                let r_hat = radial_unit(theta, phi);

                match (monitor.far_field_approx, point.r) {
                    (false, Some(r)) => {
                        let obs = r_hat * r;
                        let (e, h) = currents.iter().fold(
                            (Vector3::zeros(), Vector3::zeros()),
                            |(e, h), s| {
                                let (de, dh) = s.exact_fields(&obs, k, eta, f);
                                (e + de, h + dh)
                            },
                        );
                        let [er, et, ep] = car_2_sph_field(&e, theta, phi);
                        let [hr, ht, hp] = car_2_sph_field(&h, theta, phi);
                        [er, et, ep, hr, ht, hp]
                    }
                    _ => {
                        let (n, l) = currents.iter().fold(
                            (Vector3::zeros(), Vector3::zeros()),
                            |(n, l), s| {
                                let (dn, dl) = s.radiation_vectors(&r_hat, k, f);
                                (n + dn, l + dl)
                            },
                        );
                        let t_hat = theta_unit(theta, phi).map(Complex64::from);
                        let p_hat = phi_unit(phi).map(Complex64::from);
                        let (n_theta, n_phi) = (n.dot(&t_hat), n.dot(&p_hat));
                        let (l_theta, l_phi) = (l.dot(&t_hat), l.dot(&p_hat));

                        let factor = monitor.grid.propagation_factor(point.r, k, is_2d);
                        let zero = Complex64::default();
                        [
                            zero,
                            -factor * (l_phi + eta * n_theta),
                            factor * (l_theta - eta * n_phi),
                            zero,
                            factor * (n_phi - l_theta / eta),
                            -factor * (n_theta + l_phi / eta),
                        ]
                    }
                }
            })
    }
}
