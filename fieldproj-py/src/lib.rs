use std::path::PathBuf;

use fieldproj::bins::{BinningScheme, Scheme};
use fieldproj::coords;
use fieldproj::grid::Axis;
use fieldproj::medium::Medium;
use fieldproj::monitor::{AngleGrid, Direction, ProjectionGrid, ProjectionMonitor, ProjectionSurface};
use fieldproj::problem::aperture_fields;
use fieldproj::projected;
use fieldproj::projection::{FieldProjector, NearFieldSurface};
use fieldproj::settings::{Profile, Settings};
use num_complex::Complex64;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

fn value_error(err: impl ToString) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn parse_axis(axis: &str) -> PyResult<Axis> {
    match axis {
        "x" => Ok(Axis::X),
        "y" => Ok(Axis::Y),
        "z" => Ok(Axis::Z),
        other => Err(value_error(format!("unknown axis '{}'", other))),
    }
}

fn parse_direction(direction: &str) -> PyResult<Direction> {
    match direction {
        "+" => Ok(Direction::Plus),
        "-" => Ok(Direction::Minus),
        other => Err(value_error(format!("unknown direction '{}'", other))),
    }
}

/// Propagation factor of an outgoing wave with wavenumber `k` over `dist`.
#[pyfunction]
#[pyo3(signature = (dist, k, is_2d=false))]
fn propagation_factor(dist: Option<f64>, k: Complex64, is_2d: bool) -> Complex64 {
    projected::propagation_factor(dist, k, is_2d)
}

/// Convert direction cosines on the hemisphere facing `direction` along `axis` to
/// `(theta, phi)`. Evanescent directions give NaN.
#[pyfunction]
#[pyo3(signature = (ux, uy, axis="z", direction="+"))]
fn kspace_to_spherical(ux: f64, uy: f64, axis: &str, direction: &str) -> PyResult<(f64, f64)> {
    let axis = parse_axis(axis)?;
    let direction = parse_direction(direction)?;
    Ok(coords::kspace_2_sph(ux, uy, axis, direction.sign()))
}

/// Far-field power density of a uniform square aperture normal to z, on the given
/// `(theta, phi)` grid. Returns one row per theta.
#[pyfunction]
#[pyo3(signature = (wavelength, size, cells, theta, phi, distance=None))]
fn project_uniform_aperture(
    wavelength: f64,
    size: [f64; 2],
    cells: [usize; 2],
    theta: Vec<f64>,
    phi: Vec<f64>,
    distance: Option<f64>,
) -> PyResult<Vec<Vec<f64>>> {
    let settings = Settings {
        wavelength,
        medium_refr_index: Complex64::new(1.0, 0.0),
        aperture_size: size,
        aperture_cells: cells,
        normal_axis: Axis::Z,
        normal_dir: Direction::Plus,
        profile: Profile::Uniform,
        binning: BinningScheme {
            scheme: Scheme::Simple {
                num_theta: theta.len(),
                num_phi: phi.len(),
            },
        },
        proj_distance: distance,
        far_field_approx: true,
        pts_per_wavelength: None,
        directory: PathBuf::from("."),
    };
    let aperture = aperture_fields(&settings).map_err(value_error)?;
    let grid = ProjectionGrid::Angle(AngleGrid {
        theta: theta.into_iter().collect(),
        phi: phi.into_iter().collect(),
        proj_distance: distance,
    });
    let monitor = ProjectionMonitor::new(aperture.monitor.center, aperture.monitor.size, grid);
    let projector = FieldProjector::new(
        vec![NearFieldSurface::new(
            aperture,
            ProjectionSurface::new(Axis::Z, Direction::Plus),
        )],
        Medium::vacuum(),
    );
    let projected = projector.project(&monitor).map_err(value_error)?;
    let power = projected.power();
    let (num_theta, num_phi) = (power.shape()[1], power.shape()[2]);
    Ok((0..num_theta)
        .map(|i| (0..num_phi).map(|j| power[[0, i, j, 0]]).collect())
        .collect())
}

/// A Python module implemented in Rust.
#[pymodule]
fn _fieldproj_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(propagation_factor, m)?)?;
    m.add_function(wrap_pyfunction!(kspace_to_spherical, m)?)?;
    m.add_function(wrap_pyfunction!(project_uniform_aperture, m)?)?;
    Ok(())
}
