use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{s, Array1, Axis as NdAxis};

use crate::monitor::{ObservationGrid, ProjectionGrid};
use crate::projected::ProjectedFieldData;
use crate::result::Results;
use crate::settings::Settings;


fn integrate_trapezoidal(x: &Array1<f64>, y: &Array1<f64>) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let dx = &x.slice(s![1..]) - &x.slice(s![..-1]);
    let avg_y = (&y.slice(s![1..]) + &y.slice(s![..-1])) / 2.0;
    (dx * avg_y).sum()
}

/// Integrate a power density sampled on `(theta, phi)` over the sphere of radius `r`.
fn integrate_sphere(
    theta: &Array1<f64>,
    phi: &Array1<f64>,
    r: f64,
    density: &ndarray::ArrayView2<f64>,
) -> f64 {
    let per_phi: Array1<f64> = density
        .axis_iter(NdAxis(1))
        .map(|column| {
            let y = Array1::from_iter(
                column
                    .iter()
                    .zip(theta.iter())
                    .map(|(p, t)| if p.is_finite() { p * t.sin() } else { 0.0 }),
            );
            integrate_trapezoidal(theta, &y)
        })
        .collect();
    r * r * integrate_trapezoidal(phi, &per_phi)
}

/// Power crossing the observation surface at each frequency, when the grid describes a
/// closed sphere or a plane at a finite distance.
pub fn radiated_power(projected: &ProjectedFieldData) -> Option<Array1<f64>> {
    match &projected.grid {
        ProjectionGrid::Angle(grid) => {
            let r = grid.proj_distance?;
            let power = projected.power();
            Some(
                (0..projected.frequencies.len())
                    .map(|f| {
                        let density = power.slice(s![0, .., .., f]);
                        integrate_sphere(&grid.theta, &grid.phi, r, &density)
                    })
                    .collect(),
            )
        }
        // flux is along the positive axis; count power leaving through either side
        ProjectionGrid::Cartesian(grid) => projected
            .flux()
            .ok()
            .map(|flux| flux * grid.proj_distance.signum()),
        ProjectionGrid::KSpace(_) | ProjectionGrid::Diffraction(_) => None,
    }
}

/// Write the power density against the grid's own coordinates, one point per line
pub fn write_power_grid(path: &Path, projected: &ProjectedFieldData) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let power = projected.power();

    for (f, frequency) in projected.frequencies.iter().enumerate() {
        for ((i, j, k), point) in projected.coords_spherical(f).indexed_iter() {
            let [c0, c1, c2] = projected.grid.spherical_to_output_coords(point);
            writeln!(
                writer,
                "{:e} {} {} {} {}",
                frequency,
                c0,
                c1,
                c2,
                power[[i, j, k, f]]
            )?;
        }
    }
    writer.flush()?;

    Ok(())
}

/// Write the results summary as pretty-printed JSON
pub fn write_summary(path: &Path, results: &Results) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), results)?;
    Ok(())
}

/// Write the resolved settings so a run can be repeated
pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    let text = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
