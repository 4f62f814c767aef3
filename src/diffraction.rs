//! Diffraction-order decomposition for periodic apertures.
//!
//! A field that is periodic across the aperture, up to a Bloch phase ramp, only radiates
//! into a discrete set of directions. Along each in-plane axis the allowed direction
//! cosines are
//!
//! `u = (bloch + order) * wavelength / (period * n)`
//!
//! and any order with `ux^2 + uy^2 > 1` is evanescent. Orders are enumerated once at the
//! highest frequency so the order index space is shared by all frequencies; at lower
//! frequencies the extra orders are evanescent and carry NaN angles and zero power.
//!
//! Amplitudes are normalized so that `|amp|^2` is the power carried by an order in one
//! polarization, making the sum over orders directly comparable to the aperture flux.

use ndarray::{Array1, Array3, Array4, Axis as NdAxis};
use num_complex::Complex64;
use tracing::debug;

use crate::coords::{kspace_2_sph, sph_2_kspace};
use crate::dataset::FieldDataset;
use crate::error::{FieldProjError, Result};
use crate::grid::Axis;
use crate::medium::Medium;
use crate::monitor::{
    Direction, ObservationGrid, ProjectionGrid, ProjectionMonitor, ProjectionSurface,
    SphericalPoint,
};
use crate::powers::Powers;
use crate::projected::{FieldSet, ProjectedFieldData};
use crate::projection::{FieldProjector, NearFieldSurface};
use crate::settings::C_0;


/// Diffraction orders along one axis that propagate at `frequency`.
pub fn allowed_orders(period: f64, bloch: f64, frequency: f64, medium: &Medium) -> Array1<i64> {
    if period == 0.0 {
        return Array1::from(vec![0]);
    }
    let cells_per_wavelength = period * medium.refr_index.re * frequency / C_0;
    let lo = (-cells_per_wavelength - bloch).ceil() as i64;
    let hi = (cells_per_wavelength - bloch).floor() as i64;
    (lo..=hi).collect()
}

/// Reciprocal directions of a periodic aperture, one grid point per `(order_x, order_y)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffractionGrid {
    pub proj_axis: Axis,
    pub direction: Direction,
    /// Lattice period along the two in-plane axes; 0 for an invariant axis.
    pub period: [f64; 2],
    /// Bloch phase per axis, in units of `2 pi / period`.
    pub bloch: [f64; 2],
    pub orders_x: Array1<i64>,
    pub orders_y: Array1<i64>,
}

impl DiffractionGrid {
    /// Grid with the orders that propagate at `max_frequency`.
    pub fn new(
        proj_axis: Axis,
        direction: Direction,
        period: [f64; 2],
        bloch: [f64; 2],
        max_frequency: f64,
        medium: &Medium,
    ) -> Self {
        Self {
            proj_axis,
            direction,
            period,
            bloch,
            orders_x: allowed_orders(period[0], bloch[0], max_frequency, medium),
            orders_y: allowed_orders(period[1], bloch[1], max_frequency, medium),
        }
    }

    /// Direction cosines of every order along in-plane axis `i` (0 or 1).
    pub fn reciprocal_coords(&self, i: usize, frequency: f64, medium: &Medium) -> Array1<f64> {
        let orders = if i == 0 { &self.orders_x } else { &self.orders_y };
        if self.period[i] == 0.0 {
            return Array1::zeros(orders.len());
        }
        let wavelength = C_0 / frequency / medium.refr_index.re;
        orders.mapv(|m| (self.bloch[i] + m as f64) / self.period[i] * wavelength)
    }

    /// Area of one unit cell; an invariant axis counts as unit length.
    pub fn unit_cell_area(&self) -> f64 {
        self.period
            .iter()
            .map(|&p| if p == 0.0 { 1.0 } else { p })
            .product()
    }
}

impl ObservationGrid for DiffractionGrid {
    fn shape(&self) -> [usize; 3] {
        [self.orders_x.len(), self.orders_y.len(), 1]
    }

    fn coordinates_to_spherical(&self, frequency: f64, medium: &Medium) -> Array3<SphericalPoint> {
        let ux = self.reciprocal_coords(0, frequency, medium);
        let uy = self.reciprocal_coords(1, frequency, medium);
        Array3::from_shape_fn((ux.len(), uy.len(), 1), |(i, j, _)| {
            let (theta, phi) = kspace_2_sph(ux[i], uy[j], self.proj_axis, self.direction.sign());
            SphericalPoint {
                r: None,
                theta,
                phi,
            }
        })
    }

    fn spherical_to_output_coords(&self, point: &SphericalPoint) -> [f64; 3] {
        let (ux, uy) = sph_2_kspace(point.theta, point.phi, self.proj_axis);
        [ux, uy, 0.0]
    }

    fn proj_distance(&self) -> Option<f64> {
        None
    }

    fn renormalizable(&self) -> bool {
        false
    }

    /// Fourier normalization that turns the radiation vectors into plane-wave amplitudes.
    fn propagation_factor(&self, _dist: Option<f64>, _k: Complex64, _is_2d: bool) -> Complex64 {
        Complex64::new(0.5 / self.unit_cell_area().sqrt(), 0.0)
    }
}

/// Far fields of a periodic aperture, one sample per diffraction order.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffractionData {
    pub grid: DiffractionGrid,
    pub projected: ProjectedFieldData,
}

impl DiffractionData {
    pub fn grid(&self) -> &DiffractionGrid {
        &self.grid
    }

    /// Direction cosines `(ux, uy)` of every order at frequency index `f`.
    pub fn reciprocal_vectors(&self, f: usize) -> (Array1<f64>, Array1<f64>) {
        let freq = self.projected.frequencies[f];
        let medium = &self.projected.medium;
        (
            self.grid().reciprocal_coords(0, freq, medium),
            self.grid().reciprocal_coords(1, freq, medium),
        )
    }

    /// `(theta, phi)` of every order, indexed `(order_x, order_y, frequency)`. NaN for
    /// evanescent orders.
    pub fn angles(&self) -> (Array3<f64>, Array3<f64>) {
        let [nx, ny, _] = self.grid().shape();
        let nf = self.projected.frequencies.len();
        let mut theta = Array3::zeros((nx, ny, nf));
        let mut phi = Array3::zeros((nx, ny, nf));
        for f in 0..nf {
            for ((i, j, _), p) in self.projected.coords_spherical(f).indexed_iter() {
                theta[[i, j, f]] = p.theta;
                phi[[i, j, f]] = p.phi;
            }
        }
        (theta, phi)
    }

    /// Complex power amplitudes indexed `(order_x, order_y, frequency, polarization)`, with
    /// polarization 0 for s (`Ephi`) and 1 for p (`Etheta`). Evanescent and grazing orders
    /// have zero amplitude.
    pub fn amps(&self) -> Array4<Complex64> {
        let [nx, ny, _] = self.grid().shape();
        let nf = self.projected.frequencies.len();
        let eta = self.projected.eta();
        let [_, e_theta, e_phi] = &self.projected.fields.e;
        let mut amps = Array4::zeros((nx, ny, nf, 2));
        for f in 0..nf {
            let (ux, uy) = self.reciprocal_vectors(f);
            for i in 0..nx {
                for j in 0..ny {
                    let cos_normal = (1.0 - ux[i] * ux[i] - uy[j] * uy[j]).sqrt();
                    if !(cos_normal > 0.0) {
                        continue;
                    }
                    let norm = 1.0 / (2.0 * eta * cos_normal).sqrt();
                    amps[[i, j, f, 0]] = e_phi[[i, j, 0, f]] * norm;
                    amps[[i, j, f, 1]] = e_theta[[i, j, 0, f]] * norm;
                }
            }
        }
        amps
    }

    /// Power in each order summed over both polarizations, indexed `(order_x, order_y, frequency)`.
    pub fn power(&self) -> Array3<f64> {
        self.amps()
            .mapv(|a| a.norm_sqr())
            .sum_axis(NdAxis(3))
    }

    /// Cartesian fields of each order, with evanescent orders set to zero.
    pub fn fields_cartesian(&self) -> FieldSet {
        let mut fields = self.projected.fields_cartesian();
        for field in fields.e.iter_mut().chain(fields.h.iter_mut()) {
            field.mapv_inplace(|v| if v.is_nan() { Complex64::default() } else { v });
        }
        fields
    }

    /// Aperture flux against the power in propagating orders, per frequency.
    pub fn power_budget(&self, near_field: &FieldDataset) -> Result<Vec<Powers>> {
        let flux = near_field.flux()?;
        let power = self.power();
        let sign = self.grid().direction.sign();
        Ok((0..self.projected.frequencies.len())
            .map(|f| Powers {
                input: sign * flux[[f, 0]],
                diffracted: power.index_axis(NdAxis(2), f).sum(),
            })
            .collect())
    }
}

/// Decompose the fields recorded over one unit cell of a periodic aperture into
/// diffraction orders radiating towards `direction`.
///
/// The lattice period along each in-plane axis is the monitor size, or the grid extent
/// when the monitor is unbounded; an axis with a single sample is treated as invariant.
/// Amplitude phases are referenced to the monitor center.
pub fn project_diffraction(
    data: &FieldDataset,
    direction: Direction,
    bloch: [f64; 2],
    medium: Medium,
) -> Result<DiffractionData> {
    let normal = data.monitor.normal_axis()?;
    let samples = data.colocation_boundaries();
    let period = normal.plane().map(|axis| {
        let size = data.monitor.size[axis.index()];
        if samples[axis.index()].len() <= 1 {
            0.0
        } else if size.is_finite() {
            size
        } else {
            let (lo, hi) = data.grid.span(axis);
            hi - lo
        }
    });

    let freqs = data.spectral.frequencies()?;
    let max_frequency = freqs.iter().copied().fold(f64::MIN, f64::max);
    if !(max_frequency > 0.0) {
        return Err(FieldProjError::data("diffraction needs positive frequencies"));
    }
    let grid = DiffractionGrid::new(normal, direction, period, bloch, max_frequency, &medium);
    debug!(
        orders_x = grid.orders_x.len(),
        orders_y = grid.orders_y.len(),
        ?period,
        "diffraction orders"
    );

    let monitor = ProjectionMonitor::new(
        data.monitor.center,
        data.monitor.size,
        ProjectionGrid::Diffraction(grid.clone()),
    )
    .with_normal_dir(direction);
    let projector = FieldProjector::new(
        vec![NearFieldSurface::new(
            data.clone(),
            ProjectionSurface::new(normal, direction),
        )],
        medium,
    );
    Ok(DiffractionData {
        grid,
        projected: projector.project(&monitor)?,
    })
}
