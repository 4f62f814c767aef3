//! Far fields produced by the projector, with the operations that act on them
//! after projection: power, radar cross section, renormalization to a new distance and
//! conversion between spherical and Cartesian components.

use ndarray::{Array1, Array3, Array4, Zip};
use num_complex::Complex64;
use std::f64::consts::PI;

use crate::coords::sph_2_car_field;
use crate::error::{FieldProjError, Result};
use crate::grid::{pop_axis, Axis};
use crate::medium::Medium;
use crate::monitor::{CartesianGrid, ObservationGrid, ProjectionGrid, SphericalPoint};


/// Phase and amplitude accumulated by an outgoing wave over `dist`, for a point source in 3D
/// or a line source in 2D. `None` means no distance dependence is applied.
pub fn propagation_factor(dist: Option<f64>, k: Complex64, is_2d: bool) -> Complex64 {
    let Some(r) = dist else {
        return Complex64::new(1.0, 0.0);
    };
    let ik = Complex64::i() * k;
    if is_2d {
        (ik * r).exp() * (-ik / (8.0 * PI * r)).sqrt()
    } else {
        -ik * (ik * r).exp() / (4.0 * PI * r)
    }
}

/// Trapezoidal integration weights for samples at `x`. A single sample gets weight 1.
pub fn trapezoid_weights(x: &Array1<f64>) -> Array1<f64> {
    let n = x.len();
    if n < 2 {
        return Array1::ones(n);
    }
    Array1::from_shape_fn(n, |i| {
        let lo = x[i.saturating_sub(1)];
        let hi = x[(i + 1).min(n - 1)];
        (hi - lo) / 2.0
    })
}

/// E and H vector components, each indexed `(grid0, grid1, grid2, frequency)`.
/// The component order is `(r, theta, phi)` or `(x, y, z)` depending on the basis.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSet {
    pub e: [Array4<Complex64>; 3],
    pub h: [Array4<Complex64>; 3],
}

impl FieldSet {
    fn map_with<F>(&self, f: F) -> Self
    where
        F: Fn(&Array4<Complex64>) -> Array4<Complex64>,
    {
        Self {
            e: [f(&self.e[0]), f(&self.e[1]), f(&self.e[2])],
            h: [f(&self.h[0]), f(&self.h[1]), f(&self.h[2])],
        }
    }
}

/// Spherical field components on a projection grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedFieldData {
    pub grid: ProjectionGrid,
    pub frequencies: Array1<f64>,
    pub medium: Medium,
    /// Origin the grid coordinates and field phases were computed against. It is a
    /// record of the projection; later operations on this data do not reapply it.
    pub origin: [f64; 3],
    /// Fields were scaled with the line-source propagation factor.
    pub is_2d: bool,
    pub far_field_approx: bool,
    /// Spherical components `(r, theta, phi)`.
    pub fields: FieldSet,
}

impl ProjectedFieldData {
    pub fn new(
        grid: ProjectionGrid,
        frequencies: Array1<f64>,
        medium: Medium,
        origin: [f64; 3],
        is_2d: bool,
        far_field_approx: bool,
        fields: FieldSet,
    ) -> Result<Self> {
        let [n0, n1, n2] = grid.shape();
        let expected = [n0, n1, n2, frequencies.len()];
        if fields
            .e
            .iter()
            .chain(fields.h.iter())
            .any(|a| a.shape() != expected)
        {
            return Err(FieldProjError::data(format!(
                "projected fields must have shape {:?}",
                expected
            )));
        }
        Ok(Self {
            grid,
            frequencies,
            medium,
            origin,
            is_2d,
            far_field_approx,
            fields,
        })
    }

    pub fn fields_spherical(&self) -> &FieldSet {
        &self.fields
    }

    /// Observation points at the frequency with index `freq_index`.
    pub fn coords_spherical(&self, freq_index: usize) -> Array3<SphericalPoint> {
        self.grid
            .coordinates_to_spherical(self.frequencies[freq_index], &self.medium)
    }

    pub fn wavenumber(&self) -> Array1<Complex64> {
        self.frequencies.mapv(|f| self.medium.wavenumber(f))
    }

    pub fn eta(&self) -> Complex64 {
        self.medium.eta()
    }

    /// Propagation factor at every grid point for one frequency.
    pub fn propagation_factors(&self, freq_index: usize) -> Array3<Complex64> {
        let k = self.medium.wavenumber(self.frequencies[freq_index]);
        self.coords_spherical(freq_index)
            .mapv(|p| self.grid.propagation_factor(p.r, k, self.is_2d))
    }

    /// Cartesian components relative to the projection origin. Points without a defined
    /// direction are NaN.
    pub fn fields_cartesian(&self) -> FieldSet {
        let nan = Complex64::new(f64::NAN, f64::NAN);
        let mut out = self.fields.map_with(|a| Array4::from_elem(a.raw_dim(), nan));
        for f in 0..self.frequencies.len() {
            for ((i, j, k), p) in self.coords_spherical(f).indexed_iter() {
                if !p.is_valid() {
                    continue;
                }
                let idx = [i, j, k, f];
                let e = sph_2_car_field(
                    self.fields.e[0][idx],
                    self.fields.e[1][idx],
                    self.fields.e[2][idx],
                    p.theta,
                    p.phi,
                );
                let h = sph_2_car_field(
                    self.fields.h[0][idx],
                    self.fields.h[1][idx],
                    self.fields.h[2][idx],
                    p.theta,
                    p.phi,
                );
                for c in 0..3 {
                    out.e[c][idx] = e[c];
                    out.h[c][idx] = h[c];
                }
            }
        }
        out
    }

    /// Time-averaged radial power density.
    pub fn power(&self) -> Array4<f64> {
        let [_, e_theta, e_phi] = &self.fields.e;
        let [_, h_theta, h_phi] = &self.fields.h;
        Zip::from(e_theta)
            .and(e_phi)
            .and(h_theta)
            .and(h_phi)
            .map_collect(|et, ep, ht, hp| {
                0.5 * (et * hp.conj()).re + 0.5 * (-ep * ht.conj()).re
            })
    }

    /// Sum of `power` over all grid points per frequency, skipping undefined points.
    pub fn total_power(&self) -> Array1<f64> {
        let power = self.power();
        Array1::from_shape_fn(self.frequencies.len(), |f| {
            power
                .index_axis(ndarray::Axis(3), f)
                .iter()
                .filter(|p| p.is_finite())
                .sum()
        })
    }

    /// Radar cross section in units of incident power, independent of distance.
    pub fn radar_cross_section(&self) -> Result<Array4<f64>> {
        if self.medium.is_lossy() {
            return Err(FieldProjError::setup(
                "Can't compute RCS for a lossy background medium.",
            ));
        }
        let eta = self.eta();
        let denom = if self.is_2d { 16.0 * PI } else { 8.0 * PI };
        let [_, e_theta, e_phi] = &self.fields.e;
        let mut rcs = Array4::<f64>::zeros(e_theta.raw_dim());
        for (f, &k) in self.wavenumber().iter().enumerate() {
            let constant = (k * k / (denom * eta)).re;
            let factors = self.propagation_factors(f);
            for ((i, j, l), factor) in factors.indexed_iter() {
                let idx = [i, j, l, f];
                let et = e_theta[idx] / factor;
                let ep = e_phi[idx] / factor;
                rcs[idx] = constant * (et.norm_sqr() + ep.norm_sqr());
            }
        }
        Ok(rcs)
    }

    /// Fields moved to `proj_distance` by swapping the old propagation factor for the new one.
    /// Only far-field-approximation data can be moved; exact fields are tied to the
    /// distance they were computed at.
    pub fn renormalize_fields(&self, proj_distance: f64) -> Result<Self> {
        if !self.far_field_approx {
            return Err(FieldProjError::setup(
                "Fields projected without invoking the far field approximation cannot be re-projected to a new distance.",
            ));
        }
        if !self.grid.renormalizable() {
            return Err(FieldProjError::setup(format!(
                "{} data cannot be re-projected to a new distance",
                self.grid.name()
            )));
        }

        let mut moved = self.clone();
        moved.grid = self.grid.with_proj_distance(proj_distance)?;
        for f in 0..self.frequencies.len() {
            let old = self.propagation_factors(f);
            let new = moved.propagation_factors(f);
            let phase = &new / &old;
            for field in moved.fields.e.iter_mut().chain(moved.fields.h.iter_mut()) {
                let mut slice = field.index_axis_mut(ndarray::Axis(3), f);
                slice *= &phase;
            }
        }
        Ok(moved)
    }

    /// Fields divided by the source amplitude at each frequency.
    pub fn normalize<F: Fn(f64) -> Complex64>(&self, source_spectrum: F) -> Self {
        let mut normalized = self.clone();
        for (f, &freq) in self.frequencies.iter().enumerate() {
            let amp = source_spectrum(freq);
            for field in normalized
                .fields
                .e
                .iter_mut()
                .chain(normalized.fields.h.iter_mut())
            {
                field
                    .index_axis_mut(ndarray::Axis(3), f)
                    .mapv_inplace(|v| v / amp);
            }
        }
        normalized
    }

    fn cartesian_grid(&self) -> Result<&CartesianGrid> {
        match &self.grid {
            ProjectionGrid::Cartesian(grid) => Ok(grid),
            other => Err(FieldProjError::setup(format!(
                "Poynting vector and flux need a Cartesian projection grid, not {}",
                other.name()
            ))),
        }
    }

    /// Time-averaged Poynting vector along the projection axis of a Cartesian grid.
    pub fn poynting(&self) -> Result<Array4<f64>> {
        let grid = self.cartesian_grid()?;
        let [a, b] = grid.proj_axis.plane();
        let cart = self.fields_cartesian();
        let sign = if grid.proj_axis == Axis::Y { -1.0 } else { 1.0 };
        Ok(Zip::from(&cart.e[a.index()])
            .and(&cart.e[b.index()])
            .and(&cart.h[a.index()])
            .and(&cart.h[b.index()])
            .map_collect(|e1, e2, h1, h2| {
                sign * 0.5 * (e1 * h2.conj() - e2 * h1.conj()).re
            }))
    }

    /// Power through the Cartesian projection plane, per frequency.
    pub fn flux(&self) -> Result<Array1<f64>> {
        let grid = self.cartesian_grid()?;
        let poynting = self.poynting()?;
        let w1 = trapezoid_weights(&grid.coord1);
        let w2 = trapezoid_weights(&grid.coord2);
        let mut flux = Array1::<f64>::zeros(self.frequencies.len());
        for ((i, j, k, f), s) in poynting.indexed_iter() {
            let (_, [p, q]) = pop_axis([i, j, k], grid.proj_axis);
            flux[f] += s * w1[p] * w2[q];
        }
        Ok(flux)
    }
}
