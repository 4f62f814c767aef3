//! Tangential-field kernel for planar monitors.
//!
//! Everything here works on the four in-plane components of a planar dataset, oriented
//! so the implicit third axis is the plane normal. In practice that means the H
//! components pick up an extra minus sign when the normal is `y`. Finite-grid correction
//! is applied and symmetry is expanded before any of the derived quantities are formed.
//!
//! Provided quantities:
//! - differential area elements of the in-plane grid
//! - Poynting vector normal to the plane and flux through it
//! - intensity and effective mode area
//! - modal overlap (`dot`) and all-pairs overlap (`outer_dot`)

use std::ops::{AddAssign, Mul};

use itertools::iproduct;
use ndarray::{s, Array1, Array2, Array3, Array4, Zip};
use num_complex::Complex64;
use rayon::prelude::*;

use crate::dataset::FieldDataset;
use crate::error::{FieldProjError, Result};
use crate::field::{nearest_index, FieldComponent, FieldKind};
use crate::grid::Axis;
use crate::settings::COORD_TOLERANCE;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{MonitorBox, GridCorrection};
    use crate::field::{ScalarField, SpectralAxis};
    use crate::grid::Grid;
    use approx::assert_relative_eq;

    /// Uniform plane wave data on a 1 x 1 colocated plane normal to `normal`.
    fn uniform_plane(normal: Axis, e: [Complex64; 2], h: [Complex64; 2]) -> FieldDataset {
        let mut min = [-0.5; 3];
        let mut max = [0.6; 3];
        let mut cells = [11; 3];
        min[normal.index()] = -0.05;
        max[normal.index()] = 0.05;
        cells[normal.index()] = 1;
        let grid = Grid::uniform(min, max, cells).unwrap();
        let mut size = [1.0; 3];
        size[normal.index()] = 0.0;
        let monitor = MonitorBox::new([0.0; 3], size).colocated();
        let mut coords = grid.colocated_coords();
        coords[normal.index()] = Array1::from(vec![0.0]);
        let spectral = SpectralAxis::Frequency(Array1::from(vec![2e14]));
        let [e_names, h_names] = FieldDataset::tangential_components(normal);
        let mut components = Vec::new();
        for (i, name) in e_names.into_iter().enumerate() {
            components.push((name, ScalarField::from_fn(coords.clone(), 1, 1, |_, _, _| e[i])));
        }
        for (i, name) in h_names.into_iter().enumerate() {
            components.push((name, ScalarField::from_fn(coords.clone(), 1, 1, |_, _, _| h[i])));
        }
        FieldDataset::new(monitor, grid, spectral, components).unwrap()
    }

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    #[test]
    fn diff_area_covers_monitor() {
        let data = uniform_plane(Axis::Z, [c(1.0), c(0.0)], [c(0.0), c(1.0)]);
        let area = data.diff_area().unwrap();
        assert_eq!(area.dim(), (11, 11));
        assert_relative_eq!(area.sum(), 1.0, epsilon = 1e-12);
        // edge cells are half width
        assert_relative_eq!(area[[0, 5]], 0.05 * 0.1, epsilon = 1e-12);
    }

    #[test]
    fn diff_area_is_unity_along_collapsed_axis() {
        let grid = Grid::uniform([-0.5, -0.5, -0.05], [0.6, 0.5, 0.05], [11, 1, 1]).unwrap();
        let monitor = MonitorBox::new([0.0; 3], [1.0, f64::INFINITY, 0.0]).colocated();
        let spectral = SpectralAxis::Frequency(Array1::from(vec![2e14]));
        let data = FieldDataset::new(monitor, grid, spectral, []).unwrap();
        let area = data.diff_area().unwrap();
        assert_eq!(area.dim(), (11, 1));
        assert_relative_eq!(area.sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn flux_of_plane_wave() {
        // Ex, Hy along +z: flux = 0.5 * |E| * |H| * area
        let data = uniform_plane(Axis::Z, [c(2.0), c(0.0)], [c(0.0), c(3.0)]);
        let flux = data.flux().unwrap();
        assert_relative_eq!(flux[[0, 0]], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn flux_sign_for_y_normal() {
        // Ez, Hx propagate along +y: S_y = Ez Hx* - Ex Hz*
        let data = uniform_plane(Axis::Y, [c(0.0), c(1.0)], [c(1.0), c(0.0)]);
        let flux = data.flux().unwrap();
        assert_relative_eq!(flux[[0, 0]], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn time_domain_poynting_uses_real_parts() {
        let data = uniform_plane(Axis::Z, [Complex64::new(2.0, 5.0), c(0.0)], [c(0.0), Complex64::new(3.0, -1.0)]);
        let mut time = data.clone();
        time.spectral = SpectralAxis::Time(Array1::from(vec![0.0]));
        let poynting = time.poynting().unwrap();
        assert_relative_eq!(poynting[[3, 3, 0, 0]], 6.0);
        assert!(matches!(time.dot(&time, true), Err(FieldProjError::Data(_))));
    }

    #[test]
    fn missing_component_is_a_data_error() {
        let grid = Grid::uniform([0.0, 0.0, -0.05], [1.0, 1.0, 0.05], [2, 2, 1]).unwrap();
        let monitor = MonitorBox::new([0.5, 0.5, 0.0], [1.0, 1.0, 0.0]).colocated();
        let spectral = SpectralAxis::Frequency(Array1::from(vec![2e14]));
        let mut coords = grid.colocated_coords();
        coords[2] = Array1::from(vec![0.0]);
        let ex = ScalarField::from_fn(coords, 1, 1, |_, _, _| c(1.0));
        let data = FieldDataset::new(monitor, grid, spectral, [(FieldComponent::Ex, ex)]).unwrap();
        match data.flux() {
            Err(FieldProjError::Data(msg)) => assert!(msg.contains("'Ey' missing")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn dot_with_self_is_quarter_of_twice_flux() {
        let data = uniform_plane(Axis::Z, [c(2.0), c(0.0)], [c(0.0), c(3.0)]);
        let dot = data.dot(&data, true).unwrap();
        // 1/4 * (E x H* + H* x E) = 1/4 * 2 * 6 = 3
        assert_relative_eq!(dot[[0, 0]].re, 3.0, epsilon = 1e-12);
        assert_relative_eq!(dot[[0, 0]].im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn dot_requires_matching_planes() {
        let a = uniform_plane(Axis::Z, [c(1.0), c(0.0)], [c(0.0), c(1.0)]);
        let b = uniform_plane(Axis::X, [c(1.0), c(0.0)], [c(0.0), c(1.0)]);
        assert!(matches!(a.dot(&b, true), Err(FieldProjError::Setup(_))));
        assert!(matches!(a.outer_dot(&b, true), Err(FieldProjError::Setup(_))));
    }

    #[test]
    fn outer_dot_matches_dot_on_shared_grid() {
        let a = uniform_plane(Axis::Z, [c(1.0), c(0.5)], [c(-0.5), c(1.0)]);
        let b = uniform_plane(Axis::Z, [c(0.3), c(1.0)], [c(-1.0), c(0.3)]);
        let dot = a.dot(&b, false).unwrap();
        let outer = a.outer_dot(&b, false).unwrap();
        assert_eq!(outer.values.dim(), (1, 1, 1));
        assert_relative_eq!((outer.values[[0, 0, 0]] - dot[[0, 0]]).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn grid_correction_scales_flux() {
        let data = uniform_plane(Axis::Z, [c(2.0), c(0.0)], [c(0.0), c(3.0)])
            .with_grid_correction(GridCorrection::Scalar(c(2.0)), GridCorrection::Scalar(c(3.0)))
            .unwrap();
        // tangential E sits on primal locations along the normal, tangential H on dual
        assert_relative_eq!(data.flux().unwrap()[[0, 0]], 18.0, epsilon = 1e-12);
    }

    #[test]
    fn mode_area_of_uniform_field_is_plane_area() {
        let mut data = uniform_plane(Axis::Z, [c(1.0), c(0.0)], [c(0.0), c(1.0)]);
        let coords = data.component(FieldComponent::Ex).unwrap().coords.clone();
        let zero = ScalarField::from_fn(coords, 1, 1, |_, _, _| c(0.0));
        data = FieldDataset::new(
            data.monitor,
            data.grid.clone(),
            data.spectral.clone(),
            data.components()
                .map(|(n, f)| (*n, f.clone()))
                .chain([(FieldComponent::Ez, zero)]),
        )
        .unwrap();
        assert_relative_eq!(data.mode_area().unwrap()[[0, 0]], 1.0, epsilon = 1e-12);
    }
}

/// In-plane E and H components sharing one set of plane coordinates.
/// Arrays are indexed `(t1, t2, spectral, mode)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TangentialFields {
    pub normal: Axis,
    pub dims: [Axis; 2],
    pub coords: [Array1<f64>; 2],
    pub e: [Array4<Complex64>; 2],
    pub h: [Array4<Complex64>; 2],
}

impl TangentialFields {
    pub fn plane_shape(&self) -> (usize, usize) {
        let shape = self.e[0].shape();
        (shape[0], shape[1])
    }

    fn conj(&self) -> Self {
        let conj = |a: &Array4<Complex64>| a.mapv(|v| v.conj());
        Self {
            normal: self.normal,
            dims: self.dims,
            coords: self.coords.clone(),
            e: [conj(&self.e[0]), conj(&self.e[1])],
            h: [conj(&self.h[0]), conj(&self.h[1])],
        }
    }

    /// `(E0 x H1 - H0 x E1) . n` at one sample, with `self` as 0 and `other` as 1.
    fn cross_term(&self, other: &Self, a: [usize; 4], b: [usize; 4]) -> Complex64 {
        let e_x_h = self.e[0][a] * other.h[1][b] - self.e[1][a] * other.h[0][b];
        let h_x_e = self.h[0][a] * other.e[1][b] - self.h[1][a] * other.e[0][b];
        e_x_h - h_x_e
    }
}

/// All-pairs modal overlap for the frequencies shared by two datasets.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapMatrix {
    pub frequencies: Array1<f64>,
    /// Indexed `(frequency, mode_self, mode_other)`.
    pub values: Array3<Complex64>,
}

/// Sum `values * diff_area` over the two plane axes.
pub(crate) fn integrate_plane<T>(values: &Array4<T>, diff_area: &Array2<f64>) -> Result<Array2<T>>
where
    T: Copy + Default + AddAssign + Mul<f64, Output = T>,
{
    let (n1, n2, ns, nm) = values.dim();
    if (n1, n2) != diff_area.dim() {
        return Err(FieldProjError::data(format!(
            "field plane has shape ({}, {}) but the area grid has shape {:?}",
            n1,
            n2,
            diff_area.dim()
        )));
    }
    let mut out = Array2::<T>::default((ns, nm));
    for ((i, j, s, m), value) in values.indexed_iter() {
        out[[s, m]] += *value * diff_area[[i, j]];
    }
    Ok(out)
}

impl FieldDataset {
    pub fn tangential_dims(&self) -> Result<[Axis; 2]> {
        self.monitor.tangential_axes()
    }

    /// Coordinates used to colocate data to grid boundaries. The last boundary is always
    /// dropped; non-colocated monitors also drop the first unless a single point remains.
    pub fn colocation_boundaries(&self) -> [Array1<f64>; 3] {
        Axis::ALL.map(|axis| {
            let bounds = self.grid.primal(axis);
            if !self.monitor.colocate && bounds.len() > 1 {
                bounds.slice(s![1..]).to_owned()
            } else {
                bounds
            }
        })
    }

    pub fn plane_grid_boundaries(&self) -> Result<[Array1<f64>; 2]> {
        let bounds = self.colocation_boundaries();
        Ok(self.tangential_dims()?.map(|axis| bounds[axis.index()].clone()))
    }

    pub fn plane_grid_centers(&self) -> Result<[Array1<f64>; 2]> {
        Ok(self
            .plane_grid_boundaries()?
            .map(|b| (&b.slice(s![1..]) + &b.slice(s![..-1])) / 2.0))
    }

    /// Length of each in-plane cell along the two tangential axes.
    ///
    /// Cell sizes come from the spacing of the surrounding centers, with the first and last
    /// boundary appended and everything clamped to the monitor footprint. Integrating with
    /// these weights is the trapezoidal rule with partial edge cells. Along an axis with a
    /// single sample the size is 1, so integrated quantities are per unit length.
    pub fn diff_lengths(&self) -> Result<[Array1<f64>; 2]> {
        let dims = self.tangential_dims()?;
        let bounds = self.plane_grid_boundaries()?;
        let centers = self.plane_grid_centers()?;
        let (mnt_min, mnt_max) = self.monitor.bounds();

        Ok([0, 1].map(|i| {
            let b = &bounds[i];
            if b.len() <= 1 {
                return Array1::from(vec![1.0]);
            }
            let (lo, hi) = (mnt_min[dims[i].index()], mnt_max[dims[i].index()]);
            let edges: Array1<f64> = std::iter::once(b[0])
                .chain(centers[i].iter().copied())
                .chain(std::iter::once(b[b.len() - 1]))
                .map(|x| x.max(lo).min(hi))
                .collect();
            &edges.slice(s![1..]) - &edges.slice(s![..-1])
        }))
    }

    /// Area of each in-plane cell, for data colocated to the plane grid boundaries.
    pub fn diff_area(&self) -> Result<Array2<f64>> {
        let [sizes_1, sizes_2] = self.diff_lengths()?;
        Ok(Array2::from_shape_fn((sizes_1.len(), sizes_2.len()), |(i, j)| {
            sizes_1[i] * sizes_2[j]
        }))
    }

    /// Symmetry-expanded fields interpolated to the plane grid boundaries.
    pub fn colocated_fields(&self) -> Result<FieldDataset> {
        let expanded = self.symmetry_expanded();
        if self.monitor.colocate {
            return Ok(expanded);
        }
        let dims = self.tangential_dims()?;
        let bounds = self.plane_grid_boundaries()?;
        expanded.map_components(|_, field| {
            let mut field = field.clone();
            for (axis, targets) in dims.iter().zip(bounds.iter()) {
                if targets.len() > 1 {
                    field = field.interp(*axis, targets, None);
                }
            }
            Ok(field)
        })
    }

    /// Extract and orient the tangential components of `fields` (which must share this
    /// dataset's monitor), applying grid correction and dropping the normal coordinate.
    fn tangential_corrected(&self, fields: &FieldDataset) -> Result<TangentialFields> {
        let normal = self
            .monitor
            .normal_axis()
            .map_err(|_| FieldProjError::data("Data must be 2D to get tangential fields."))?;
        let [e_names, h_names] = Self::tangential_components(normal);

        let extract = |name: FieldComponent| -> Result<(Array4<Complex64>, [Array1<f64>; 2])> {
            let field = fields.component(name).ok_or_else(|| {
                FieldProjError::data(format!(
                    "Tangential field component '{}' missing in field data.",
                    name
                ))
            })?;
            let mut correction = self.grid_correction_for(name, normal)?;
            if normal == Axis::Y && name.kind() == FieldKind::H {
                correction.mapv_inplace(|v| -v);
            }
            let mut plane = field.plane(normal)?;
            for ((sp, m), factor) in correction.indexed_iter() {
                plane
                    .slice_mut(s![.., .., sp, m])
                    .mapv_inplace(|v| v * factor);
            }
            Ok((plane, field.plane_coords(normal)))
        };

        let (e1, coords) = extract(e_names[0])?;
        let (e2, _) = extract(e_names[1])?;
        let (h1, _) = extract(h_names[0])?;
        let (h2, _) = extract(h_names[1])?;
        if [e2.shape(), h1.shape(), h2.shape()]
            .iter()
            .any(|shape| *shape != e1.shape())
        {
            return Err(FieldProjError::data(
                "tangential components are not sampled on a common plane grid",
            ));
        }

        Ok(TangentialFields {
            normal,
            dims: normal.plane(),
            coords,
            e: [e1, e2],
            h: [h1, h2],
        })
    }

    /// Tangential E and H colocated to the plane grid boundaries, oriented, corrected
    /// and symmetry expanded.
    pub fn colocated_tangential_fields(&self) -> Result<TangentialFields> {
        self.tangential_corrected(&self.colocated_fields()?)
    }

    /// Tangential fields interpolated to arbitrary plane `coords`, zero outside the data.
    fn interpolated_tangential_fields(&self, coords: &[Array1<f64>; 2]) -> Result<TangentialFields> {
        let dims = self.tangential_dims()?;
        let fields = self.symmetry_expanded().map_components(|_, field| {
            let mut field = field.clone();
            for (axis, targets) in dims.iter().zip(coords.iter()) {
                field = if field.coords[axis.index()].len() == 1 {
                    field.select_nearest(*axis, targets)
                } else {
                    field.interp(*axis, targets, Some(Complex64::default()))
                };
            }
            Ok(field)
        })?;
        self.tangential_corrected(&fields)
    }

    /// Sum of squared E magnitudes, colocated, indexed `(t1, t2, spectral, mode)`.
    pub fn intensity(&self) -> Result<Array4<f64>> {
        let normal = self.monitor.normal_axis()?;
        let fields = self.colocated_fields()?;
        let mut total: Option<Array4<f64>> = None;
        for name in [FieldComponent::Ex, FieldComponent::Ey, FieldComponent::Ez] {
            let field = fields.component(name).ok_or_else(|| {
                FieldProjError::data("Can't compute intensity, all E field components must be present.")
            })?;
            let squared = field.plane(normal)?.mapv(|v| v.norm_sqr());
            total = Some(match total {
                Some(acc) if acc.shape() == squared.shape() => acc + squared,
                Some(_) => {
                    return Err(FieldProjError::data(
                        "E components are not sampled on a common plane grid",
                    ))
                }
                None => squared,
            });
        }
        total.ok_or_else(|| FieldProjError::data("no E field components"))
    }

    /// Poynting vector along the plane normal, indexed `(t1, t2, spectral, mode)`.
    /// Frequency-domain data gives the time average, time-domain data the instantaneous value.
    pub fn poynting(&self) -> Result<Array4<f64>> {
        let fields = self.colocated_tangential_fields()?;
        let [e1, e2] = &fields.e;
        let [h1, h2] = &fields.h;
        let zip = Zip::from(e1).and(e2).and(h1).and(h2);
        if self.spectral.is_time() {
            Ok(zip.map_collect(|e1, e2, h1, h2| e1.re * h2.re - e2.re * h1.re))
        } else {
            Ok(zip.map_collect(|e1, e2, h1, h2| 0.5 * (e1 * h2.conj() - e2 * h1.conj()).re))
        }
    }

    /// Flux through the plane, indexed `(spectral, mode)`.
    pub fn flux(&self) -> Result<Array2<f64>> {
        integrate_plane(&self.poynting()?, &self.diff_area()?)
    }

    /// Effective mode area `(∫|E|² dS)² / ∫|E|⁴ dS`, indexed `(spectral, mode)`.
    pub fn mode_area(&self) -> Result<Array2<f64>> {
        let intensity = self.intensity()?;
        let diff_area = self.diff_area()?;
        let num = integrate_plane(&intensity, &diff_area)?.mapv(|v| v * v);
        let den = integrate_plane(&intensity.mapv(|v| v * v), &diff_area)?;
        Ok(num / den)
    }

    fn check_overlap_inputs(&self, other: &FieldDataset) -> Result<()> {
        if self.spectral.is_time() || other.spectral.is_time() {
            return Err(FieldProjError::data(
                "Inner product is not defined for time-domain data.",
            ));
        }
        if self.tangential_dims()? != other.tangential_dims()? {
            return Err(FieldProjError::setup(
                "Tangential dimensions must match between the two monitors.",
            ));
        }
        Ok(())
    }

    /// Modal overlap `1/4 ∫ (E0 x H1* + H0* x E1) . n dS`, indexed `(frequency, mode)`.
    ///
    /// Both datasets must share the in-plane discretization. `other` may have a single
    /// frequency or a single mode, which is broadcast. Without `conjugate` the fields of
    /// `self` enter unconjugated.
    pub fn dot(&self, other: &FieldDataset, conjugate: bool) -> Result<Array2<Complex64>> {
        self.check_overlap_inputs(other)?;

        let mut fields_self = self.colocated_tangential_fields()?;
        if conjugate {
            fields_self = fields_self.conj();
        }
        let fields_other = other.colocated_tangential_fields()?;
        if fields_self.plane_shape() != fields_other.plane_shape() {
            return Err(FieldProjError::data(
                "Datasets must have the same tangential discretization to compute a dot product.",
            ));
        }

        let (n1, n2, ns, nm) = fields_self.e[0].dim();
        let (_, _, ns_other, nm_other) = fields_other.e[0].dim();
        if !(ns_other == 1 || other.spectral.matches(&self.spectral)) {
            return Err(FieldProjError::data(
                "frequencies of the two datasets must match or the other must have one frequency",
            ));
        }
        if !(nm_other == 1 || nm_other == nm) {
            return Err(FieldProjError::data(format!(
                "cannot broadcast {} modes against {}",
                nm_other, nm
            )));
        }

        let integrand = Array4::from_shape_fn((n1, n2, ns, nm), |(i, j, sp, m)| {
            let b = [i, j, sp.min(ns_other - 1), m.min(nm_other - 1)];
            fields_self.cross_term(&fields_other, [i, j, sp, m], b)
        });
        Ok(integrate_plane(&integrand, &self.diff_area()?)?.mapv(|v| v * 0.25))
    }

    /// Overlap of every mode of `self` with every mode of `other` at their common
    /// frequencies. `other` is interpolated onto this dataset's plane grid, with zero
    /// outside its own extent.
    pub fn outer_dot(&self, other: &FieldDataset, conjugate: bool) -> Result<OverlapMatrix> {
        self.check_overlap_inputs(other)?;

        let mut fields_self = self.colocated_tangential_fields()?;
        if conjugate {
            fields_self = fields_self.conj();
        }
        let fields_other = other.interpolated_tangential_fields(&self.plane_grid_boundaries()?)?;
        let diff_area = self.diff_area()?;

        let freqs_self = self.spectral.frequencies()?;
        let freqs_other = other.spectral.frequencies()?;
        let common: Vec<(usize, usize, f64)> = freqs_self
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| {
                let j = nearest_index(freqs_other, f);
                ((freqs_other[j] - f).abs() <= COORD_TOLERANCE * f.abs().max(1.0)).then_some((i, j, f))
            })
            .collect();
        if common.is_empty() {
            return Err(FieldProjError::data(
                "the two datasets have no frequencies in common",
            ));
        }

        let (n1, n2, _, nm_self) = fields_self.e[0].dim();
        let nm_other = fields_other.e[0].dim().3;
        if fields_other.plane_shape() != (n1, n2) {
            return Err(FieldProjError::data(
                "interpolated fields do not match the plane grid",
            ));
        }

        let pairs: Vec<(usize, usize)> = iproduct!(0..nm_self, 0..nm_other).collect();
        let overlaps: Vec<Vec<Complex64>> = pairs
            .par_iter()
            .map(|&(m0, m1)| {
                common
                    .iter()
                    .map(|&(f0, f1, _)| {
                        let mut sum = Complex64::default();
                        for ((i, j), area) in diff_area.indexed_iter() {
                            sum += fields_self.cross_term(&fields_other, [i, j, f0, m0], [i, j, f1, m1])
                                * *area;
                        }
                        sum * 0.25
                    })
                    .collect()
            })
            .collect();

        let mut values = Array3::<Complex64>::zeros((common.len(), nm_self, nm_other));
        for (&(m0, m1), per_freq) in pairs.iter().zip(overlaps) {
            for (f, value) in per_freq.into_iter().enumerate() {
                values[[f, m0, m1]] = value;
            }
        }

        Ok(OverlapMatrix {
            frequencies: common.iter().map(|&(_, _, f)| f).collect(),
            values,
        })
    }
}
