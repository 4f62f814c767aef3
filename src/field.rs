//! Sampled field components on staggered grids.
//!
//! - [`FieldComponent`]: the six Cartesian electromagnetic components and their
//!   mirror-symmetry eigenvalues.
//! - [`SpectralAxis`]: the shared frequency (or time) coordinate of a dataset.
//! - [`ScalarField`]: one complex component sampled over `(x, y, z, spectral, mode)`.

use std::{fmt, str::FromStr};

use ndarray::{Array1, Array2, Array4, Array5};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{FieldProjError, Result};
use crate::grid::Axis;
use crate::settings::COORD_TOLERANCE;


/// Electric or magnetic field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    E,
    H,
}

/// Cartesian field component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldComponent {
    Ex,
    Ey,
    Ez,
    Hx,
    Hy,
    Hz,
}

/// Mirror-symmetry eigenvalue of each component (rows) along each axis (columns).
/// E components flip under reflection along their own axis, H components along the other two.
const SYMMETRY_EIGENVALUES: [[f64; 3]; 6] = [
    [-1.0, 1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, -1.0],
    [1.0, -1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
];

impl FieldComponent {
    pub const ALL: [FieldComponent; 6] = [
        FieldComponent::Ex,
        FieldComponent::Ey,
        FieldComponent::Ez,
        FieldComponent::Hx,
        FieldComponent::Hy,
        FieldComponent::Hz,
    ];

    pub fn new(kind: FieldKind, axis: Axis) -> Self {
        let offset = match kind {
            FieldKind::E => 0,
            FieldKind::H => 3,
        };
        Self::ALL[offset + axis.index()]
    }

    pub fn kind(self) -> FieldKind {
        if (self as usize) < 3 {
            FieldKind::E
        } else {
            FieldKind::H
        }
    }

    pub fn axis(self) -> Axis {
        Axis::ALL[self as usize % 3]
    }

    pub fn name(self) -> &'static str {
        ["Ex", "Ey", "Ez", "Hx", "Hy", "Hz"][self as usize]
    }

    pub fn symmetry_eigenvalue(self, axis: Axis) -> f64 {
        SYMMETRY_EIGENVALUES[self as usize][axis.index()]
    }
}

impl fmt::Display for FieldComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for FieldComponent {
    type Err = FieldProjError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| FieldProjError::data(format!("unknown field component '{}'", s)))
    }
}

/// Spectral coordinate shared by every component of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum SpectralAxis {
    /// Frequencies in Hz.
    Frequency(Array1<f64>),
    /// Sample times in seconds.
    Time(Array1<f64>),
}

impl SpectralAxis {
    pub fn values(&self) -> &Array1<f64> {
        match self {
            Self::Frequency(values) | Self::Time(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    pub fn is_time(&self) -> bool {
        matches!(self, Self::Time(_))
    }

    /// Frequencies, or a data error for time-domain samples.
    pub fn frequencies(&self) -> Result<&Array1<f64>> {
        match self {
            Self::Frequency(freqs) => Ok(freqs),
            Self::Time(_) => Err(FieldProjError::data(
                "operation requires frequency-domain data",
            )),
        }
    }

    /// Same kind and same samples within tolerance.
    pub fn matches(&self, other: &SpectralAxis) -> bool {
        self.is_time() == other.is_time()
            && self.len() == other.len()
            && self
                .values()
                .iter()
                .zip(other.values())
                .all(|(a, b)| (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0))
    }
}

/// Interpolation stencil for a single target coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Stencil {
    Outside,
    Single(usize),
    Pair(usize, f64),
}

/// Linear interpolation stencil of `target` within sorted `coords`.
/// Targets outside the sampled range yield `Outside` when `bounded`, else clamp to the ends.
pub(crate) fn stencil(coords: &Array1<f64>, target: f64, bounded: bool) -> Stencil {
    let n = coords.len();
    if n == 0 {
        return Stencil::Outside;
    }
    let (first, last) = (coords[0], coords[n - 1]);
    if bounded && (target < first - COORD_TOLERANCE || target > last + COORD_TOLERANCE) {
        return Stencil::Outside;
    }
    if n == 1 || target <= first {
        return Stencil::Single(0);
    }
    if target >= last {
        return Stencil::Single(n - 1);
    }
    let upper = coords.iter().position(|&c| c > target).unwrap_or(n - 1);
    let lower = upper - 1;
    let weight = (target - coords[lower]) / (coords[upper] - coords[lower]);
    Stencil::Pair(lower, weight)
}

/// Index of the coordinate closest to `target`.
pub(crate) fn nearest_index(coords: &Array1<f64>, target: f64) -> usize {
    coords
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - target).abs().total_cmp(&(*b - target).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// A complex scalar field sampled over `(x, y, z, spectral, mode)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    pub coords: [Array1<f64>; 3],
    pub values: Array5<Complex64>,
}

impl ScalarField {
    pub fn new(coords: [Array1<f64>; 3], values: Array5<Complex64>) -> Result<Self> {
        let shape = values.shape();
        for axis in Axis::ALL {
            if shape[axis.index()] != coords[axis.index()].len() {
                return Err(FieldProjError::data(format!(
                    "field has {} samples along {} but {} coordinates",
                    shape[axis.index()],
                    axis,
                    coords[axis.index()].len()
                )));
            }
        }
        Ok(Self { coords, values })
    }

    /// Build a field by evaluating `f(position, spectral_index, mode_index)` at every sample.
    pub fn from_fn<F>(coords: [Array1<f64>; 3], num_spectral: usize, num_modes: usize, f: F) -> Self
    where
        F: Fn([f64; 3], usize, usize) -> Complex64,
    {
        let shape = (
            coords[0].len(),
            coords[1].len(),
            coords[2].len(),
            num_spectral,
            num_modes,
        );
        let values = Array5::from_shape_fn(shape, |(i, j, k, s, m)| {
            f([coords[0][i], coords[1][j], coords[2][k]], s, m)
        });
        Self { coords, values }
    }

    pub fn num_spectral(&self) -> usize {
        self.values.shape()[3]
    }

    pub fn num_modes(&self) -> usize {
        self.values.shape()[4]
    }

    pub fn mapv<F: Fn(Complex64) -> Complex64>(&self, f: F) -> Self {
        Self {
            coords: self.coords.clone(),
            values: self.values.mapv(f),
        }
    }

    /// Multiply every sample by a `(spectral, mode)` factor.
    pub fn scaled(&self, factors: &Array2<Complex64>) -> Self {
        let mut values = self.values.clone();
        for ((s, m), factor) in factors.indexed_iter() {
            values
                .slice_mut(ndarray::s![.., .., .., s, m])
                .mapv_inplace(|v| v * factor);
        }
        Self {
            coords: self.coords.clone(),
            values,
        }
    }

    /// Nearest-neighbour lookup at `targets` along `axis`; the new coordinates are `targets`.
    pub fn select_nearest(&self, axis: Axis, targets: &Array1<f64>) -> Self {
        let coords_axis = &self.coords[axis.index()];
        let indices: Vec<usize> = targets
            .iter()
            .map(|&t| nearest_index(coords_axis, t))
            .collect();
        let mut coords = self.coords.clone();
        coords[axis.index()] = targets.clone();
        Self {
            coords,
            values: self.values.select(ndarray::Axis(axis.index()), &indices),
        }
    }

    /// Linear interpolation to `targets` along `axis`. With `fill`, samples outside the
    /// recorded range take that value; otherwise they clamp to the nearest end.
    pub fn interp(&self, axis: Axis, targets: &Array1<f64>, fill: Option<Complex64>) -> Self {
        let nd_axis = ndarray::Axis(axis.index());
        let mut shape = self.values.raw_dim();
        shape[axis.index()] = targets.len();
        let mut values = Array5::<Complex64>::zeros(shape);

        for (j, &target) in targets.iter().enumerate() {
            let mut lane = values.index_axis_mut(nd_axis, j);
            match stencil(&self.coords[axis.index()], target, fill.is_some()) {
                Stencil::Outside => lane.fill(fill.unwrap_or_default()),
                Stencil::Single(i) => lane.assign(&self.values.index_axis(nd_axis, i)),
                Stencil::Pair(i, w) => {
                    let below = &self.values.index_axis(nd_axis, i) * Complex64::from(1.0 - w);
                    let above = &self.values.index_axis(nd_axis, i + 1) * Complex64::from(w);
                    lane.assign(&(below + above));
                }
            }
        }

        let mut coords = self.coords.clone();
        coords[axis.index()] = targets.clone();
        Self { coords, values }
    }

    /// Drop the singleton `normal` axis, returning `(t1, t2, spectral, mode)` samples.
    pub fn plane(&self, normal: Axis) -> Result<Array4<Complex64>> {
        let len = self.values.shape()[normal.index()];
        if len != 1 {
            return Err(FieldProjError::data(format!(
                "field has {} samples along normal axis {}, expected 1",
                len, normal
            )));
        }
        Ok(self
            .values
            .index_axis(ndarray::Axis(normal.index()), 0)
            .to_owned())
    }

    /// In-plane coordinates for a plane normal to `normal`.
    pub fn plane_coords(&self, normal: Axis) -> [Array1<f64>; 2] {
        normal.plane().map(|axis| self.coords[axis.index()].clone())
    }
}
