//! Axis-aligned rectilinear grids and the staggered (Yee) field locations derived from them.
//!
//! A grid stores per-axis cell boundaries. Cell centers are midpoints of consecutive
//! boundaries. Field components live on either the primal locations (boundaries without
//! the last one) or the dual locations (centers) along each axis, selected by the sign of
//! the component's symmetry eigenvalue along that axis.

use std::fmt;

use ndarray::{s, Array1};
use serde::{Deserialize, Serialize};

use crate::error::{FieldProjError, Result};
use crate::field::FieldComponent;


/// Cartesian axis label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or_else(|| FieldProjError::setup(format!("axis index {} out of range", index)))
    }

    pub fn name(self) -> char {
        ['x', 'y', 'z'][self.index()]
    }

    /// The two in-plane axes for a plane normal to `self`, in (x, y, z) order.
    pub fn plane(self) -> [Axis; 2] {
        pop_axis(Self::ALL, self).1
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Split a triple into its `axis` entry and the remaining two entries.
pub fn pop_axis<T>(values: [T; 3], axis: Axis) -> (T, [T; 2]) {
    let [x, y, z] = values;
    match axis {
        Axis::X => (x, [y, z]),
        Axis::Y => (y, [x, z]),
        Axis::Z => (z, [x, y]),
    }
}

/// Inverse of [`pop_axis`].
pub fn unpop_axis<T>(normal: T, plane: [T; 2], axis: Axis) -> [T; 3] {
    let [a, b] = plane;
    match axis {
        Axis::X => [normal, a, b],
        Axis::Y => [a, normal, b],
        Axis::Z => [a, b, normal],
    }
}

/// Non-uniform rectilinear grid, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    boundaries: [Array1<f64>; 3],
}

impl Grid {
    pub fn new(x: Array1<f64>, y: Array1<f64>, z: Array1<f64>) -> Result<Self> {
        for (axis, bounds) in Axis::ALL.iter().zip([&x, &y, &z]) {
            if bounds.len() < 2 {
                return Err(FieldProjError::setup(format!(
                    "grid along {} needs at least two boundaries, got {}",
                    axis,
                    bounds.len()
                )));
            }
            if bounds.iter().any(|b| !b.is_finite())
                || bounds.windows(2).into_iter().any(|w| w[1] <= w[0])
            {
                return Err(FieldProjError::setup(format!(
                    "grid boundaries along {} must be finite and strictly increasing",
                    axis
                )));
            }
        }
        Ok(Self {
            boundaries: [x, y, z],
        })
    }

    /// Uniform grid with `cells[i]` cells spanning `[min[i], max[i]]`.
    pub fn uniform(min: [f64; 3], max: [f64; 3], cells: [usize; 3]) -> Result<Self> {
        let [x, y, z] = [0, 1, 2].map(|i| Array1::linspace(min[i], max[i], cells[i] + 1));
        Self::new(x, y, z)
    }

    pub fn boundaries(&self, axis: Axis) -> &Array1<f64> {
        &self.boundaries[axis.index()]
    }

    pub fn centers(&self, axis: Axis) -> Array1<f64> {
        let b = self.boundaries(axis);
        (&b.slice(s![1..]) + &b.slice(s![..-1])) / 2.0
    }

    pub fn sizes(&self, axis: Axis) -> Array1<f64> {
        let b = self.boundaries(axis);
        &b.slice(s![1..]) - &b.slice(s![..-1])
    }

    pub fn num_cells(&self, axis: Axis) -> usize {
        self.boundaries(axis).len() - 1
    }

    /// Primal field locations: every boundary except the last.
    pub fn primal(&self, axis: Axis) -> Array1<f64> {
        self.boundaries(axis).slice(s![..-1]).to_owned()
    }

    /// Dual field locations: cell centers.
    pub fn dual(&self, axis: Axis) -> Array1<f64> {
        self.centers(axis)
    }

    /// Staggered coordinates of a field component on this grid.
    pub fn field_coords(&self, component: FieldComponent) -> [Array1<f64>; 3] {
        Axis::ALL.map(|axis| {
            if component.symmetry_eigenvalue(axis) < 0.0 {
                self.dual(axis)
            } else {
                self.primal(axis)
            }
        })
    }

    /// Coordinates used by colocated monitors, identical for every component.
    pub fn colocated_coords(&self) -> [Array1<f64>; 3] {
        Axis::ALL.map(|axis| self.primal(axis))
    }

    /// First and last boundary along `axis`.
    pub fn span(&self, axis: Axis) -> (f64, f64) {
        let b = self.boundaries(axis);
        (b[0], b[b.len() - 1])
    }
}
