//! Electromagnetic field datasets recorded by a monitor.
//!
//! A [`FieldDataset`] bundles up to six [`ScalarField`] components that share one
//! spectral axis and one mode axis, together with the monitor geometry, the grid
//! discretization of the monitor region, the symmetry the data was stored under, and the
//! finite-grid correction factors for planar monitors.
//!
//! Datasets are values: every transform returns a new dataset.

use std::collections::BTreeMap;

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{FieldProjError, Result};
use crate::field::{FieldComponent, FieldKind, ScalarField, SpectralAxis};
use crate::grid::{pop_axis, Axis, Grid};


/// Geometry of the recording monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorBox {
    pub center: [f64; 3],
    pub size: [f64; 3],
    /// Data was interpolated to grid boundaries by the solver.
    #[serde(default)]
    pub colocate: bool,
}

impl MonitorBox {
    pub fn new(center: [f64; 3], size: [f64; 3]) -> Self {
        Self {
            center,
            size,
            colocate: false,
        }
    }

    pub fn colocated(mut self) -> Self {
        self.colocate = true;
        self
    }

    pub fn bounds(&self) -> ([f64; 3], [f64; 3]) {
        let min = [0, 1, 2].map(|i| self.center[i] - self.size[i] / 2.0);
        let max = [0, 1, 2].map(|i| self.center[i] + self.size[i] / 2.0);
        (min, max)
    }

    pub fn zero_dims(&self) -> Vec<Axis> {
        Axis::ALL
            .into_iter()
            .filter(|axis| self.size[axis.index()] == 0.0)
            .collect()
    }

    /// Normal axis of a planar monitor.
    pub fn normal_axis(&self) -> Result<Axis> {
        match self.zero_dims().as_slice() {
            [axis] => Ok(*axis),
            _ => Err(FieldProjError::data(
                "Data must be 2D to get tangential dimensions.",
            )),
        }
    }

    pub fn tangential_axes(&self) -> Result<[Axis; 2]> {
        Ok(self.normal_axis()?.plane())
    }
}

/// Mirror symmetry the data was stored under.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Symmetry {
    /// Per-axis eigenvalue in {-1, 0, 1}; 0 means the data spans the full axis.
    pub eigenvalues: [i8; 3],
    pub center: [f64; 3],
}

impl Default for Symmetry {
    fn default() -> Self {
        Self::none()
    }
}

impl Symmetry {
    pub fn none() -> Self {
        Self {
            eigenvalues: [0; 3],
            center: [0.0; 3],
        }
    }

    pub fn new(eigenvalues: [i8; 3], center: [f64; 3]) -> Result<Self> {
        if eigenvalues.iter().any(|e| !(-1..=1).contains(e)) {
            return Err(FieldProjError::setup(format!(
                "symmetry eigenvalues must be -1, 0 or 1, got {:?}",
                eigenvalues
            )));
        }
        Ok(Self {
            eigenvalues,
            center,
        })
    }

    pub fn is_trivial(&self) -> bool {
        self.eigenvalues.iter().all(|&e| e == 0)
    }
}

/// Finite-grid correction for planar monitors: one factor, or one per `(spectral, mode)`.
#[derive(Debug, Clone, PartialEq)]
pub enum GridCorrection {
    Scalar(Complex64),
    PerSample(Array2<Complex64>),
}

impl Default for GridCorrection {
    fn default() -> Self {
        Self::Scalar(Complex64::new(1.0, 0.0))
    }
}

impl GridCorrection {
    /// Correction factors broadcast to `(num_spectral, num_modes)`.
    pub fn factors(&self, num_spectral: usize, num_modes: usize) -> Result<Array2<Complex64>> {
        match self {
            Self::Scalar(value) => Ok(Array2::from_elem((num_spectral, num_modes), *value)),
            Self::PerSample(values) => {
                let (ns, nm) = values.dim();
                if ns != num_spectral || (nm != num_modes && nm != 1) {
                    return Err(FieldProjError::data(format!(
                        "grid correction has shape ({}, {}), expected ({}, {})",
                        ns, nm, num_spectral, num_modes
                    )));
                }
                Ok(Array2::from_shape_fn((num_spectral, num_modes), |(s, m)| {
                    values[[s, m.min(nm - 1)]]
                }))
            }
        }
    }
}

/// Field components recorded by one monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDataset {
    pub monitor: MonitorBox,
    /// Discretization of the monitor region, with symmetry expanded.
    pub grid: Grid,
    pub spectral: SpectralAxis,
    pub symmetry: Symmetry,
    pub grid_primal_correction: GridCorrection,
    pub grid_dual_correction: GridCorrection,
    components: BTreeMap<FieldComponent, ScalarField>,
}

impl FieldDataset {
    pub fn new(
        monitor: MonitorBox,
        grid: Grid,
        spectral: SpectralAxis,
        components: impl IntoIterator<Item = (FieldComponent, ScalarField)>,
    ) -> Result<Self> {
        let components: BTreeMap<_, _> = components.into_iter().collect();
        let mut num_modes = None;
        for (name, field) in components.iter() {
            if field.num_spectral() != spectral.len() {
                return Err(FieldProjError::data(format!(
                    "component {} has {} spectral samples, dataset has {}",
                    name,
                    field.num_spectral(),
                    spectral.len()
                )));
            }
            match num_modes {
                None => num_modes = Some(field.num_modes()),
                Some(n) if n != field.num_modes() => {
                    return Err(FieldProjError::data(format!(
                        "component {} has {} modes, expected {}",
                        name,
                        field.num_modes(),
                        n
                    )))
                }
                _ => {}
            }
        }
        Ok(Self {
            monitor,
            grid,
            spectral,
            symmetry: Symmetry::none(),
            grid_primal_correction: GridCorrection::default(),
            grid_dual_correction: GridCorrection::default(),
            components,
        })
    }

    pub fn with_symmetry(mut self, symmetry: Symmetry) -> Self {
        self.symmetry = symmetry;
        self
    }

    pub fn with_grid_correction(
        mut self,
        primal: GridCorrection,
        dual: GridCorrection,
    ) -> Result<Self> {
        primal.factors(self.spectral.len(), self.num_modes())?;
        dual.factors(self.spectral.len(), self.num_modes())?;
        self.grid_primal_correction = primal;
        self.grid_dual_correction = dual;
        Ok(self)
    }

    pub fn component(&self, component: FieldComponent) -> Option<&ScalarField> {
        self.components.get(&component)
    }

    pub fn components(&self) -> impl Iterator<Item = (&FieldComponent, &ScalarField)> {
        self.components.iter()
    }

    pub fn num_modes(&self) -> usize {
        self.components
            .values()
            .next()
            .map(ScalarField::num_modes)
            .unwrap_or(1)
    }

    /// Copy of self with the component map replaced.
    pub(crate) fn with_components(&self, components: BTreeMap<FieldComponent, ScalarField>) -> Self {
        Self {
            monitor: self.monitor,
            grid: self.grid.clone(),
            spectral: self.spectral.clone(),
            symmetry: self.symmetry,
            grid_primal_correction: self.grid_primal_correction.clone(),
            grid_dual_correction: self.grid_dual_correction.clone(),
            components,
        }
    }

    /// Apply `f` to every component, keeping everything else.
    pub(crate) fn map_components<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(FieldComponent, &ScalarField) -> Result<ScalarField>,
    {
        let components = self
            .components
            .iter()
            .map(|(name, field)| Ok((*name, f(*name, field)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(self.with_components(components))
    }

    /// Divide each frequency slice by the source amplitude at that frequency.
    pub fn normalize<F: Fn(f64) -> Complex64>(&self, source_spectrum: F) -> Result<Self> {
        let freqs = self.spectral.frequencies()?;
        let num_modes = self.num_modes();
        let factors = Array2::from_shape_fn((freqs.len(), num_modes), |(s, _)| {
            1.0 / source_spectrum(freqs[s])
        });
        self.map_components(|_, field| Ok(field.scaled(&factors)))
    }

    /// Fields of the time-reversed (counter-propagating) solution.
    pub fn time_reversed_copy(&self) -> Self {
        let components = self
            .components
            .iter()
            .map(|(name, field)| {
                let reversed = match name.kind() {
                    FieldKind::E => field.mapv(|v| v.conj()),
                    FieldKind::H => field.mapv(|v| -v.conj()),
                };
                (*name, reversed)
            })
            .collect();
        self.with_components(components)
    }

    /// The two tangential E and H components for a plane normal to `normal`.
    pub(crate) fn tangential_components(normal: Axis) -> [[FieldComponent; 2]; 2] {
        let (_, plane) = pop_axis(Axis::ALL, normal);
        [
            plane.map(|axis| FieldComponent::new(FieldKind::E, axis)),
            plane.map(|axis| FieldComponent::new(FieldKind::H, axis)),
        ]
    }
}
