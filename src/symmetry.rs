//! Symmetry expansion and finite-grid correction.
//!
//! Solvers exploiting mirror symmetry store fields on one side of the symmetry center
//! only. Expansion rebuilds the full-domain field: for every target coordinate on the
//! mirrored side, the stored value at the reflected position is looked up (nearest
//! neighbour) and multiplied by `symmetry_eigenvalue * component_eigenvalue`.
//!
//! Planar monitors additionally carry primal and dual correction factors. Which one
//! applies to a component depends on the sign of its eigenvalue along the monitor normal.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use num_complex::Complex64;

use crate::dataset::FieldDataset;
use crate::error::Result;
use crate::field::{FieldComponent, ScalarField};
use crate::grid::Axis;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{GridCorrection, MonitorBox, Symmetry};
    use crate::field::SpectralAxis;
    use crate::grid::Grid;
    use approx::assert_relative_eq;
    use ndarray::Array5;
    use rand::Rng;

    fn half_domain(symmetry: [i8; 3]) -> FieldDataset {
        // full grid spans [-1, 1] in x; data stored for x >= 0 only
        let grid = Grid::uniform([-1.0, -0.5, -0.5], [1.0, 0.5, 0.5], [4, 1, 1]).unwrap();
        let monitor = MonitorBox::new([0.0; 3], [2.0, 1.0, 1.0]);
        let spectral = SpectralAxis::Frequency(Array1::from(vec![1e14]));
        let components = FieldComponent::ALL.map(|c| {
            let mut coords = grid.field_coords(c);
            coords[0] = coords[0].iter().copied().filter(|&x| x >= 0.0).collect();
            let field = ScalarField::from_fn(coords, 1, 1, |[x, _, _], _, _| {
                Complex64::new(1.0 + x, 0.0)
            });
            (c, field)
        });
        FieldDataset::new(monitor, grid, spectral, components)
            .unwrap()
            .with_symmetry(Symmetry::new(symmetry, [0.0; 3]).unwrap())
    }

    #[test]
    fn expansion_mirrors_with_eigenvalues() {
        let data = half_domain([1, 0, 0]);
        let expanded = data.symmetry_expanded();
        assert!(expanded.symmetry.is_trivial());

        // Ex sits on cell centers along x: -0.75, -0.25, 0.25, 0.75
        let ex = expanded.component(FieldComponent::Ex).unwrap();
        assert_eq!(ex.coords[0].len(), 4);
        assert_relative_eq!(ex.values[[0, 0, 0, 0, 0]].re, -1.75);
        assert_relative_eq!(ex.values[[3, 0, 0, 0, 0]].re, 1.75);

        // Hy flips along x, Hx does not
        let hx = expanded.component(FieldComponent::Hx).unwrap();
        let hy = expanded.component(FieldComponent::Hy).unwrap();
        assert_relative_eq!(hx.values[[1, 0, 0, 0, 0]].re, 1.5);
        assert!(hy.values[[1, 0, 0, 0, 0]].re < 0.0);
    }

    #[test]
    fn antisymmetric_expansion_negates_the_other_way() {
        let even = half_domain([1, 0, 0]).symmetry_expanded();
        let odd = half_domain([-1, 0, 0]).symmetry_expanded();
        let ey_even = even.component(FieldComponent::Ey).unwrap();
        let ey_odd = odd.component(FieldComponent::Ey).unwrap();
        assert_relative_eq!(ey_even.values[[0, 0, 0, 0, 0]].re, -ey_odd.values[[0, 0, 0, 0, 0]].re);
        assert_relative_eq!(ey_even.values[[3, 0, 0, 0, 0]].re, ey_odd.values[[3, 0, 0, 0, 0]].re);
    }

    #[test]
    fn expansion_without_symmetry_is_identity() {
        let mut rng = rand::rng();
        let grid = Grid::uniform([0.0; 3], [1.0; 3], [3, 2, 1]).unwrap();
        let monitor = MonitorBox::new([0.5; 3], [1.0; 3]);
        let spectral = SpectralAxis::Frequency(Array1::from(vec![1e14, 3e14]));
        let components = FieldComponent::ALL.map(|c| {
            let coords = grid.field_coords(c);
            let shape = (coords[0].len(), coords[1].len(), coords[2].len(), 2, 1);
            let values = Array5::from_shape_simple_fn(shape, || {
                Complex64::new(rng.random::<f64>(), rng.random::<f64>())
            });
            (c, ScalarField::new(coords, values).unwrap())
        });
        let data = FieldDataset::new(monitor, grid, spectral, components).unwrap();
        assert_eq!(data.symmetry_expanded(), data);
        assert_eq!(data.symmetry_expanded().symmetry_expanded(), data);
    }

    #[test]
    fn grid_corrected_copy_applies_primal_and_dual() {
        let grid = Grid::uniform([0.0, 0.0, -0.05], [1.0, 1.0, 0.05], [2, 2, 1]).unwrap();
        let monitor = MonitorBox::new([0.5, 0.5, 0.0], [1.0, 1.0, 0.0]);
        let spectral = SpectralAxis::Frequency(Array1::from(vec![1e14]));
        let one = |c: FieldComponent| {
            let mut coords = grid.field_coords(c);
            coords[2] = Array1::from(vec![0.0]);
            (c, ScalarField::from_fn(coords, 1, 1, |_, _, _| Complex64::new(1.0, 0.0)))
        };
        let data = FieldDataset::new(
            monitor,
            grid.clone(),
            spectral,
            [one(FieldComponent::Ex), one(FieldComponent::Hx)],
        )
        .unwrap()
        .with_grid_correction(
            GridCorrection::Scalar(Complex64::new(2.0, 0.0)),
            GridCorrection::Scalar(Complex64::new(3.0, 0.0)),
        )
        .unwrap();
        let corrected = data.grid_corrected_copy().unwrap();
        // Ex is primal along z, Hx is dual along z
        assert_relative_eq!(corrected.component(FieldComponent::Ex).unwrap().values[[0, 0, 0, 0, 0]].re, 2.0);
        assert_relative_eq!(corrected.component(FieldComponent::Hx).unwrap().values[[0, 0, 0, 0, 0]].re, 3.0);
        assert_eq!(corrected.grid_primal_correction, GridCorrection::default());
    }
}

impl FieldDataset {
    /// Coordinates of `component` on the expanded grid.
    pub(crate) fn expanded_field_coords(&self, component: FieldComponent) -> [Array1<f64>; 3] {
        if self.monitor.colocate {
            self.grid.colocated_coords()
        } else {
            self.grid.field_coords(component)
        }
    }

    /// Full-domain copy of the data with symmetry cleared. Identity when no symmetry is set.
    pub fn symmetry_expanded(&self) -> FieldDataset {
        if self.symmetry.is_trivial() {
            return self.clone();
        }

        let components: BTreeMap<_, _> = self
            .components()
            .map(|(name, field)| (*name, self.expand_component(*name, field)))
            .collect();

        let mut expanded = self.with_components(components);
        expanded.symmetry.eigenvalues = [0; 3];
        expanded
    }

    fn expand_component(&self, name: FieldComponent, field: &ScalarField) -> ScalarField {
        let target_coords = self.expanded_field_coords(name);
        let mut field = field.clone();

        for axis in Axis::ALL {
            let sym = self.symmetry.eigenvalues[axis.index()];
            if sym == 0 {
                continue;
            }
            let center = self.symmetry.center[axis.index()];
            let coords = &target_coords[axis.index()];

            let flipped: Vec<usize> = coords
                .iter()
                .enumerate()
                .filter(|(_, c)| **c < center)
                .map(|(i, _)| i)
                .collect();
            let mirrored = coords.mapv(|c| if c < center { 2.0 * center - c } else { c });

            field = field.select_nearest(axis, &mirrored);
            field.coords[axis.index()] = coords.clone();

            let factor = Complex64::from(f64::from(sym) * name.symmetry_eigenvalue(axis));
            for i in flipped {
                field
                    .values
                    .index_axis_mut(ndarray::Axis(axis.index()), i)
                    .mapv_inplace(|v| v * factor);
            }
        }
        field
    }

    /// Correction factors `(spectral, mode)` that apply to `component` on a plane normal to `normal`.
    pub(crate) fn grid_correction_for(
        &self,
        component: FieldComponent,
        normal: Axis,
    ) -> Result<Array2<Complex64>> {
        let correction = if component.symmetry_eigenvalue(normal) < 0.0 {
            &self.grid_dual_correction
        } else {
            &self.grid_primal_correction
        };
        correction.factors(self.spectral.len(), self.num_modes())
    }

    /// Symmetry-expanded copy with grid correction applied to the stored values and the
    /// correction factors reset to one. Non-planar data is only expanded.
    pub fn grid_corrected_copy(&self) -> Result<FieldDataset> {
        let expanded = self.symmetry_expanded();
        let Ok(normal) = self.monitor.normal_axis() else {
            return Ok(expanded);
        };
        let mut corrected =
            expanded.map_components(|name, field| Ok(field.scaled(&self.grid_correction_for(name, normal)?)))?;
        corrected.grid_primal_correction = Default::default();
        corrected.grid_dual_correction = Default::default();
        Ok(corrected)
    }
}
