//! Waveguide mode data: field profiles paired with complex effective indices.
//!
//! **Context**: a mode solver returns, for each frequency, a handful of eigenmodes of a
//! waveguide cross-section. Each mode has a field profile on the mode plane and a complex
//! effective index `n + ik`. The profiles are consumed by the tangential-field kernel like
//! any other planar dataset; this module adds the mode-specific derived quantities.
//!
//! **How it Works**: every operation returns a new `ModeData`. Reordering by polarization
//! permutes the mode axis of the fields, the effective indices and any per-mode grid
//! correction together, so the three stay aligned.

use std::f64::consts::{LOG10_E, PI};

use ndarray::{Array1, Array2, Array4, Array5};
use num_complex::Complex64;

use crate::dataset::{FieldDataset, GridCorrection};
use crate::error::{FieldProjError, Result};
use crate::field::{stencil, FieldComponent, FieldKind, ScalarField, Stencil};
use crate::grid::{Axis, Grid};
use crate::monitor::Direction;
use crate::settings::C_0;
use crate::tangential::integrate_plane;


/// Which polarization family `filter_polarization` moves to the front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarization {
    Te,
    Tm,
}

/// TE and TM fractions indexed `(frequency, mode)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolFraction {
    pub te: Array2<f64>,
    pub tm: Array2<f64>,
}

/// Mode profiles on a plane with their complex effective indices.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeData {
    pub fields: FieldDataset,
    /// Complex effective index, indexed `(frequency, mode)`.
    pub n_complex: Array2<Complex64>,
}

impl ModeData {
    pub fn new(fields: FieldDataset, n_complex: Array2<Complex64>) -> Result<Self> {
        let expected = (fields.spectral.frequencies()?.len(), fields.num_modes());
        if n_complex.dim() != expected {
            return Err(FieldProjError::data(format!(
                "effective index has shape {:?}, mode fields have {:?}",
                n_complex.dim(),
                expected
            )));
        }
        Ok(Self { fields, n_complex })
    }

    pub fn n_eff(&self) -> Array2<f64> {
        self.n_complex.mapv(|n| n.re)
    }

    pub fn k_eff(&self) -> Array2<f64> {
        self.n_complex.mapv(|n| n.im)
    }

    /// Free-space wavelength of each frequency, in µm.
    pub fn wavelengths(&self) -> Result<Array1<f64>> {
        Ok(self.fields.spectral.frequencies()?.mapv(|f| C_0 / f))
    }

    /// Propagation loss in dB/cm.
    pub fn loss_db_cm(&self) -> Result<Array2<f64>> {
        let lambda_cm = self.wavelengths()?.mapv(|w| w / 1e4);
        let mut loss = self.k_eff();
        for ((f, _), value) in loss.indexed_iter_mut() {
            *value *= 20.0 * 2.0 * PI * LOG10_E / lambda_cm[f];
        }
        Ok(loss)
    }

    /// `∫|F|² dS` of one colocated component, indexed `(frequency, mode)`.
    fn integrated_intensity(&self, fields: &FieldDataset, name: FieldComponent) -> Result<Array2<f64>> {
        let normal = self.fields.monitor.normal_axis()?;
        let field = fields.component(name).ok_or_else(|| {
            FieldProjError::data(format!("Mode field component '{}' missing in mode data.", name))
        })?;
        let squared: Array4<f64> = field.plane(normal)?.mapv(|v| v.norm_sqr());
        integrate_plane(&squared, &self.fields.diff_area()?)
    }

    /// Fraction of the in-plane E intensity along the first tangential axis (TE) and the
    /// remainder (TM).
    pub fn pol_fraction(&self) -> Result<PolFraction> {
        let [t1, t2] = self.fields.tangential_dims()?;
        let fields = self.fields.colocated_fields()?;
        let e1 = self.integrated_intensity(&fields, FieldComponent::new(FieldKind::E, t1))?;
        let e2 = self.integrated_intensity(&fields, FieldComponent::new(FieldKind::E, t2))?;
        let te = &e1 / &(&e1 + &e2);
        let tm = te.mapv(|v| 1.0 - v);
        Ok(PolFraction { te, tm })
    }

    /// Waveguide TE and TM fractions: one minus the share of E (resp. H) intensity along
    /// the propagation axis. They do not sum to one; a TEM mode has both equal to one.
    pub fn pol_fraction_waveguide(&self) -> Result<PolFraction> {
        let normal = self.fields.monitor.normal_axis()?;
        let fields = self.fields.colocated_fields()?;
        let [t1, t2] = normal.plane();
        let transverse_fraction = |kind: FieldKind| -> Result<Array2<f64>> {
            let along = self.integrated_intensity(&fields, FieldComponent::new(kind, normal))?;
            let across = self.integrated_intensity(&fields, FieldComponent::new(kind, t1))?
                + self.integrated_intensity(&fields, FieldComponent::new(kind, t2))?;
            let total = &along + &across;
            Ok((&along / &total).mapv(|v| 1.0 - v))
        };
        Ok(PolFraction {
            te: transverse_fraction(FieldKind::E)?,
            tm: transverse_fraction(FieldKind::H)?,
        })
    }

    /// Every mode scaled to unit flux through the plane. Modes with zero flux are kept as is.
    pub fn normalized(&self) -> Result<Self> {
        let flux = self.fields.flux()?;
        let factors = flux.mapv(|p| {
            let p = p.abs();
            if p > 0.0 {
                Complex64::new(1.0 / p.sqrt(), 0.0)
            } else {
                Complex64::new(1.0, 0.0)
            }
        });
        Ok(Self {
            fields: self.fields.map_components(|_, field| Ok(field.scaled(&factors)))?,
            n_complex: self.n_complex.clone(),
        })
    }

    /// Reorder the modes at every frequency so the requested polarization comes first.
    /// Modes with fraction at least one half lead, then the rest, then modes whose fraction
    /// is undefined; the order within each group is preserved.
    pub fn filter_polarization(&self, polarization: Polarization) -> Result<Self> {
        let pol = self.pol_fraction()?;
        let fraction = match polarization {
            Polarization::Te => pol.te,
            Polarization::Tm => pol.tm,
        };
        let rank = |v: f64| {
            if v.is_nan() {
                2
            } else if v >= 0.5 {
                0
            } else {
                1
            }
        };
        let (nf, nm) = fraction.dim();
        let mut sorting = Array2::<usize>::zeros((nf, nm));
        for (f, row) in fraction.outer_iter().enumerate() {
            let mut order: Vec<usize> = (0..nm).collect();
            order.sort_by_key(|&m| rank(row[m]));
            for (m, &index) in order.iter().enumerate() {
                sorting[[f, m]] = index;
            }
        }
        self.reordered(&sorting)
    }

    /// Permute the mode axis per frequency: new mode `m` at frequency `f` is old mode
    /// `sorting[[f, m]]`.
    fn reordered(&self, sorting: &Array2<usize>) -> Result<Self> {
        let permute = |values: &Array2<Complex64>| {
            Array2::from_shape_fn(values.dim(), |(f, m)| values[[f, sorting[[f, m]]]])
        };
        let permute_correction = |correction: &GridCorrection| match correction {
            GridCorrection::PerSample(values) if values.dim() == sorting.dim() => {
                GridCorrection::PerSample(permute(values))
            }
            other => other.clone(),
        };

        let mut fields = self.fields.map_components(|_, field| {
            let values = Array5::from_shape_fn(field.values.dim(), |(i, j, k, f, m)| {
                field.values[[i, j, k, f, sorting[[f, m]]]]
            });
            ScalarField::new(field.coords.clone(), values)
        })?;
        fields.grid_primal_correction = permute_correction(&self.fields.grid_primal_correction);
        fields.grid_dual_correction = permute_correction(&self.fields.grid_dual_correction);

        Ok(Self {
            fields,
            n_complex: permute(&self.n_complex),
        })
    }

    /// Attach the finite-grid propagation correction for the mode plane of this data.
    pub fn with_grid_correction(&self, angle_theta: f64, direction: Direction) -> Result<Self> {
        let normal = self.fields.monitor.normal_axis()?;
        let (primal, dual) = grid_correction(
            &self.fields.grid,
            normal,
            self.fields.monitor.center[normal.index()],
            &self.n_complex,
            self.fields.spectral.frequencies()?,
            angle_theta,
            direction,
        );
        Ok(Self {
            fields: self.fields.clone().with_grid_correction(primal, dual)?,
            n_complex: self.n_complex.clone(),
        })
    }
}

/// Phase a mode picks up between the grid planes along `normal` and the exact plane
/// `position`, returned as `(primal, dual)` corrections indexed `(frequency, mode)`.
///
/// The mode is taken to vary as `exp(ikx)` along the normal, with `k` measured along the
/// propagation direction tilted by `angle_theta`. The phase at the bracketing primal
/// (boundaries) and dual (centers) planes is linearly interpolated to `position`.
pub fn grid_correction(
    grid: &Grid,
    normal: Axis,
    position: f64,
    n_complex: &Array2<Complex64>,
    frequencies: &Array1<f64>,
    angle_theta: f64,
    direction: Direction,
) -> (GridCorrection, GridCorrection) {
    let primal = grid.boundaries(normal).clone();
    let dual = grid.centers(normal);
    let cos_theta = angle_theta.cos();

    let phase_at = |coords: &Array1<f64>| {
        Array2::from_shape_fn(n_complex.dim(), |(f, m)| {
            let k = n_complex[[f, m]] * (2.0 * PI * frequencies[f] / C_0 / cos_theta) * direction.sign();
            let phase = |x: f64| (Complex64::i() * k * (x - position)).exp();
            match stencil(coords, position, false) {
                Stencil::Pair(lower, w) => phase(coords[lower]) * (1.0 - w) + phase(coords[lower + 1]) * w,
                Stencil::Single(i) => phase(coords[i]),
                Stencil::Outside => Complex64::new(1.0, 0.0),
            }
        })
    };

    (
        GridCorrection::PerSample(phase_at(&primal)),
        GridCorrection::PerSample(phase_at(&dual)),
    )
}
