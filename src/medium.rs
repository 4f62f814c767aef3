//! Homogeneous background medium through which fields are projected.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::settings::{C_0, ETA_0};


/// Isotropic, non-dispersive medium described by its complex refractive index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Medium {
    pub refr_index: Complex64,
}

impl Default for Medium {
    fn default() -> Self {
        Self::vacuum()
    }
}

impl Medium {
    pub fn new(refr_index: Complex64) -> Self {
        Self { refr_index }
    }

    pub fn vacuum() -> Self {
        Self::new(Complex64::new(1.0, 0.0))
    }

    /// Relative permittivity.
    pub fn permittivity(&self) -> Complex64 {
        self.refr_index * self.refr_index
    }

    /// Complex wavenumber in rad/µm.
    pub fn wavenumber(&self, frequency: f64) -> Complex64 {
        self.refr_index * (2.0 * PI * frequency / C_0)
    }

    /// Wave impedance in ohms.
    pub fn eta(&self) -> Complex64 {
        ETA_0 / self.refr_index
    }

    /// Wavelength in the medium, in µm.
    pub fn wavelength(&self, frequency: f64) -> f64 {
        C_0 / frequency / self.refr_index.re
    }

    pub fn is_lossy(&self) -> bool {
        self.refr_index.im != 0.0
    }
}
