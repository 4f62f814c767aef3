//! Power budget of a projection.
//!
//! The near-field flux through the aperture is split into the part that reaches the
//! observation grid (propagating diffraction orders, or the far-field sphere) and the
//! remainder, which is attributable to evanescent content and discretization error.

use serde::Serialize;
use std::{fmt, ops::*};


/// Power conservation tracking for a projected aperture.
///
/// **Context**: Only a finite set of orders propagate away from a periodic aperture.
/// Comparing their summed power with the flux through the aperture shows how much
/// power stays in evanescent orders or is lost to sampling error. The same split applies
/// to an isolated aperture, with the far-field sphere in place of the orders.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize)]
pub struct Powers {
    pub input: f64,      // near-field flux through the aperture
    pub diffracted: f64, // power in propagating orders or through the far-field sphere
}

impl DivAssign<f64> for Powers {
    fn div_assign(&mut self, rhs: f64) {
        self.input /= rhs;
        self.diffracted /= rhs;
    }
}

impl Add for Powers {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            input: self.input + other.input,
            diffracted: self.diffracted + other.diffracted,
        }
    }
}

impl AddAssign for Powers {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Powers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes power missing from the budget.
    ///
    /// **How it Works**: Subtracts the diffracted power from the input flux. A small
    /// negative value is numerical noise; a large one means the near field was under-sampled.
    pub fn missing(&self) -> f64 {
        self.input - self.diffracted
    }
}

impl fmt::Display for Powers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Powers:")?;
        writeln!(f, "  Input:            {:.6e}", self.input)?;
        writeln!(f, "  Diffracted:       {:.6e}", self.diffracted)?;
        writeln!(f, "  Missing:          {:.6e}", self.missing())
    }
}
