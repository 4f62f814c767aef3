use std::fmt;

use serde::Serialize;

use crate::powers::Powers;
use crate::projected::ProjectedFieldData;


/// Summary of one projection run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Results {
    pub grid: String,
    /// Vacuum wavelength, in micrometres.
    pub wavelength: f64,
    /// Flux through the aperture.
    pub input_power: f64,
    /// Aperture flux against the power crossing the observation surface, when the grid
    /// encloses the aperture or is a plane.
    pub powers: Option<Powers>,
    /// Largest power density on the grid.
    pub peak_power: f64,
    /// Polar and azimuthal angle of the peak, in degrees.
    pub peak_direction: [f64; 2],
    pub warnings: Vec<String>,
}

impl Results {
    /// Collect the summary for the first frequency of `projected`.
    pub fn new(
        projected: &ProjectedFieldData,
        wavelength: f64,
        input_power: f64,
        radiated_power: Option<f64>,
        warnings: Vec<String>,
    ) -> Self {
        let power = projected.power();
        let points = projected.coords_spherical(0);
        let (peak_power, peak_direction) = points
            .indexed_iter()
            .map(|((i, j, k), p)| (power[[i, j, k, 0]], [p.theta.to_degrees(), p.phi.to_degrees()]))
            .filter(|(value, _)| value.is_finite())
            .fold((f64::NAN, [f64::NAN; 2]), |best, item| {
                if best.0.is_nan() || item.0 > best.0 {
                    item
                } else {
                    best
                }
            });

        Self {
            grid: projected.grid.name().to_string(),
            wavelength,
            input_power,
            powers: radiated_power.map(|diffracted| Powers {
                input: input_power,
                diffracted,
            }),
            peak_power,
            peak_direction,
            warnings,
        }
    }
}

impl fmt::Display for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Grid: {}", self.grid)?;
        writeln!(f, "Wavelength: {:.6} um", self.wavelength)?;
        writeln!(f, "Aperture flux: {:.6e}", self.input_power)?;
        writeln!(
            f,
            "Peak power density: {:.6e} at theta {:.2} deg, phi {:.2} deg",
            self.peak_power, self.peak_direction[0], self.peak_direction[1]
        )?;
        if let Some(powers) = &self.powers {
            write!(f, "{}", powers)?;
        }
        for warning in &self.warnings {
            writeln!(f, "Warning: {}", warning)?;
        }
        Ok(())
    }
}
