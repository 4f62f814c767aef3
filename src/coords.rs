//! Conversions between Cartesian, spherical and direction-cosine (k-space) coordinates.
//!
//! Angles follow the physics convention: `theta` is the polar angle from +z and `phi`
//! the azimuth from +x towards +y.

use nalgebra::Vector3;
use num_complex::Complex64;

use crate::grid::{pop_axis, unpop_axis, Axis};
use crate::settings::KSPACE_TOLERANCE;


pub fn car_2_sph(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let r = (x * x + y * y + z * z).sqrt();
    if r == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let theta = (z / r).clamp(-1.0, 1.0).acos();
    let phi = y.atan2(x);
    (r, theta, phi)
}

pub fn sph_2_car(r: f64, theta: f64, phi: f64) -> (f64, f64, f64) {
    let r_sin_theta = r * theta.sin();
    (r_sin_theta * phi.cos(), r_sin_theta * phi.sin(), r * theta.cos())
}

pub fn radial_unit(theta: f64, phi: f64) -> Vector3<f64> {
    Vector3::new(
        theta.sin() * phi.cos(),
        theta.sin() * phi.sin(),
        theta.cos(),
    )
}

pub fn theta_unit(theta: f64, phi: f64) -> Vector3<f64> {
    Vector3::new(
        theta.cos() * phi.cos(),
        theta.cos() * phi.sin(),
        -theta.sin(),
    )
}

pub fn phi_unit(phi: f64) -> Vector3<f64> {
    Vector3::new(-phi.sin(), phi.cos(), 0.0)
}

/// Spherical field components at `(theta, phi)` to a Cartesian vector.
pub fn sph_2_car_field(
    f_r: Complex64,
    f_theta: Complex64,
    f_phi: Complex64,
    theta: f64,
    phi: f64,
) -> Vector3<Complex64> {
    radial_unit(theta, phi).map(Complex64::from) * f_r
        + theta_unit(theta, phi).map(Complex64::from) * f_theta
        + phi_unit(phi).map(Complex64::from) * f_phi
}

/// Cartesian vector to `[r, theta, phi]` components at `(theta, phi)`.
pub fn car_2_sph_field(field: &Vector3<Complex64>, theta: f64, phi: f64) -> [Complex64; 3] {
    [
        field.dot(&radial_unit(theta, phi).map(Complex64::from)),
        field.dot(&theta_unit(theta, phi).map(Complex64::from)),
        field.dot(&phi_unit(phi).map(Complex64::from)),
    ]
}

/// Direction cosines `(ux, uy)` along the in-plane axes of `axis` to `(theta, phi)`.
///
/// The component along `axis` is `sign * sqrt(1 - ux^2 - uy^2)`. Points outside the unit
/// disk have no real direction and map to NaN angles.
pub fn kspace_2_sph(ux: f64, uy: f64, axis: Axis, sign: f64) -> (f64, f64) {
    let rem = 1.0 - ux * ux - uy * uy;
    if rem < -KSPACE_TOLERANCE || !rem.is_finite() {
        return (f64::NAN, f64::NAN);
    }
    let ua = sign * rem.max(0.0).sqrt();
    let [x, y, z] = unpop_axis(ua, [ux, uy], axis);
    let (_, theta, phi) = car_2_sph(x, y, z);
    (theta, phi)
}

/// Direction cosines along the in-plane axes of `axis` for the direction `(theta, phi)`.
pub fn sph_2_kspace(theta: f64, phi: f64, axis: Axis) -> (f64, f64) {
    let dir = radial_unit(theta, phi);
    let (_, [ux, uy]) = pop_axis([dir.x, dir.y, dir.z], axis);
    (ux, uy)
}
