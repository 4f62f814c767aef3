use std::f64::consts::PI;

use approx::assert_relative_eq;
use fieldproj::{
    bins::{BinningScheme, Scheme},
    dataset::{FieldDataset, MonitorBox},
    diffraction::project_diffraction,
    error::FieldProjError,
    field::{FieldComponent, FieldKind, ScalarField, SpectralAxis},
    grid::{Axis, Grid},
    medium::Medium,
    modes::ModeData,
    monitor::{AngleGrid, Direction, ProjectionGrid, ProjectionMonitor, ProjectionSurface},
    problem::{aperture_fields, Problem},
    projected::ProjectedFieldData,
    projection::{FieldProjector, NearFieldSurface, ProjectionWarning},
    settings::{self, Settings, C_0},
};
use ndarray::{Array1, Array2};
use num_complex::Complex64;

fn unit_aperture() -> Settings {
    let mut settings = settings::load_default_config().unwrap();
    settings.wavelength = 1.0;
    settings.aperture_size = [1.0, 1.0];
    settings.aperture_cells = [10, 10];
    settings
}

fn projector(settings: &Settings) -> FieldProjector {
    let aperture = aperture_fields(settings).unwrap();
    FieldProjector::new(
        vec![NearFieldSurface::new(
            aperture,
            ProjectionSurface::new(settings.normal_axis, settings.normal_dir),
        )],
        Medium::vacuum(),
    )
}

fn angle_monitor(theta: Vec<f64>, phi: Vec<f64>, distance: Option<f64>) -> ProjectionMonitor {
    let grid = ProjectionGrid::Angle(AngleGrid {
        theta: Array1::from(theta),
        phi: Array1::from(phi),
        proj_distance: distance,
    });
    ProjectionMonitor::new([0.0; 3], [1.0, 1.0, 0.0], grid)
}

fn max_abs_difference(a: &ProjectedFieldData, b: &ProjectedFieldData) -> (f64, f64) {
    let mut diff: f64 = 0.0;
    let mut scale: f64 = 0.0;
    for (x, y) in a.fields.e.iter().chain(&a.fields.h).zip(b.fields.e.iter().chain(&b.fields.h)) {
        for (u, v) in x.iter().zip(y.iter()) {
            diff = diff.max((u - v).norm());
            scale = scale.max(v.norm());
        }
    }
    (diff, scale)
}

#[test]
fn broadside_power_of_a_unit_aperture() {
    let settings = unit_aperture();
    let monitor = angle_monitor(vec![0.0], vec![0.0], Some(1000.0));
    let projected = projector(&settings).project(&monitor).unwrap();
    let eta = Medium::vacuum().eta().re;
    // U = A^2 / (2 eta lambda^2) at r = 1000
    let expected = 1.0 / (2.0 * eta) / 1e6;
    assert_relative_eq!(projected.power()[[0, 0, 0, 0]], expected, max_relative = 1e-9);
    // no radial component in the far field
    assert_relative_eq!(projected.fields.e[0][[0, 0, 0, 0]].norm(), 0.0, epsilon = 1e-15);
}

#[test]
fn far_field_power_falls_off_with_distance() {
    let settings = unit_aperture();
    let near = projector(&settings)
        .project(&angle_monitor(vec![0.3], vec![0.7], Some(1000.0)))
        .unwrap();
    let far = projector(&settings)
        .project(&angle_monitor(vec![0.3], vec![0.7], Some(2000.0)))
        .unwrap();
    let ratio = near.power()[[0, 0, 0, 0]] / far.power()[[0, 0, 0, 0]];
    assert_relative_eq!(ratio, 4.0, max_relative = 1e-9);

    // a line source spreads over a cylinder instead
    let mut line = unit_aperture();
    line.aperture_size = [1.0, 0.0];
    let projector = projector(&line);
    let near = projector
        .project(&angle_monitor(vec![0.3], vec![0.0], Some(1000.0)))
        .unwrap();
    let far = projector
        .project(&angle_monitor(vec![0.3], vec![0.0], Some(2000.0)))
        .unwrap();
    assert!(near.is_2d);
    let ratio = near.power()[[0, 0, 0, 0]] / far.power()[[0, 0, 0, 0]];
    assert_relative_eq!(ratio, 2.0, max_relative = 1e-9);
}

#[test]
fn renormalized_fields_match_a_direct_projection() {
    let settings = unit_aperture();
    let theta: Vec<f64> = (0..5).map(|i| i as f64 * 0.2).collect();
    let phi = vec![0.0, 0.5 * PI, 1.3];
    let projector = projector(&settings);
    let moved = projector
        .project(&angle_monitor(theta.clone(), phi.clone(), Some(1000.0)))
        .unwrap()
        .renormalize_fields(3500.0)
        .unwrap();
    let direct = projector
        .project(&angle_monitor(theta, phi, Some(3500.0)))
        .unwrap();
    let (diff, scale) = max_abs_difference(&moved, &direct);
    assert!(diff <= 1e-9 * scale, "diff {} against {}", diff, scale);
}

#[test]
fn exact_projection_is_tied_to_its_distance() {
    let settings = unit_aperture();
    let monitor = angle_monitor(vec![0.0], vec![0.0], Some(50.0)).exact();
    let projected = projector(&settings).project(&monitor).unwrap();
    assert!(!projected.far_field_approx);
    assert!(matches!(
        projected.renormalize_fields(100.0),
        Err(FieldProjError::Setup(_))
    ));

    // exact kernel on a 2D aperture is refused
    let mut line = unit_aperture();
    line.aperture_size = [1.0, 0.0];
    assert!(matches!(
        projector(&line).project(&monitor),
        Err(FieldProjError::Setup(_))
    ));
}

#[test]
fn kspace_points_outside_the_light_cone_are_undefined() {
    let settings = unit_aperture();
    let mut problem = Problem::new(settings).unwrap();
    problem.settings.binning = BinningScheme {
        scheme: Scheme::KSpace {
            num_ux: 7,
            num_uy: 1,
            max_u: 1.5,
        },
    };
    problem.settings.proj_distance = None;
    let monitor = problem.monitor().unwrap();
    let projected = problem.projector().project(&monitor).unwrap();

    let power = projected.power();
    // ux = -1.5, -1.0, -0.5, 0.0, 0.5, 1.0, 1.5
    assert!(power[[0, 0, 0, 0]].is_nan());
    assert!(power[[6, 0, 0, 0]].is_nan());
    assert!(power[[3, 0, 0, 0]].is_finite());
    let finite: f64 = power.iter().filter(|p| p.is_finite()).sum();
    let total = projected.total_power()[0];
    assert!(total.is_finite());
    assert_relative_eq!(total, finite, max_relative = 1e-12);
}

#[test]
fn warnings_leave_the_fields_untouched() {
    let settings = unit_aperture();
    let projector = projector(&settings);

    // too close for the far-field approximation, and partly behind the aperture
    let close = angle_monitor(vec![0.0, PI], vec![0.0], Some(0.5));
    let warnings = projector.warnings(&close).unwrap();
    assert!(warnings
        .iter()
        .any(|w| matches!(w, ProjectionWarning::NearFieldDistance { .. })));
    assert!(warnings.contains(&ProjectionWarning::Backward));

    // far enough away, but the polar point still sits behind the aperture
    let quiet = angle_monitor(vec![0.0, PI], vec![0.0], Some(1000.0));
    assert_eq!(projector.warnings(&quiet).unwrap(), vec![ProjectionWarning::Backward]);

    let warned = projector.project(&close).unwrap();
    let expected = projector.project(&quiet).unwrap().renormalize_fields(0.5).unwrap();
    let (diff, scale) = max_abs_difference(&warned, &expected);
    assert!(diff <= 1e-9 * scale, "diff {} against {}", diff, scale);
}

#[test]
fn cartesian_plane_catches_the_beam_on_either_side() {
    for direction in [Direction::Plus, Direction::Minus] {
        let mut settings = unit_aperture();
        settings.aperture_size = [2.0, 2.0];
        settings.aperture_cells = [20, 20];
        settings.normal_dir = direction;
        settings.binning = BinningScheme {
            scheme: Scheme::Cartesian {
                num_1: 121,
                num_2: 121,
                half_width: 6000.0,
            },
        };
        settings.proj_distance = Some(1e4);
        let mut problem = Problem::new(settings).unwrap();
        problem.solve().unwrap();
        let powers = problem.result.as_ref().unwrap().powers.unwrap();
        assert!(powers.input > 0.0);
        let ratio = powers.diffracted / powers.input;
        // the plane only sees the main lobe
        assert!((0.6..1.0).contains(&ratio), "{}: ratio {}", direction, ratio);
    }
}

fn two_mode_plane() -> ModeData {
    let grid = Grid::uniform([-0.5, -0.5, -0.05], [0.6, 0.6, 0.05], [11, 11, 1]).unwrap();
    let monitor = MonitorBox::new([0.0; 3], [1.0, 1.0, 0.0]).colocated();
    let mut coords = grid.colocated_coords();
    coords[2] = Array1::from(vec![0.0]);
    let eta = Medium::vacuum().eta();
    let one = Complex64::new(1.0, 0.0);
    let zero = Complex64::default();
    let profile = move |position: [f64; 3]| one * (1.0 - position[0] * position[0]);
    let component = |name: FieldComponent, values: [Complex64; 2]| {
        let field = ScalarField::from_fn(coords.clone(), 1, 2, move |position, _, m| values[m] * profile(position));
        (name, field)
    };
    let fields = FieldDataset::new(
        monitor,
        grid.clone(),
        SpectralAxis::Frequency(Array1::from(vec![C_0])),
        [
            // mode 0 polarized along x, mode 1 along y
            component(FieldComponent::new(FieldKind::E, Axis::X), [one, zero]),
            component(FieldComponent::new(FieldKind::E, Axis::Y), [zero, one]),
            component(FieldComponent::new(FieldKind::H, Axis::X), [zero, -one / eta]),
            component(FieldComponent::new(FieldKind::H, Axis::Y), [one / eta, zero]),
        ],
    )
    .unwrap();
    let n_complex = Array2::from_shape_vec((1, 2), vec![Complex64::new(1.5, 0.0), Complex64::new(1.4, 0.0)]).unwrap();
    ModeData::new(fields, n_complex).unwrap()
}

#[test]
fn normalized_modes_are_orthonormal() {
    let modes = two_mode_plane().normalized().unwrap();
    let overlap = modes.fields.outer_dot(&modes.fields, true).unwrap();
    assert_eq!(overlap.values.dim(), (1, 2, 2));
    for i in 0..2 {
        for j in 0..2 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_relative_eq!(overlap.values[[0, i, j]].re, expected, epsilon = 1e-9);
            assert_relative_eq!(overlap.values[[0, i, j]].im, 0.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn symmetry_expansion_is_idempotent() {
    let grid = Grid::uniform([-1.0, -0.5, -0.05], [1.0, 0.5, 0.05], [8, 4, 1]).unwrap();
    let monitor = MonitorBox::new([0.0; 3], [2.0, 1.0, 0.0]);
    let components = [FieldComponent::Ex, FieldComponent::Ey, FieldComponent::Hx, FieldComponent::Hy].map(|name| {
        let mut coords = grid.field_coords(name);
        coords[0] = coords[0].iter().copied().filter(|&x| x >= 0.0).collect();
        coords[2] = Array1::from(vec![0.0]);
        let field = ScalarField::from_fn(coords, 1, 1, |[x, y, _], _, _| Complex64::new(1.0 + x, y));
        (name, field)
    });
    let data = FieldDataset::new(
        monitor,
        grid,
        SpectralAxis::Frequency(Array1::from(vec![C_0])),
        components,
    )
    .unwrap()
    .with_symmetry(fieldproj::dataset::Symmetry::new([-1, 0, 0], [0.0; 3]).unwrap());

    let once = data.symmetry_expanded();
    assert!(once.symmetry.is_trivial());
    assert_eq!(once.symmetry_expanded(), once);
    let stored = data.component(FieldComponent::Ex).unwrap();
    let expanded = once.component(FieldComponent::Ex).unwrap();
    assert!(expanded.coords[0].len() > stored.coords[0].len());
}

#[test]
fn diffraction_orders_of_a_tilted_wave() {
    // a wave tilted so that its zeroth order leaves at ux = 0.25
    let period = 2.0;
    let bloch = 0.5;
    let grid = Grid::uniform([-1.0, -1.0, -0.05], [1.1, 1.1, 0.05], [21, 21, 1]).unwrap();
    let monitor = MonitorBox::new([0.0; 3], [period, period, 0.0]).colocated();
    let mut coords = grid.colocated_coords();
    coords[2] = Array1::from(vec![0.0]);
    let eta = Medium::vacuum().eta();
    let kx = 2.0 * PI * bloch / period;
    let wave = move |[x, _, _]: [f64; 3], scale: Complex64| (Complex64::i() * kx * x).exp() * scale;
    let field = |scale: Complex64| ScalarField::from_fn(coords.clone(), 1, 1, move |p, _, _| wave(p, scale));
    let data = FieldDataset::new(
        monitor,
        grid,
        SpectralAxis::Frequency(Array1::from(vec![C_0])),
        [
            (FieldComponent::Ex, field(Complex64::new(1.0, 0.0))),
            (FieldComponent::Ey, field(Complex64::default())),
            (FieldComponent::Hx, field(Complex64::default())),
            (FieldComponent::Hy, field(Complex64::new(1.0, 0.0) / eta)),
        ],
    )
    .unwrap();

    let diffraction = project_diffraction(&data, Direction::Plus, [bloch, 0.0], Medium::vacuum()).unwrap();
    let grid = diffraction.grid();
    let zero_x = grid.orders_x.iter().position(|&m| m == 0).unwrap();
    let zero_y = grid.orders_y.iter().position(|&m| m == 0).unwrap();
    // (0.5 + m) / 2 stays inside the light cone for m = -2..=1
    assert_eq!(grid.orders_x.to_vec(), vec![-2, -1, 0, 1]);
    let (ux, _) = diffraction.reciprocal_vectors(0);
    assert_relative_eq!(ux[zero_x], 0.25, epsilon = 1e-12);

    let power = diffraction.power();
    let main = power[[zero_x, zero_y, 0]];
    assert!(main > 0.0);
    for ((i, j, _), p) in power.indexed_iter() {
        if (i, j) != (zero_x, zero_y) {
            assert!(p.abs() < 1e-9 * main, "order ({}, {}) carries {}", i, j, p);
        }
    }
    let (theta, _) = diffraction.angles();
    assert_relative_eq!(theta[[zero_x, zero_y, 0]], 0.25f64.asin(), epsilon = 1e-12);
}

#[test]
fn invalid_inputs_are_rejected() {
    // lossy background has no RCS
    let settings = unit_aperture();
    let aperture = aperture_fields(&settings).unwrap();
    let lossy = FieldProjector::new(
        vec![NearFieldSurface::new(aperture.clone(), ProjectionSurface::new(Axis::Z, Direction::Plus))],
        Medium::new(Complex64::new(1.5, 0.1)),
    );
    let projected = lossy
        .project(&angle_monitor(vec![0.0], vec![0.0], Some(1000.0)))
        .unwrap();
    assert!(matches!(projected.radar_cross_section(), Err(FieldProjError::Setup(_))));

    // a surface declared along the wrong axis
    let wrong = FieldProjector::new(
        vec![NearFieldSurface::new(aperture.clone(), ProjectionSurface::new(Axis::X, Direction::Plus))],
        Medium::vacuum(),
    );
    assert!(matches!(
        wrong.project(&angle_monitor(vec![0.0], vec![0.0], Some(1000.0))),
        Err(FieldProjError::Setup(_))
    ));

    // no enabled surfaces
    let empty = FieldProjector::new(Vec::new(), Medium::vacuum());
    assert!(empty
        .project(&angle_monitor(vec![0.0], vec![0.0], None))
        .is_err());

    // time-domain data cannot be projected
    let mut timed = aperture;
    timed.spectral = SpectralAxis::Time(Array1::from(vec![0.0]));
    let projector = FieldProjector::new(
        vec![NearFieldSurface::new(timed, ProjectionSurface::new(Axis::Z, Direction::Plus))],
        Medium::vacuum(),
    );
    assert!(matches!(
        projector.project(&angle_monitor(vec![0.0], vec![0.0], None)),
        Err(FieldProjError::Data(_))
    ));
}
