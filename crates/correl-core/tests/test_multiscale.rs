#[allow(dead_code)]
mod common;

use ndarray::Array3;

use correl_core::cancel::CancelToken;
use correl_core::error::CorrelError;
use correl_core::register::{
    nearest_power_of_two, register, register_multiscale, MultiscaleConfig, MultiscaleRegistration,
    RegistrationConfig, Status,
};
use correl_core::transform::Phi;
use correl_core::volume::Margin;

#[test]
fn test_nearest_power_of_two() {
    let cases = [(1, 1), (2, 2), (3, 4), (5, 4), (6, 8), (7, 8), (12, 16), (16, 16), (23, 16)];
    for (input, expected) in cases {
        assert_eq!(
            nearest_power_of_two(input).unwrap(),
            expected,
            "nearest power of two to {}",
            input
        );
    }
    assert!(nearest_power_of_two(0).is_err());
}

#[test]
fn test_single_level_matches_register() {
    let shape = [1, 64, 64];
    let blobs = common::blobs_2d(64);
    let reference = common::render(shape, |p| blobs.value(p));
    let truth = Phi::from_translation([0.0, 0.9, 0.4]);
    let moving = common::render_deformed(shape, &truth, |p| blobs.value(p));
    let mut mask = Array3::from_elem((1, 64, 64), false);
    mask[[0, 20, 20]] = true;

    let registration = RegistrationConfig {
        margin: Some(Margin::uniform(8)),
        ..RegistrationConfig::default()
    };
    let config = MultiscaleConfig {
        max_binning: 1,
        registration: registration.clone(),
    };

    let single = register(&reference, &moving, Some(&mask), None, &registration).unwrap();
    let multi = register_multiscale(&reference, &moving, Some(&mask), None, &config).unwrap();

    assert_eq!(multi.phi, single.phi);
    assert_eq!(multi.status, single.status);
    assert_eq!(multi.iterations, single.iterations);
    assert_eq!(multi.error, single.error);
    assert_eq!(multi.phi_centre, single.phi_centre);
}

#[test]
fn test_pyramid_recovers_large_translation() {
    let shape = [1, 128, 128];
    let blobs = common::Blobs::new(8.0, 16.0, 128.0);
    let truth = [0.0, 5.0, -4.0];
    let reference = common::render(shape, |p| blobs.value(p));
    let moving = common::render_deformed(shape, &Phi::from_translation(truth), |p| blobs.value(p));

    let config = MultiscaleConfig {
        max_binning: 4,
        registration: RegistrationConfig {
            margin: Some(Margin::uniform(16)),
            ..RegistrationConfig::default()
        },
    };
    let result = register_multiscale(&reference, &moving, None, None, &config).unwrap();

    assert_eq!(result.status, Status::Converged, "{:?}", result);
    let t = result.phi.translation();
    for axis in 0..3 {
        assert!(
            (t[axis] - truth[axis]).abs() < 0.05,
            "translation {:?} should be ~{:?}",
            t,
            truth
        );
    }
}

#[test]
fn test_non_power_of_two_binning_is_rounded() {
    let shape = [1, 64, 64];
    let blobs = common::blobs_2d(64);
    let reference = common::render(shape, |p| blobs.value(p));
    let moving = common::render_deformed(shape, &Phi::from_translation([0.0, 1.0, 1.0]), |p| {
        blobs.value(p)
    });

    let config = |b: usize| MultiscaleConfig {
        max_binning: b,
        registration: RegistrationConfig {
            margin: Some(Margin::uniform(8)),
            ..RegistrationConfig::default()
        },
    };
    let rounded = register_multiscale(&reference, &moving, None, None, &config(3)).unwrap();
    let exact = register_multiscale(&reference, &moving, None, None, &config(4)).unwrap();
    assert_eq!(rounded.phi, exact.phi);

    assert!(matches!(
        register_multiscale(&reference, &moving, None, None, &config(0)),
        Err(CorrelError::InvalidParameter(_))
    ));
}

#[test]
fn test_cancelled_pyramid_returns_error() {
    let blobs = common::blobs_2d(64);
    let image = common::render([1, 64, 64], |p| blobs.value(p));
    let token = CancelToken::new();
    token.cancel();

    let err = MultiscaleRegistration::new(MultiscaleConfig::default())
        .with_cancel_token(token)
        .run(image.view(), image.view(), None, None)
        .unwrap_err();
    assert!(matches!(err, CorrelError::Cancelled));
}
