use correl_core::mesh::{BoundaryCondition, GlobalCorrelationConfig};
use correl_core::register::{MultiscaleConfig, RegistrationConfig};
use correl_core::resample::Interpolation;
use correl_core::search::{PixelSearchConfig, SearchRange};
use correl_core::volume::Margin;

#[test]
fn test_registration_defaults() {
    let config = RegistrationConfig::default();
    assert_eq!(config.margin, None);
    assert_eq!(config.max_iterations, 25);
    assert_eq!(config.delta_phi_min, 0.001);
    assert_eq!(config.interpolation, Interpolation::Linear);
    assert!(!config.rigid);
    assert_eq!(config.phi_init_bin_ratio, 1.0);
}

#[test]
fn test_empty_toml_gives_defaults() {
    let registration: RegistrationConfig = toml::from_str("").unwrap();
    assert_eq!(registration, RegistrationConfig::default());

    let multiscale: MultiscaleConfig = toml::from_str("").unwrap();
    assert_eq!(multiscale, MultiscaleConfig::default());
    assert_eq!(multiscale.max_binning, 4);

    let search: PixelSearchConfig = toml::from_str("").unwrap();
    assert_eq!(search.search_range, SearchRange::symmetric([0, 5, 5]));

    let global: GlobalCorrelationConfig = toml::from_str("").unwrap();
    assert_eq!(global, GlobalCorrelationConfig::default());
}

#[test]
fn test_partial_toml_overrides() {
    let text = r#"
        max_binning = 8

        [registration]
        margin = [0, 6, 6]
        interpolation = "cubic"
        rigid = true
    "#;
    let config: MultiscaleConfig = toml::from_str(text).unwrap();
    assert_eq!(config.max_binning, 8);
    assert_eq!(config.registration.margin, Some(Margin([0, 6, 6])));
    assert_eq!(config.registration.interpolation, Interpolation::Cubic);
    assert!(config.registration.rigid);
    assert_eq!(config.registration.max_iterations, 25);
}

#[test]
fn test_config_toml_roundtrip() {
    let config = PixelSearchConfig {
        search_range: SearchRange {
            z: [-1, 2],
            y: [-3, 3],
            x: [0, 4],
        },
        search_centre: Some([1.0, 10.5, 12.5]),
    };
    let text = toml::to_string_pretty(&config).unwrap();
    let back: PixelSearchConfig = toml::from_str(&text).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_unknown_interpolation_is_rejected() {
    let result: Result<RegistrationConfig, _> = toml::from_str(r#"interpolation = "quintic""#);
    assert!(result.is_err());
}

#[test]
fn test_boundary_condition_deserializes() {
    #[derive(serde::Deserialize)]
    struct File {
        bc: Vec<BoundaryCondition>,
    }
    let file: File = toml::from_str(
        r#"
        [[bc]]
        node = 3
        axis = 1
        displacement = -0.5
        "#,
    )
    .unwrap();
    assert_eq!(file.bc, vec![BoundaryCondition::new(3, 1, -0.5)]);
}
