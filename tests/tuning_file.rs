//! Tuning file integration tests: save to disk, load back, and resolve
//! coefficients between calibration heights.

use assert_approx_eq::assert_approx_eq;
use peachy::error::{ConfigError, Error};
use peachy::tuning::{load_tuning, save_tuning, ModulationScheme, TuningCollection, TuningPoint};

fn calibrated() -> TuningCollection {
    let mut tuning = TuningCollection::new(ModulationScheme::Amplitude);
    tuning.build_x_min = -20.0;
    tuning.build_x_max = 20.0;
    tuning.build_y_min = -15.0;
    tuning.build_y_max = 15.0;
    tuning.dwell_x = 20.0;
    tuning.dwell_y = 15.0;
    tuning.drips_per_height = 170.0;
    tuning
        .replace_points(vec![
            TuningPoint {
                x_scale: 0.8,
                rotation: 1.5,
                ..TuningPoint::identity(10.0)
            },
            TuningPoint {
                x_offset: 0.2,
                ..TuningPoint::identity(0.0)
            },
        ])
        .unwrap();
    tuning
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn save_then_load_preserves_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("printer").join("tuning.yaml");
    let tuning = calibrated();

    save_tuning(&path, &tuning).unwrap();
    let loaded = load_tuning(&path).unwrap();

    assert_eq!(loaded, tuning);
    assert_eq!(loaded.points()[0].height, 0.0);
    assert_eq!(loaded.modulation, ModulationScheme::Amplitude);
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_tuning(&dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn hand_edited_duplicate_height_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tuning.yaml");
    save_tuning(&path, &calibrated()).unwrap();

    let yaml = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, yaml.replace("height: 10.0", "height: 0.0")).unwrap();

    let err = load_tuning(&path).unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::DuplicateHeight(h)) if h == 0.0
    ));
}

#[test]
fn unknown_key_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tuning.yaml");
    save_tuning(&path, &calibrated()).unwrap();

    let mut yaml = std::fs::read_to_string(&path).unwrap();
    yaml.push_str("laser_power: 3.0\n");
    std::fs::write(&path, yaml).unwrap();

    assert!(matches!(
        load_tuning(&path).unwrap_err(),
        Error::Config(ConfigError::Yaml(_))
    ));
}

// ---------------------------------------------------------------------------
// Resolution after loading
// ---------------------------------------------------------------------------

#[test]
fn loaded_collection_interpolates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tuning.yaml");
    save_tuning(&path, &calibrated()).unwrap();
    let tuning = load_tuning(&path).unwrap();

    let mid = tuning.point_at(2.5);
    assert_approx_eq!(mid.height, 2.5);
    assert_approx_eq!(mid.x_offset, 0.15);
    assert_approx_eq!(mid.x_scale, 0.95);
    assert_approx_eq!(mid.rotation, 0.375);

    let above = tuning.point_at(50.0);
    assert_eq!(above.height, 50.0);
    assert_eq!(above.x_scale, 0.8);
}
