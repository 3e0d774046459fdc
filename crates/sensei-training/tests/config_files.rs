use std::fs;

use sensei_training::{TrainingConfig, TrainingError, World};

#[test]
fn test_load_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train.json");
    fs::write(
        &path,
        r#"{
            "regularizations": { "base": { "l1": 1.0, "l2": 0.5 } },
            "inertia_factor": 0.5,
            "thread_count": 2,
            "allow_undo": false,
            "lift_fractions": [0.01, 0.1]
        }"#,
    )
    .unwrap();

    let config = TrainingConfig::from_file(&path).unwrap();
    assert_eq!(config.regularizations.base.l1, 1.0);
    assert_eq!(config.regularizations.base.l2, 0.5);
    assert_eq!(config.inertia_factor, 0.5);
    assert!(!config.allow_undo);
    assert_eq!(config.step_multiplier, 1.0);

    let world = World::new(config.clone()).unwrap();
    assert_eq!(world.config(), &config);
}

#[test]
fn test_config_file_errors() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("missing.json");
    let err = TrainingConfig::from_file(&missing).unwrap_err();
    assert!(matches!(err, TrainingError::ConfigIo { .. }));
    assert!(err.to_string().contains("missing.json"));

    let malformed = dir.path().join("malformed.json");
    fs::write(&malformed, "{ not json").unwrap();
    assert!(matches!(
        TrainingConfig::from_file(&malformed),
        Err(TrainingError::ConfigJson(_))
    ));

    let out_of_range = dir.path().join("range.json");
    fs::write(&out_of_range, r#"{ "lift_fractions": [1.5] }"#).unwrap();
    assert!(matches!(
        TrainingConfig::from_file(&out_of_range),
        Err(TrainingError::InvalidLiftFraction(f)) if f == 1.5
    ));
}

#[test]
fn test_world_rejects_invalid_config() {
    let config = TrainingConfig {
        step_multiplier: 0.5,
        ..TrainingConfig::default()
    };
    assert!(matches!(
        World::new(config),
        Err(TrainingError::InvalidConfig(_))
    ));
}
