//! Whole runs: detailed, split, and fast mode seeded from a previous run.

use std::path::Path;

use fastshower_app::{AppError, Application};
use fastshower_core::config::{EnginesConfig, FastConfig, RunConfig};
use fastshower_core::fast::TableError;
use fastshower_stats::histogram::H1;
use fastshower_stats::record::{RecordError, RunRecord};

// ===========================================================================
// Helpers
// ===========================================================================

fn base_config(dir: &Path) -> RunConfig {
    let mut config = RunConfig::default();
    config.run.events = 4;
    config.calorimeter.layers = 5;
    config.export.out = dir.join("histograms.json");
    config
}

fn fast_config(dir: &Path, input: &Path) -> RunConfig {
    let mut config = base_config(dir);
    config.engines.multi = true;
    config.engines.fast = Some(FastConfig {
        input: Some(input.to_path_buf()),
        ..FastConfig::default()
    });
    config
}

fn volume_bin(record: &RunRecord, name: &str) -> usize {
    let usage = record.h2("histEngineVsVolume").unwrap();
    usage.y.labels.iter().position(|l| l == name).unwrap()
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn detailed_run_writes_record_and_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.export.fit = true;
    config.export.geometry = Some(dir.path().join("geometry.ron"));

    let record = Application::new(config).unwrap().run_and_write().unwrap();
    let back = RunRecord::read(&dir.path().join("histograms.json")).unwrap();
    assert_eq!(back.meta.events, 4);
    assert_eq!(back.sequence("electrons").unwrap().values.len(), 4);
    assert_eq!(back.h1("histNElectrons"), record.h1("histNElectrons"));
    assert!(record.fit.is_some());

    let geometry = std::fs::read_to_string(dir.path().join("geometry.ron")).unwrap();
    assert!(geometry.contains("GAPX"));
}

#[test]
fn split_run_steps_each_volume_on_its_owner() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig {
        engines: EnginesConfig::split_pair(),
        ..base_config(dir.path())
    };
    let record = Application::new(config).unwrap().run().unwrap();

    let usage = record.h2("histEngineVsVolume").unwrap();
    let abso = volume_bin(&record, "ABSO");
    let gapx = volume_bin(&record, "GAPX");
    // engine-a (0) owns GAPX, engine-b (1) owns ABSO.
    assert_eq!(usage.content(0, abso), 0.0);
    assert_eq!(usage.content(1, gapx), 0.0);
    assert!(usage.content(1, abso) > 0.0);
    assert!(usage.content(0, gapx) > 0.0);

    let transfers = record.h2("histTransfers").unwrap();
    assert!(transfers.content(0, 1) > 0.0);
    assert!(transfers.content(1, 0) > 0.0);
    assert_eq!(transfers.content(0, 0), 0.0);
    assert_eq!(transfers.content(1, 1), 0.0);
}

#[test]
fn same_seed_same_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig {
        engines: EnginesConfig::split_pair(),
        ..base_config(dir.path())
    };
    let a = Application::new(config.clone()).unwrap().run().unwrap();
    let b = Application::new(config).unwrap().run().unwrap();
    assert_eq!(a, b);
}

#[test]
fn fast_mode_consumes_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    let first = base_config(dir.path());
    let input = first.export.out.clone();
    Application::new(first).unwrap().run_and_write().unwrap();

    let record = Application::new(fast_config(dir.path(), &input))
        .unwrap()
        .run()
        .unwrap();
    assert!(record.meta.fast);
    assert!(record.h1("histFastEdep").unwrap().entries > 0);
    let transfers = record.h2("histTransfers").unwrap();
    // Every hand-off goes to the fast engine (id 1).
    assert_eq!(transfers.integral(), transfers.content(0, 1));

    // The fast engine takes tracks as they enter the gap, so the detailed
    // engine never steps there.
    let usage = record.h2("histEngineVsVolume").unwrap();
    let gapx = volume_bin(&record, "GAPX");
    assert_eq!(usage.content(0, gapx), 0.0);
    assert!(usage.content(0, volume_bin(&record, "ABSO")) > 0.0);
}

#[test]
fn all_zero_input_fails_before_any_event() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("zero.json");
    let record = RunRecord {
        h1: vec![H1::new("histNElectrons", "", 5, 0.0, 5.0)],
        ..RunRecord::default()
    };
    record.write(&input).unwrap();

    let config = fast_config(dir.path(), &input);
    let out = config.export.out.clone();
    let err = Application::new(config).unwrap_err();
    assert!(matches!(
        err,
        AppError::FastInput {
            source: RecordError::Table {
                source: TableError::ZeroSum,
                ..
            },
            ..
        }
    ));
    assert!(!out.exists());
}

#[test]
fn missing_input_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path(), &dir.path().join("absent.json"));
    assert!(matches!(
        Application::new(config),
        Err(AppError::FastInput {
            source: RecordError::Io(_),
            ..
        })
    ));
}
