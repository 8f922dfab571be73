//! Tests for N-dimensional binning, auto-binning and observer dispatch

mod common;

use common::*;
use flowset::*;
use ndarray::{Array2, IxDyn, s};
use std::sync::{Arc, Mutex};

fn gfp_axis() -> Vec<(&'static str, Vec<f64>)> {
    vec![("GFP", vec![0.0, 1.0, 2.0])]
}

fn recorder(dataset: &mut FlowDataset) -> (ObserverId, Arc<Mutex<Vec<EventKind>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let id = dataset.subscribe(move |_, event| {
        log.lock().unwrap().push(event.kind());
        Ok(())
    });
    (id, seen)
}

/// Doubles every value
#[derive(Debug)]
struct Doubling;

impl ScaleTransform for Doubling {
    fn transform_matrix(&self, data: Array2<f32>) -> Array2<f32> {
        data * 2.0
    }
}

/// Keeps only the first column
#[derive(Debug)]
struct FirstColumn;

impl ScaleTransform for FirstColumn {
    fn transform_matrix(&self, data: Array2<f32>) -> Array2<f32> {
        data.slice(s![.., ..1]).to_owned()
    }
}

#[test]
fn test_bin_one_channel() {
    let mut dataset = small_dataset();
    dataset.bin(&gfp_axis(), "raw", "all").unwrap();

    let bins = dataset.bins().unwrap();
    assert_eq!(bins.grids().len(), 3);
    assert_eq!(bins.config().shape(), vec![2]);

    let first = bins.sample(1).unwrap();
    assert_eq!(first[IxDyn(&[0])], vec![0]);
    assert_eq!(first[IxDyn(&[1])], vec![1, 4]);
    let second = bins.sample(2).unwrap();
    assert_eq!(second[IxDyn(&[0])], vec![0, 3]);
    assert_eq!(second[IxDyn(&[1])], vec![1]);
    let third = bins.sample(3).unwrap();
    assert_eq!(third[IxDyn(&[0])], vec![2]);
    assert_eq!(third[IxDyn(&[1])], vec![0, 1]);
    assert!(bins.sample(0).is_none());

    let counts = dataset.bin_counts().unwrap();
    assert_eq!(counts[0].as_slice().unwrap(), &[1, 2]);
    assert_eq!(counts[2].as_slice().unwrap(), &[1, 2]);
}

#[test]
fn test_bin_two_channels() {
    let mut dataset = small_dataset();
    dataset
        .bin(
            &[("GFP", vec![0.0, 1.0, 2.0]), ("RFP", vec![0.0, 3.0, 6.0])],
            "raw",
            "all",
        )
        .unwrap();

    let grid = dataset.bins().unwrap().sample(1).unwrap();
    assert_eq!(grid.shape(), &[2, 2]);
    assert_eq!(grid[IxDyn(&[0, 0])], vec![0]);
    assert_eq!(grid[IxDyn(&[1, 0])], vec![1]);
    assert_eq!(grid[IxDyn(&[1, 1])], vec![4]);
    assert!(grid[IxDyn(&[0, 1])].is_empty());
}

#[test]
fn test_bin_is_idempotent() {
    let mut dataset = small_dataset();
    let axes = [("GFP", vec![0.0, 1.0, 2.0]), ("RFP", vec![0.0, 3.0, 6.0])];
    dataset.bin(&axes, "raw", "all").unwrap();
    let first = dataset.bins().unwrap().grids().to_vec();

    dataset.bin(&axes, "raw", "all").unwrap();
    assert_eq!(dataset.bins().unwrap().grids(), first.as_slice());
}

#[test]
fn test_transform_dropping_columns_is_rejected() {
    let mut dataset = small_dataset();
    dataset.set_scale_transform(Arc::new(FirstColumn)).unwrap();
    let err = dataset
        .bin(
            &[("GFP", vec![0.0, 1.0, 2.0]), ("RFP", vec![0.0, 3.0, 6.0])],
            "raw",
            "all",
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    assert!(err.to_string().contains("columns"));
    assert!(err.to_string().contains("expected 2, got 1"));
    assert!(dataset.bins().is_none());
}

#[test]
fn test_bin_indices_refer_to_ungated_cells() {
    let mut dataset = small_dataset();
    dataset
        .set_gate_masks(
            "manual",
            vec![
                vec![false, false, true, true, true],
                vec![true; 4],
                vec![true; 3],
            ],
        )
        .unwrap();
    dataset.bin(&gfp_axis(), "raw", "manual").unwrap();

    let first = dataset.bins().unwrap().sample(1).unwrap();
    assert!(first[IxDyn(&[0])].is_empty());
    assert_eq!(first[IxDyn(&[1])], vec![4]);
}

#[test]
fn test_bin_total_never_exceeds_gated_cells() {
    let mut rng = rng();
    let samples = (0..3).map(|_| random_sample(&mut rng, 500)).collect();
    let mut dataset =
        FlowDataset::new(channels(), small_sample_map(), samples, DatasetConfig::default()).unwrap();
    let edges: Vec<f64> = (0..=20).map(|i| i as f64 * 0.5).collect();
    dataset
        .bin(&[("GFP", edges.clone()), ("RFP", edges)], "raw", "all")
        .unwrap();

    for (grid, sample) in dataset.bins().unwrap().grids().iter().zip(dataset.samples()) {
        let mut cells: Vec<usize> = grid.iter().flatten().copied().collect();
        let binned = cells.len();
        cells.sort_unstable();
        cells.dedup();
        assert_eq!(cells.len(), binned);
        assert!(binned <= sample.cell_count());
    }
}

#[test]
fn test_bin_validation() {
    let mut dataset = small_dataset();
    let none: &[(&str, Vec<f64>)] = &[];
    assert_eq!(dataset.bin(none, "raw", "all").unwrap_err().kind(), ErrorKind::Validation);
    assert!(matches!(
        dataset.bin(&[("BFP", vec![0.0, 1.0])], "raw", "all"),
        Err(DatasetError::UnknownChannel(_))
    ));
    assert!(matches!(
        dataset.bin(&[("GFP", vec![1.0, 0.0])], "raw", "all"),
        Err(DatasetError::InvalidBinEdges { .. })
    ));
    assert!(matches!(
        dataset.bin(&[("GFP", vec![0.0, 1.0]), ("GFP", vec![0.0, 1.0])], "raw", "all"),
        Err(DatasetError::Validation { .. })
    ));
    assert!(matches!(
        dataset.bin(&gfp_axis(), "mef", "all"),
        Err(DatasetError::UnknownDataType(_))
    ));
    assert!(matches!(
        dataset.bin(&gfp_axis(), "raw", "singlets"),
        Err(DatasetError::UnknownGate(_))
    ));
    assert!(dataset.bins().is_none());
    assert!(dataset.bin_config().is_none());
}

#[test]
fn test_recompute_requires_config() {
    let mut dataset = small_dataset();
    assert_eq!(
        dataset.recompute_bins().unwrap_err().kind(),
        ErrorKind::PreconditionNotMet
    );
}

#[test]
fn test_set_bin_config_discards_bins() {
    let mut dataset = small_dataset();
    dataset.bin(&gfp_axis(), "raw", "all").unwrap();
    let (_, seen) = recorder(&mut dataset);

    let config = BinConfig::new(&[("RFP", vec![0.0, 3.0, 6.0])], "raw", "all");
    dataset.set_bin_config(config.clone()).unwrap();
    assert!(dataset.bins().is_none());
    assert_eq!(dataset.bin_config(), Some(&config));
    assert_eq!(*seen.lock().unwrap(), vec![EventKind::BinConfigChanged]);

    // unchanged configuration is a no-op
    dataset.set_bin_config(config).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);

    dataset.recompute_bins().unwrap();
    assert_eq!(dataset.bin_counts().unwrap()[0].as_slice().unwrap(), &[2, 3]);
}

#[test]
fn test_auto_binning_recomputes_on_config_change() {
    let mut dataset = small_dataset();
    let id = dataset.enable_auto_binning();
    assert_eq!(dataset.enable_auto_binning(), id);
    assert_eq!(dataset.observer_count(), 1);
    let (_, seen) = recorder(&mut dataset);

    dataset
        .set_bin_config(BinConfig::new(&gfp_axis(), "raw", "all"))
        .unwrap();
    assert_eq!(dataset.bin_counts().unwrap()[1].as_slice().unwrap(), &[2, 1]);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![EventKind::BinConfigChanged, EventKind::BinsUpdated]
    );

    dataset.disable_auto_binning();
    assert_eq!(dataset.observer_count(), 1);
    dataset
        .set_bin_config(BinConfig::new(&[("GFP", vec![0.0, 3.0])], "raw", "all"))
        .unwrap();
    assert!(dataset.bins().is_none());
}

#[test]
fn test_scale_transform_change_rebins() {
    let mut dataset = small_dataset();
    dataset.enable_auto_binning();
    dataset.bin(&gfp_axis(), "raw", "all").unwrap();
    assert_eq!(dataset.bin_counts().unwrap()[0].as_slice().unwrap(), &[1, 2]);

    // doubled sample 1 GFP: [1.0, 3.0, 5.0, -1.0, 2.0]
    dataset.set_scale_transform(Arc::new(Doubling)).unwrap();
    assert_eq!(dataset.bin_counts().unwrap()[0].as_slice().unwrap(), &[0, 1]);
}

#[test]
fn test_reentrant_notifications_delivered_once() {
    let mut dataset = small_dataset();
    let calls = Arc::new(Mutex::new(0usize));
    let counter = calls.clone();
    dataset.subscribe(move |dataset, event| {
        if let DatasetEvent::GatesAdded(_) = event {
            let n = {
                let mut calls = counter.lock().unwrap();
                *calls += 1;
                *calls
            };
            dataset.add_gates([format!("auto{n}")])?;
        }
        Ok(())
    });

    dataset.add_gates(["manual"]).unwrap();
    assert_eq!(*calls.lock().unwrap(), 1);
    assert!(dataset.gates().contains("auto1"));

    dataset.add_gates(["other"]).unwrap();
    assert_eq!(*calls.lock().unwrap(), 2);
    assert!(dataset.gates().contains("auto2"));
    assert!(!dataset.gates().contains("auto3"));
}

#[test]
fn test_observer_error_keeps_mutation() {
    let mut dataset = small_dataset();
    dataset.subscribe(|_, _| Err(DatasetError::validation("rejected")));
    assert!(dataset.add_gates(["manual"]).is_err());
    assert!(dataset.gates().contains("manual"));
}

#[test]
fn test_unsubscribe_during_dispatch() {
    let mut dataset = small_dataset();
    let target: Arc<Mutex<Option<ObserverId>>> = Arc::new(Mutex::new(None));
    let handle = target.clone();
    dataset.subscribe(move |dataset, _| {
        if let Some(id) = handle.lock().unwrap().take() {
            dataset.unsubscribe(id);
        }
        Ok(())
    });
    let (id, seen) = recorder(&mut dataset);
    *target.lock().unwrap() = Some(id);

    dataset.add_gates(["manual"]).unwrap();
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(dataset.observer_count(), 1);
}

#[test]
fn test_observers_see_pipeline_events() {
    let mut dataset = small_dataset();
    let (_, seen) = recorder(&mut dataset);
    dataset
        .apply_standard_gating(&MockDeriver::default(), &ChainGateApplier)
        .unwrap();
    let (reference, single_color) = controls();
    dataset.add_controls(reference, single_color).unwrap();
    let file = bead_file();
    let beads = BeadSpec::new(file.path(), "URCP-38-2K", "AJ02");
    dataset
        .convert_to_mef(&beads, &beads, &MockFitter::default(), &LinearUnitsApplicator, false)
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            EventKind::GatesAdded,
            EventKind::ControlsRegistered,
            EventKind::DataTypesAdded,
            EventKind::GatesAdded,
        ]
    );
}
