//! Shared fixtures for the integration tests
#![allow(dead_code)]

use flowset::frame::channel_slice;
use flowset::*;
use polars::prelude::{Column, DataFrame};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::sync::Arc;

pub const CHANNELS: [&str; 2] = ["GFP", "RFP"];
pub const SCATTER: [&str; 3] = ["FSC-A", "FSC-H", "SSC-A"];

pub fn channels() -> Vec<String> {
    CHANNELS.iter().map(|c| c.to_string()).collect()
}

pub fn frame(names: &[&str], columns: Vec<Vec<f32>>) -> DataFrame {
    DataFrame::new(
        names
            .iter()
            .zip(columns)
            .map(|(name, values)| Column::new((*name).into(), values))
            .collect(),
    )
    .unwrap()
}

/// Scatter where cell `i` has FSC-A = 10 * (i + 1), FSC-H = FSC-A / 2, SSC-A = 50.
///
/// With [`MockDeriver`]'s polygons, cells 0..4 pass "cells" and cells 1..4
/// pass "singlets".
pub fn scatter(cells: usize) -> DataFrame {
    let fsc_a: Vec<f32> = (0..cells).map(|i| 10.0 * (i as f32 + 1.0)).collect();
    let fsc_h: Vec<f32> = fsc_a.iter().map(|v| v / 2.0).collect();
    frame(&SCATTER, vec![fsc_a, fsc_h, vec![50.0; cells]])
}

pub fn sample(gfp: Vec<f32>, rfp: Vec<f32>) -> SampleData {
    assert_eq!(gfp.len(), rfp.len());
    SampleData::new(scatter(gfp.len())).with_data("raw", frame(&CHANNELS, vec![gfp, rfp]))
}

/// Random sample with roughly log-normal fluorescence
pub fn random_sample(rng: &mut StdRng, cells: usize) -> SampleData {
    let mut draw = |scale: f32| -> Vec<f32> {
        (0..cells)
            .map(|_| scale * 10f32.powf(rng.random_range(-0.5..3.0)))
            .collect()
    };
    let gfp = draw(1.0);
    let rfp = draw(2.0);
    sample(gfp, rfp)
}

pub fn linear_config() -> DatasetConfig {
    DatasetConfig {
        bin_transform: TransformType::Linear,
        ..Default::default()
    }
}

pub fn small_sample_map() -> DataFrame {
    DataFrame::new(vec![
        Column::new("strain".into(), &["wt", "mutA", "mutB"]),
        Column::new("dose".into(), &[0i32, 10, 10]),
    ])
    .unwrap()
}

/// GFP values of the three samples in [`small_dataset`]
pub fn small_gfp() -> Vec<Vec<f32>> {
    vec![
        vec![0.5, 1.5, 2.5, -0.5, 1.0],
        vec![0.0, 1.99, 2.0, 0.3],
        vec![1.2, 1.1, 0.9],
    ]
}

pub fn small_rfp() -> Vec<Vec<f32>> {
    vec![
        vec![1.0, 2.0, 3.0, 4.0, 5.0],
        vec![-1.0, 0.0, 1.0, 2.0],
        vec![5.0, 5.0, 5.0],
    ]
}

/// Three samples, channels GFP/RFP, only the raw data type, linear binning
pub fn small_dataset() -> FlowDataset {
    let samples = small_gfp()
        .into_iter()
        .zip(small_rfp())
        .map(|(gfp, rfp)| sample(gfp, rfp))
        .collect();
    FlowDataset::new(channels(), small_sample_map(), samples, linear_config()).unwrap()
}

/// One small sample per sample-map row
pub fn dataset_with_map(sample_map: DataFrame) -> FlowDataset {
    let samples = (0..sample_map.height())
        .map(|i| sample(vec![i as f32, 1.0], vec![1.0, i as f32]))
        .collect();
    FlowDataset::new(channels(), sample_map, samples, linear_config()).unwrap()
}

/// Single-color controls (GFP, RFP) and a reference control, 6 cells each
pub fn controls() -> (SampleData, Vec<SampleData>) {
    let reference = sample(vec![1.0; 6], vec![1.0; 6]);
    let single_color = vec![
        sample(vec![100.0, 200.0, 300.0, -5.0, 150.0, 250.0], vec![2.0; 6]),
        sample(vec![2.0; 6], vec![400.0, 500.0, -1.0, 600.0, 700.0, 800.0]),
    ];
    (reference, single_color)
}

/// Derives a fixed two-stage chain and remembers the pooled table size
#[derive(Default)]
pub struct MockDeriver {
    pub pooled_events: Cell<usize>,
}

impl GateDeriver for MockDeriver {
    fn derive(&self, pooled: &DataFrame) -> anyhow::Result<Vec<PolygonGate>> {
        self.pooled_events.set(pooled.height());
        Ok(vec![
            PolygonGate::new(
                "cells",
                "FSC-A",
                "SSC-A",
                vec![(0.0, 0.0), (45.0, 0.0), (45.0, 100.0), (0.0, 100.0)],
            )?,
            PolygonGate::new(
                "singlets",
                "FSC-A",
                "FSC-H",
                vec![(15.0, 0.0), (1000.0, 0.0), (1000.0, 1000.0), (15.0, 1000.0)],
            )?,
        ])
    }
}

pub struct FailingDeriver;

impl GateDeriver for FailingDeriver {
    fn derive(&self, _pooled: &DataFrame) -> anyhow::Result<Vec<PolygonGate>> {
        anyhow::bail!("no populations found")
    }
}

/// MEF = 2 * raw on every channel; counts fits
#[derive(Default)]
pub struct MockFitter {
    pub fits: Cell<usize>,
}

impl BeadFitter for MockFitter {
    fn fit(
        &self,
        _beads: &BeadSpec,
        channels: &[Arc<str>],
        _show_plots: bool,
    ) -> anyhow::Result<CalibrationFit> {
        self.fits.set(self.fits.get() + 1);
        let mut fit = CalibrationFit::default();
        for channel in channels {
            fit.channels.insert(
                channel.clone(),
                ChannelFit {
                    slope: 2.0,
                    intercept: 0.0,
                },
            );
        }
        Ok(fit)
    }
}

fn map_frame(frame: &DataFrame, f: impl Fn(f32) -> f32) -> anyhow::Result<DataFrame> {
    let columns = CHANNELS
        .iter()
        .map(|channel| -> anyhow::Result<Vec<f32>> {
            Ok(channel_slice(frame, channel)?.iter().map(|&v| f(v)).collect())
        })
        .collect::<anyhow::Result<Vec<Vec<f32>>>>()?;
    Ok(frame_of(columns))
}

fn frame_of(columns: Vec<Vec<f32>>) -> DataFrame {
    frame(&CHANNELS, columns)
}

/// What a compensator was asked to do
#[derive(Debug, Clone, PartialEq)]
pub struct SeenRequest {
    pub data_type: String,
    pub gate: String,
    pub samples: usize,
    pub single_color: usize,
}

/// Piecewise: v - 1. Matrix: af = v - 1, compensated = (v - 1) / 2
#[derive(Default)]
pub struct MockCompensator {
    pub seen: RefCell<Option<SeenRequest>>,
}

impl MockCompensator {
    fn record(&self, request: &CompensationRequest<'_>) {
        *self.seen.borrow_mut() = Some(SeenRequest {
            data_type: request.data_type.to_string(),
            gate: request.gate.to_string(),
            samples: request.samples.len(),
            single_color: request.single_color.len(),
        });
    }

    fn stages(gated: &GatedFrame<'_>) -> anyhow::Result<CompensationStages> {
        Ok(CompensationStages {
            autofluorescence_subtracted: map_frame(gated.frame, |v| v - 1.0)?,
            compensated: map_frame(gated.frame, |v| (v - 1.0) / 2.0)?,
        })
    }
}

impl Compensator for MockCompensator {
    fn piecewise(
        &self,
        request: &CompensationRequest<'_>,
        _show_plots: bool,
    ) -> anyhow::Result<Vec<DataFrame>> {
        self.record(request);
        request
            .samples
            .iter()
            .map(|gated| map_frame(gated.frame, |v| v - 1.0))
            .collect()
    }

    fn matrix(
        &self,
        request: &CompensationRequest<'_>,
        _show_plots: bool,
    ) -> anyhow::Result<MatrixCompensation> {
        self.record(request);
        let mut fit_parameters = FitParameters::default();
        for channel in request.channels {
            fit_parameters.insert(channel.clone(), json!({ "spillover": 0.1 }));
        }
        Ok(MatrixCompensation {
            samples: request.samples.iter().map(Self::stages).collect::<anyhow::Result<_>>()?,
            single_color: request
                .single_color
                .iter()
                .map(Self::stages)
                .collect::<anyhow::Result<_>>()?,
            reference: Self::stages(&request.reference)?,
            fit_parameters,
        })
    }
}

/// Bead file that exists for the lifetime of the returned handle
pub fn bead_file() -> tempfile::NamedTempFile {
    tempfile::NamedTempFile::new().unwrap()
}

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(42)
}
