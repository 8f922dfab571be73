//! Per-sample event tables.
//!
//! Every table the dataset stores is a Polars `DataFrame` with one contiguous,
//! null-free `Float32` column per channel, in channel order. Keeping that shape
//! lets readers borrow `&[f32]` straight out of the frame.

use crate::error::{DatasetError, Result};
use flowset_gates::{EventSource, GateError};
use polars::prelude::*;
use std::sync::Arc;

/// Shared, immutable event table
pub type EventFrame = Arc<DataFrame>;

/// Reorder, cast and rechunk `df` so it holds exactly `channels` as `Float32`.
///
/// Fails if a channel is missing or contains nulls.
pub fn normalize_frame<S: AsRef<str>>(
    df: &DataFrame,
    channels: &[S],
    context: &str,
) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(channels.len());
    for channel in channels {
        let channel = channel.as_ref();
        let column = df.column(channel).map_err(|_| {
            DatasetError::validation(format!("{context} has no column for channel '{channel}'"))
        })?;
        let series = column.as_materialized_series();
        if series.null_count() > 0 {
            return Err(DatasetError::validation(format!(
                "{context}: channel '{channel}' has {} missing values",
                series.null_count()
            )));
        }
        let series = series.cast(&DataType::Float32)?.rechunk();
        columns.push(Column::from(series));
    }

    if columns.is_empty() {
        return Err(DatasetError::validation(format!("{context} has no channels")));
    }
    Ok(DataFrame::new(columns)?)
}

/// Build a table from plain column vectors
pub fn frame_from_columns<S: AsRef<str>>(
    channels: &[S],
    values: Vec<Vec<f32>>,
) -> Result<DataFrame> {
    if channels.len() != values.len() {
        return Err(DatasetError::count_mismatch(
            "frame columns",
            channels.len(),
            values.len(),
        ));
    }
    let columns = channels
        .iter()
        .zip(values)
        .map(|(name, data)| Column::new(name.as_ref().into(), data))
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Borrow one channel's values
pub fn channel_slice<'a>(df: &'a DataFrame, channel: &str) -> Result<&'a [f32]> {
    let column = df
        .column(channel)
        .map_err(|_| DatasetError::UnknownChannel(channel.to_string()))?;
    Ok(column.as_materialized_series().f32()?.cont_slice()?)
}

/// Gate-facing view over a scatter table
pub struct ScatterView<'a>(pub &'a DataFrame);

impl EventSource for ScatterView<'_> {
    fn event_count(&self) -> usize {
        self.0.height()
    }

    fn events(&self, channel: &str) -> flowset_gates::GateResult<&[f32]> {
        channel_slice(self.0, channel)
            .map_err(|_| GateError::missing_channel(channel, "scatter table"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_reorders_and_casts() {
        let df = DataFrame::new(vec![
            Column::new("RFP".into(), &[1.0f64, 2.0]),
            Column::new("Time".into(), &[0i64, 1]),
            Column::new("GFP".into(), &[3i32, 4]),
        ])
        .unwrap();

        let out = normalize_frame(&df, &["GFP", "RFP"], "sample 1").unwrap();
        assert_eq!(out.width(), 2);
        assert_eq!(channel_slice(&out, "GFP").unwrap(), &[3.0, 4.0]);
        assert_eq!(channel_slice(&out, "RFP").unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_normalize_rejects_missing_and_nulls() {
        let df = DataFrame::new(vec![Column::new("GFP".into(), &[Some(1.0f32), None])]).unwrap();
        assert!(normalize_frame(&df, &["GFP"], "s").is_err());
        assert!(normalize_frame(&df, &["RFP"], "s").is_err());
    }

    #[test]
    fn test_scatter_view() {
        let df = frame_from_columns(&["FSC-A", "SSC-A"], vec![vec![1.0, 2.0], vec![3.0, 4.0]])
            .unwrap();
        let view = ScatterView(&df);
        assert_eq!(view.event_count(), 2);
        assert_eq!(view.events("SSC-A").unwrap(), &[3.0, 4.0]);
        assert!(view.events("FSC-H").is_err());
    }
}
