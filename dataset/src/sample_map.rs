use crate::error::{DatasetError, Result};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One cell of the sample metadata table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Flag(bool),
    Number(f64),
    Text(String),
    Missing,
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Flag(v) => write!(f, "{v}"),
            MetadataValue::Number(v) => write!(f, "{v}"),
            MetadataValue::Text(v) => write!(f, "{v}"),
            MetadataValue::Missing => write!(f, "<missing>"),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Flag(value)
    }
}

/// Per-sample experimental metadata, one row per sample in import order.
///
/// The table is read-only once the dataset is built. Column values are
/// decoded once into [`MetadataValue`]s so lookups don't go back to Polars.
#[derive(Debug, Clone)]
pub struct SampleMap {
    data_frame: DataFrame,
    columns: FxHashMap<String, Vec<MetadataValue>>,
}

impl SampleMap {
    pub fn new(data_frame: DataFrame) -> Result<Self> {
        let mut columns = FxHashMap::default();
        for column in data_frame.get_columns() {
            let values = decode_column(column)?;
            columns.insert(column.name().to_string(), values);
        }
        Ok(Self {
            data_frame,
            columns,
        })
    }

    /// Number of samples described by the map
    pub fn height(&self) -> usize {
        self.data_frame.height()
    }

    pub fn data_frame(&self) -> &DataFrame {
        &self.data_frame
    }

    pub fn column_names(&self) -> Vec<String> {
        self.data_frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Values of one metadata column, indexed by 0-based row
    pub fn values(&self, column: &str) -> Result<&[MetadataValue]> {
        self.columns
            .get(column)
            .map(Vec::as_slice)
            .ok_or_else(|| DatasetError::UnknownColumn(column.to_string()))
    }
}

fn decode_column(column: &Column) -> Result<Vec<MetadataValue>> {
    let series = column.as_materialized_series();
    let values = match series.dtype() {
        DataType::String => series
            .str()?
            .into_iter()
            .map(|v| v.map_or(MetadataValue::Missing, MetadataValue::from))
            .collect(),
        DataType::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| v.map_or(MetadataValue::Missing, MetadataValue::Flag))
            .collect(),
        dtype if dtype.is_primitive_numeric() => {
            let cast = series.cast(&DataType::Float64)?;
            cast.f64()?
                .into_iter()
                .map(|v| v.map_or(MetadataValue::Missing, MetadataValue::Number))
                .collect()
        }
        other => {
            return Err(DatasetError::validation(format!(
                "Sample map column '{}' has unsupported type {:?}",
                column.name(),
                other
            )));
        }
    };
    Ok(values)
}
