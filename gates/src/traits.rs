use crate::error::{GateError, Result};
use std::collections::HashMap;

/// Trait for per-event data that gates can be evaluated against
///
/// Implement this on whatever holds a sample's scatter (or fluorescence) columns.
/// Every channel returned must have exactly `event_count()` values.
pub trait EventSource {
    /// Number of events (cells) held by the source
    fn event_count(&self) -> usize;

    /// Contiguous values for one channel
    fn events(&self, channel: &str) -> Result<&[f32]>;
}

impl EventSource for HashMap<String, Vec<f32>> {
    fn event_count(&self) -> usize {
        self.values().next().map(Vec::len).unwrap_or(0)
    }

    fn events(&self, channel: &str) -> Result<&[f32]> {
        self.get(channel)
            .map(Vec::as_slice)
            .ok_or_else(|| GateError::missing_channel(channel, "event source"))
    }
}

/// Trait for gate types that have a bounding box
pub trait GateBounds {
    /// Calculate the bounding box (min_x, min_y, max_x, max_y) in raw coordinates
    fn bounding_box(&self) -> (f32, f32, f32, f32);
}
