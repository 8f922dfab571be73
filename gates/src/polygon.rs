use super::error::{GateError, Result};
use super::traits::*;
use geo::{Contains, Coord, LineString, Point, Polygon as GeoPolygon};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A named, closed polygon drawn on two scatter channels.
///
/// Vertices are stored in raw data units; the ring is closed implicitly
/// (the last vertex connects back to the first).
///
/// # Example
///
/// ```rust
/// use flowset_gates::{GateBounds, PolygonGate};
/// use std::collections::HashMap;
///
/// let gate = PolygonGate::new(
///     "cells",
///     "FSC-A",
///     "SSC-A",
///     vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)],
/// )?;
/// assert_eq!(gate.bounding_box(), (0.0, 0.0, 100.0, 100.0));
///
/// let mut events: HashMap<String, Vec<f32>> = HashMap::new();
/// events.insert("FSC-A".to_string(), vec![50.0, 150.0]);
/// events.insert("SSC-A".to_string(), vec![50.0, 50.0]);
/// assert_eq!(gate.mask(&events)?, vec![true, false]);
/// # Ok::<(), flowset_gates::GateError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonGate {
    pub name: Arc<str>,
    pub x_channel: Arc<str>,
    pub y_channel: Arc<str>,
    vertices: Vec<(f32, f32)>,
}

impl PolygonGate {
    /// Create a polygon gate, rejecting rings with fewer than 3 vertices or
    /// non-finite coordinates.
    pub fn new(
        name: impl Into<Arc<str>>,
        x_channel: impl Into<Arc<str>>,
        y_channel: impl Into<Arc<str>>,
        vertices: Vec<(f32, f32)>,
    ) -> Result<Self> {
        let name = name.into();
        let x_channel = x_channel.into();
        let y_channel = y_channel.into();

        if name.is_empty() {
            return Err(GateError::invalid_geometry("Gate name must not be empty"));
        }
        if x_channel == y_channel {
            return Err(GateError::invalid_geometry(format!(
                "Gate '{}' uses '{}' on both axes",
                name, x_channel
            )));
        }
        if vertices.len() < 3 {
            return Err(GateError::invalid_geometry(format!(
                "Polygon needs at least 3 vertices, got {}",
                vertices.len()
            ))
            .with_context(name.as_ref()));
        }
        for &(x, y) in &vertices {
            if !x.is_finite() {
                return Err(GateError::invalid_coordinate(x_channel.as_ref(), x));
            }
            if !y.is_finite() {
                return Err(GateError::invalid_coordinate(y_channel.as_ref(), y));
            }
        }

        Ok(Self {
            name,
            x_channel,
            y_channel,
            vertices,
        })
    }

    pub fn vertices(&self) -> &[(f32, f32)] {
        &self.vertices
    }

    fn geo_polygon(&self) -> GeoPolygon<f32> {
        let coords: Vec<Coord<f32>> = self
            .vertices
            .iter()
            .map(|&(x, y)| Coord { x, y })
            .collect();
        GeoPolygon::new(LineString::new(coords), vec![])
    }

    /// Evaluate the gate against every event of `source`.
    ///
    /// Returns one boolean per event, `true` where the (x, y) pair lies inside
    /// the polygon. Points on the boundary are outside.
    pub fn mask(&self, source: &dyn EventSource) -> Result<Vec<bool>> {
        let x_values = source
            .events(&self.x_channel)
            .map_err(|e| e.with_context(self.name.as_ref()))?;
        let y_values = source
            .events(&self.y_channel)
            .map_err(|e| e.with_context(self.name.as_ref()))?;

        if x_values.len() != y_values.len() {
            return Err(GateError::length_mismatch(
                format!("{} vs {}", self.x_channel, self.y_channel),
                x_values.len(),
                y_values.len(),
            )
            .with_context(self.name.as_ref()));
        }

        let polygon = self.geo_polygon();
        let (min_x, min_y, max_x, max_y) = self.bounding_box();

        // Bounding box rejects most events before the precise test
        Ok(x_values
            .par_iter()
            .zip(y_values.par_iter())
            .map(|(&x, &y)| {
                x >= min_x
                    && x <= max_x
                    && y >= min_y
                    && y <= max_y
                    && polygon.contains(&Point::new(x, y))
            })
            .collect())
    }

    /// Evaluate the gate only within the survivors of `parent`
    pub fn mask_within(&self, source: &dyn EventSource, parent: &[bool]) -> Result<Vec<bool>> {
        let own = self.mask(source)?;
        if own.len() != parent.len() {
            return Err(GateError::length_mismatch("parent mask", own.len(), parent.len())
                .with_context(self.name.as_ref()));
        }
        Ok(own
            .into_iter()
            .zip(parent.iter())
            .map(|(inside, &kept)| inside && kept)
            .collect())
    }
}

impl GateBounds for PolygonGate {
    fn bounding_box(&self) -> (f32, f32, f32, f32) {
        self.vertices.iter().fold(
            (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}
