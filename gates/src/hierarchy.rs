use crate::error::{GateError, Result};
use crate::polygon::PolygonGate;
use crate::traits::EventSource;
use std::collections::HashSet;
use std::sync::Arc;

/// An ordered sequence of polygon gates applied one inside the other.
///
/// Stage `k` only keeps events that also passed stage `k - 1`, so the last
/// stage (the terminal gate) holds the population that survived every stage.
///
/// # Example
///
/// ```rust
/// use flowset_gates::{GateChain, PolygonGate};
///
/// let cells = PolygonGate::new(
///     "cells",
///     "FSC-A",
///     "SSC-A",
///     vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
/// )?;
/// let singlets = PolygonGate::new(
///     "singlets",
///     "FSC-A",
///     "FSC-H",
///     vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
/// )?;
/// let chain = GateChain::new(vec![cells, singlets])?;
/// assert_eq!(chain.terminal().name.as_ref(), "singlets");
/// assert_eq!(chain.parent_of("singlets").map(|p| p.as_ref()), Some("cells"));
/// # Ok::<(), flowset_gates::GateError>(())
/// ```
#[derive(Debug, Clone)]
pub struct GateChain {
    stages: Vec<PolygonGate>,
}

impl GateChain {
    /// Build a chain, rejecting empty chains and duplicate stage names
    pub fn new(stages: Vec<PolygonGate>) -> Result<Self> {
        if stages.is_empty() {
            return Err(GateError::hierarchy_error("Gate chain has no stages"));
        }

        let mut seen = HashSet::with_capacity(stages.len());
        for stage in &stages {
            if !seen.insert(stage.name.clone()) {
                return Err(GateError::hierarchy_error(format!(
                    "Duplicate stage '{}' in gate chain",
                    stage.name
                )));
            }
        }

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[PolygonGate] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The innermost stage
    pub fn terminal(&self) -> &PolygonGate {
        // new() guarantees at least one stage
        &self.stages[self.stages.len() - 1]
    }

    /// Name of the stage evaluated immediately before `name`, if any
    pub fn parent_of(&self, name: &str) -> Option<&Arc<str>> {
        let position = self.stages.iter().position(|s| s.name.as_ref() == name)?;
        position
            .checked_sub(1)
            .map(|parent| &self.stages[parent].name)
    }

    /// Evaluate every stage against `source`, in order.
    ///
    /// Returns one mask per stage, keyed by stage name, each of length
    /// `source.event_count()`.
    pub fn apply(&self, source: &dyn EventSource) -> Result<Vec<(Arc<str>, Vec<bool>)>> {
        let event_count = source.event_count();
        let mut masks: Vec<(Arc<str>, Vec<bool>)> = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let mask = match masks.last() {
                Some((_, parent)) => stage.mask_within(source, parent)?,
                None => stage.mask(source)?,
            };
            if mask.len() != event_count {
                return Err(GateError::length_mismatch(
                    "stage mask",
                    event_count,
                    mask.len(),
                )
                .with_context(stage.name.as_ref()));
            }
            masks.push((stage.name.clone(), mask));
        }

        Ok(masks)
    }
}
