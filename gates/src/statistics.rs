use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};

/// Counts for a gated population.
///
/// # Example
///
/// ```rust
/// use flowset_gates::MaskStatistics;
///
/// let stats = MaskStatistics::from_mask(&[true, false, true, true]);
/// assert_eq!(stats.event_count, 3);
/// assert_eq!(stats.total_events, 4);
/// assert!((stats.percentage - 75.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    /// Number of events in the gate
    pub event_count: usize,
    /// Number of events the percentage is relative to
    pub total_events: usize,
    /// Percentage of `total_events` (0.0 to 100.0)
    pub percentage: f64,
}

impl MaskStatistics {
    /// Statistics of a mask relative to all events
    pub fn from_mask(mask: &[bool]) -> Self {
        let event_count = mask.iter().filter(|&&kept| kept).count();
        Self::new(event_count, mask.len())
    }

    /// Statistics of a mask relative to the survivors of `parent`
    pub fn relative_to(mask: &[bool], parent: &[bool]) -> Result<Self> {
        if mask.len() != parent.len() {
            return Err(GateError::length_mismatch(
                "parent mask",
                mask.len(),
                parent.len(),
            ));
        }
        let total_events = parent.iter().filter(|&&kept| kept).count();
        let event_count = mask
            .iter()
            .zip(parent)
            .filter(|&(&inside, &kept)| inside && kept)
            .count();
        Ok(Self::new(event_count, total_events))
    }

    fn new(event_count: usize, total_events: usize) -> Self {
        let percentage = if total_events == 0 {
            0.0
        } else {
            event_count as f64 / total_events as f64 * 100.0
        };
        Self {
            event_count,
            total_events,
            percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_mask_has_zero_percentage() {
        let stats = MaskStatistics::from_mask(&[]);
        assert_eq!(stats.event_count, 0);
        assert_eq!(stats.percentage, 0.0);
    }

    #[test]
    fn test_relative_to_parent() {
        let parent = [true, true, false, true];
        let mask = [true, false, true, true];
        let stats = MaskStatistics::relative_to(&mask, &parent).unwrap();
        assert_eq!(stats.event_count, 2);
        assert_eq!(stats.total_events, 3);
        assert_relative_eq!(stats.percentage, 200.0 / 3.0, epsilon = 1e-9);

        assert!(MaskStatistics::relative_to(&mask, &parent[..2]).is_err());
    }
}
