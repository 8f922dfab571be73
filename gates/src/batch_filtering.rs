//! Batch mask operations
//!
//! Element-wise boolean algebra over per-event gate masks, plus conversions
//! between masks and event index lists. Uses Rayon for the element-wise work.

use crate::error::{GateError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Boolean operation used to cross two or more gates
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum BooleanOperation {
    And,
    Or,
}

/// Combine masks element-wise.
///
/// All masks must share the same length. A single mask is returned unchanged.
pub fn combine_masks(operation: BooleanOperation, masks: &[&[bool]]) -> Result<Vec<bool>> {
    let Some((first, rest)) = masks.split_first() else {
        return Err(GateError::invalid_geometry("No masks to combine"));
    };

    for (i, mask) in rest.iter().enumerate() {
        if mask.len() != first.len() {
            return Err(GateError::length_mismatch(
                format!("mask {} of {}", i + 2, masks.len()),
                first.len(),
                mask.len(),
            ));
        }
    }

    Ok((0..first.len())
        .into_par_iter()
        .map(|event| match operation {
            BooleanOperation::And => masks.iter().all(|mask| mask[event]),
            BooleanOperation::Or => masks.iter().any(|mask| mask[event]),
        })
        .collect())
}

/// Indices (0-based) of the events a mask keeps
pub fn mask_to_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &kept)| kept.then_some(i))
        .collect()
}

/// Batch non-negativity test across several channels of equal length
pub fn non_negative_mask(channels: &[&[f32]]) -> Result<Vec<bool>> {
    let Some((first, rest)) = channels.split_first() else {
        return Err(GateError::invalid_geometry("No channels to threshold"));
    };
    for channel in rest {
        if channel.len() != first.len() {
            return Err(GateError::length_mismatch(
                "non-negative channel",
                first.len(),
                channel.len(),
            ));
        }
    }

    Ok((0..first.len())
        .into_par_iter()
        .map(|event| channels.iter().all(|values| values[event] >= 0.0))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_and_or_masks() {
        let a = [true, true, false, false];
        let b = [true, false, true, false];

        let and = combine_masks(BooleanOperation::And, &[&a[..], &b[..]]).unwrap();
        assert_eq!(and, vec![true, false, false, false]);

        let or = combine_masks(BooleanOperation::Or, &[&a[..], &b[..]]).unwrap();
        assert_eq!(or, vec![true, true, true, false]);
    }

    #[test]
    fn test_three_way_and() {
        let a = [true, true, true];
        let b = [true, false, true];
        let c = [false, true, true];
        let and = combine_masks(BooleanOperation::And, &[&a[..], &b[..], &c[..]]).unwrap();
        assert_eq!(and, vec![false, false, true]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let a = [true, true];
        let b = [true];
        let err = combine_masks(BooleanOperation::Or, &[&a[..], &b[..]]).unwrap_err();
        assert!(matches!(err, GateError::LengthMismatch { .. }));
        assert!(combine_masks(BooleanOperation::Or, &[]).is_err());
    }

    #[test]
    fn test_parse_operation() {
        assert_eq!(
            BooleanOperation::from_str("and").unwrap(),
            BooleanOperation::And
        );
        assert_eq!(BooleanOperation::from_str("OR").unwrap(), BooleanOperation::Or);
        assert!(BooleanOperation::from_str("xor").is_err());
        assert_eq!(BooleanOperation::And.to_string(), "and");
    }

    #[test]
    fn test_mask_to_indices() {
        assert_eq!(mask_to_indices(&[false, true, true, false, true]), vec![1, 2, 4]);
        assert!(mask_to_indices(&[]).is_empty());
    }

    #[test]
    fn test_non_negative_mask() {
        let gfp = [1.0, -0.5, 0.0, 3.0];
        let rfp = [2.0, 1.0, -1.0, 0.0];
        let mask = non_negative_mask(&[&gfp[..], &rfp[..]]).unwrap();
        assert_eq!(mask, vec![true, false, false, true]);
    }
}
