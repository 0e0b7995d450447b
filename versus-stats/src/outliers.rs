//! Outlier Detection
//!
//! IQR fences: a value is an outlier when it falls outside
//! `[Q1 - k·IQR, Q3 + k·IQR]`. Fences are inclusive, so a value sitting exactly
//! on one is retained.

use crate::percentiles::quartiles;
use serde::{Deserialize, Serialize};

/// Which fence a value crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundSide {
    /// Below `Q1 - k·IQR`
    Lower,
    /// Above `Q3 + k·IQR`
    Upper,
}

/// Inclusive outlier fences
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierBounds {
    /// Lower fence
    pub lower: f64,
    /// Upper fence
    pub upper: f64,
}

impl OutlierBounds {
    /// IQR fences over `samples` with multiplier `k` (1.5 is Tukey's fence)
    ///
    /// ```
    /// # use versus_stats::{BoundSide, OutlierBounds};
    /// let fences = OutlierBounds::iqr(&[1.0, 2.0, 3.0, 4.0, 5.0, 100.0], 1.5);
    /// assert_eq!(fences.violated_by(100.0), Some(BoundSide::Upper));
    /// assert!(fences.contains(5.0));
    /// ```
    pub fn iqr(samples: &[f64], k: f64) -> Self {
        let (q1, q3) = quartiles(samples);
        let spread = q3 - q1;
        Self {
            lower: q1 - k * spread,
            upper: q3 + k * spread,
        }
    }

    /// The fence `value` violates, if any
    pub fn violated_by(&self, value: f64) -> Option<BoundSide> {
        if value < self.lower {
            Some(BoundSide::Lower)
        } else if value > self.upper {
            Some(BoundSide::Upper)
        } else {
            None
        }
    }

    /// Whether `value` lies within the fences
    pub fn contains(&self, value: f64) -> bool {
        self.violated_by(value).is_none()
    }

    /// The numeric value of a fence
    pub fn bound(&self, side: BoundSide) -> f64 {
        match side {
            BoundSide::Lower => self.lower,
            BoundSide::Upper => self.upper,
        }
    }
}
