//! Quantized color scale for the choropleth fill.
//!
//! A continuous domain is cut into as many equal-width buckets as the
//! palette has colors. Values outside the domain clamp to the first or last
//! bucket.

use thiserror::Error;

/// Population domain of the default scale: one person up to the most
/// populous state.
pub const POPULATION_DOMAIN: [f64; 2] = [1.0, 13_369_393.0];

/// Interior seven shades of the nine-class sequential "Blues" scheme
/// (the lightest and darkest classes are dropped).
pub const BLUES_7: [&str; 7] = [
    "#deebf7", "#c6dbef", "#9ecae1", "#6baed6", "#4292c6", "#2171b5", "#08519c",
];

#[derive(Debug, Error, PartialEq)]
pub enum ScaleError {
    #[error("color scale needs at least one color")]
    EmptyRange,
}

#[derive(Debug, Clone)]
pub struct ColorScale {
    range: Vec<String>,
    thresholds: Vec<f64>,
}

impl ColorScale {
    pub fn new(domain: [f64; 2], range: Vec<String>) -> Result<Self, ScaleError> {
        if range.is_empty() {
            return Err(ScaleError::EmptyRange);
        }
        let thresholds = quantize_thresholds(domain, range.len());
        Ok(Self { range, thresholds })
    }

    #[cfg(test)]
    pub(crate) fn population() -> Self {
        Self {
            range: BLUES_7.iter().map(|c| c.to_string()).collect(),
            thresholds: quantize_thresholds(POPULATION_DOMAIN, BLUES_7.len()),
        }
    }

    /// Index of the bucket `value` falls into. A value sitting exactly on a
    /// threshold belongs to the upper bucket.
    pub fn bucket(&self, value: f64) -> usize {
        if value.is_nan() {
            return 0;
        }
        self.thresholds.partition_point(|t| *t <= value)
    }

    pub fn color(&self, value: f64) -> &str {
        &self.range[self.bucket(value)]
    }

    pub fn range(&self) -> &[String] {
        &self.range
    }
}

/// Inner bucket edges splitting `domain` into `buckets` equal widths.
fn quantize_thresholds(domain: [f64; 2], buckets: usize) -> Vec<f64> {
    let [x0, x1] = domain;
    let n = buckets.saturating_sub(1) as f64;
    (0..buckets.saturating_sub(1))
        .map(|i| {
            let i = i as f64;
            ((i + 1.0) * x1 - (i - n) * x0) / (n + 1.0)
        })
        .collect()
}
