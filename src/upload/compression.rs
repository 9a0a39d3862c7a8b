//! Compression settings and progressive degradation.
//!
//! The first upload attempt uses the baseline settings. Every retry
//! re-compresses the original file one step more aggressively (smaller
//! dimensions, lower quality, smaller target size) until each setting hits
//! its floor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressionOptions {
    #[serde(rename = "maxSizeMB")]
    pub max_size_mb: f64,
    pub max_dimension_px: u32,
    /// 0.0 - 1.0
    pub quality: f32,
    pub format: OutputFormat,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_size_mb: 1.0,
            max_dimension_px: 1920,
            quality: 0.8,
            format: OutputFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DegradationPolicy {
    pub dimension_step_px: u32,
    pub min_dimension_px: u32,
    pub quality_step: f32,
    pub min_quality: f32,
    #[serde(rename = "sizeStepMB")]
    pub size_step_mb: f64,
    #[serde(rename = "minSizeMB")]
    pub min_size_mb: f64,
}

impl Default for DegradationPolicy {
    fn default() -> Self {
        Self {
            dimension_step_px: 320,
            min_dimension_px: 800,
            quality_step: 0.1,
            min_quality: 0.4,
            size_step_mb: 0.25,
            min_size_mb: 0.25,
        }
    }
}

/// Settings for a given 1-based upload attempt.
///
/// Floors never push a setting above the baseline.
pub fn options_for_attempt(
    baseline: &CompressionOptions,
    policy: &DegradationPolicy,
    attempt: u32,
) -> CompressionOptions {
    let steps = attempt.saturating_sub(1);

    let dimension_floor = policy.min_dimension_px.min(baseline.max_dimension_px);
    let max_dimension_px = baseline
        .max_dimension_px
        .saturating_sub(policy.dimension_step_px.saturating_mul(steps))
        .max(dimension_floor);

    let quality_floor = policy.min_quality.min(baseline.quality);
    let quality = (baseline.quality - policy.quality_step * steps as f32).max(quality_floor);

    let size_floor = policy.min_size_mb.min(baseline.max_size_mb);
    let max_size_mb = (baseline.max_size_mb - policy.size_step_mb * steps as f64).max(size_floor);

    CompressionOptions {
        max_size_mb,
        max_dimension_px,
        quality,
        format: baseline.format,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_first_attempt_is_baseline() {
        let baseline = CompressionOptions::default();
        let options = options_for_attempt(&baseline, &DegradationPolicy::default(), 1);
        assert_eq!(options, baseline);
    }

    #[test]
    fn test_degradation_steps() {
        let baseline = CompressionOptions::default();
        let policy = DegradationPolicy::default();

        let second = options_for_attempt(&baseline, &policy, 2);
        assert_eq!(second.max_dimension_px, 1600);
        assert!(approx(second.quality as f64, 0.7));
        assert!(approx(second.max_size_mb, 0.75));

        let third = options_for_attempt(&baseline, &policy, 3);
        assert_eq!(third.max_dimension_px, 1280);
        assert!(approx(third.quality as f64, 0.6));
        assert!(approx(third.max_size_mb, 0.5));
        assert_eq!(third.format, OutputFormat::Jpeg);
    }

    #[test]
    fn test_degradation_is_monotonic_and_floored() {
        let baseline = CompressionOptions::default();
        let policy = DegradationPolicy::default();

        let mut previous = options_for_attempt(&baseline, &policy, 1);
        for attempt in 2..=50 {
            let next = options_for_attempt(&baseline, &policy, attempt);
            assert!(next.max_dimension_px <= previous.max_dimension_px);
            assert!(next.quality <= previous.quality);
            assert!(next.max_size_mb <= previous.max_size_mb);

            assert!(next.max_dimension_px >= policy.min_dimension_px);
            assert!(next.quality >= policy.min_quality);
            assert!(next.max_size_mb >= policy.min_size_mb);
            previous = next;
        }

        assert_eq!(previous.max_dimension_px, 800);
        assert!(approx(previous.quality as f64, 0.4));
        assert!(approx(previous.max_size_mb, 0.25));
    }

    #[test]
    fn test_floor_never_raises_a_low_baseline() {
        let baseline = CompressionOptions {
            max_size_mb: 0.1,
            max_dimension_px: 640,
            quality: 0.3,
            format: OutputFormat::Png,
        };
        let options = options_for_attempt(&baseline, &DegradationPolicy::default(), 4);

        assert_eq!(options.max_dimension_px, 640);
        assert!(approx(options.quality as f64, 0.3));
        assert!(approx(options.max_size_mb, 0.1));
        assert_eq!(options.format, OutputFormat::Png);
    }

    #[test]
    fn test_options_json_names() {
        let json = serde_json::to_value(CompressionOptions::default()).unwrap();
        assert_eq!(json["maxSizeMB"], 1.0);
        assert_eq!(json["maxDimensionPx"], 1920);
        assert_eq!(json["format"], "jpeg");
    }
}
