//! Comparison settings.

use serde::{Deserialize, Serialize};

use crate::color::ColorTransform;
use crate::error::{Error, Result};
use crate::image::Decomposition;
use crate::metrics::Metric;
use crate::report::OutputScale;

/// Pyramid depth used for the comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleMode {
    /// Five wavelet scales.
    #[default]
    Multiscale,
    /// The planes as they are, no wavelet transform.
    SingleScale,
}

/// Everything that controls one comparison.
///
/// Use [`CompareConfig::builder`] to get a validated value; a config
/// assembled by hand can be checked with [`CompareConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareConfig {
    pub metric: Metric,

    /// Number of worker threads per sweep.
    pub workers: usize,

    pub scale_mode: ScaleMode,

    /// SSIM masking exponent in (0, 2); `None` disables masking.
    pub masking: Option<f64>,

    /// Log the score of every scale.
    pub by_level: bool,

    pub output_scale: OutputScale,

    /// Conversion applied to three-plane images.
    pub color: ColorTransform,

    /// Produce a per-pixel detection probability map (SSIM only).
    pub error_map: bool,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Ssim,
            workers: 1,
            scale_mode: ScaleMode::Multiscale,
            masking: None,
            by_level: false,
            output_scale: OutputScale::Decibel,
            color: ColorTransform::YCbCr,
            error_map: false,
        }
    }
}

impl CompareConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> CompareConfigBuilder {
        CompareConfigBuilder::default()
    }

    /// Reject settings that can never work, before any pixel is read.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::invalid("worker count must be at least 1"));
        }
        if let Some(m) = self.masking {
            if !(m > 0.0 && m < 2.0) {
                return Err(Error::invalid(format!(
                    "masking exponent {m} outside the open interval (0, 2)"
                )));
            }
            if self.metric != Metric::Ssim {
                return Err(Error::invalid("masking only applies to SSIM"));
            }
        }
        if self.error_map && self.metric != Metric::Ssim {
            return Err(Error::invalid("an error map can only be computed for SSIM"));
        }
        Ok(())
    }

    /// The pyramid both images are decomposed into.
    #[must_use]
    pub fn decomposition(&self) -> Decomposition {
        let base = match self.scale_mode {
            ScaleMode::Multiscale => Decomposition::multiscale(),
            ScaleMode::SingleScale => Decomposition::single_scale(),
        };
        base.with_subbands(self.metric.needs_subbands())
    }
}

/// Builder for [`CompareConfig`].
#[derive(Debug, Default)]
pub struct CompareConfigBuilder {
    config: CompareConfig,
}

impl CompareConfigBuilder {
    #[must_use]
    pub fn metric(mut self, metric: Metric) -> Self {
        self.config.metric = metric;
        self
    }

    /// Set the number of worker threads.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    #[must_use]
    pub fn scale_mode(mut self, mode: ScaleMode) -> Self {
        self.config.scale_mode = mode;
        self
    }

    /// Enable contrast masking with the given exponent.
    #[must_use]
    pub fn masking(mut self, exponent: f64) -> Self {
        self.config.masking = Some(exponent);
        self
    }

    #[must_use]
    pub fn by_level(mut self, enabled: bool) -> Self {
        self.config.by_level = enabled;
        self
    }

    #[must_use]
    pub fn output_scale(mut self, scale: OutputScale) -> Self {
        self.config.output_scale = scale;
        self
    }

    #[must_use]
    pub fn color(mut self, transform: ColorTransform) -> Self {
        self.config.color = transform;
        self
    }

    /// Request the error map.
    #[must_use]
    pub fn error_map(mut self, enabled: bool) -> Self {
        self.config.error_map = enabled;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<CompareConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompareConfig::builder().build().unwrap();
        assert_eq!(config, CompareConfig::default());
        assert_eq!(config.decomposition(), Decomposition::multiscale());
    }

    #[test]
    fn test_decomposition_follows_metric() {
        let vif = CompareConfig::builder().metric(Metric::Vif).build().unwrap();
        assert!(vif.decomposition().retains_subbands());
        let single = CompareConfig::builder()
            .scale_mode(ScaleMode::SingleScale)
            .build()
            .unwrap();
        assert_eq!(single.decomposition().levels(), 1);
    }

    #[test]
    fn test_rejects_bad_settings() {
        let cases = [
            CompareConfig::builder().workers(0),
            CompareConfig::builder().masking(0.0),
            CompareConfig::builder().masking(2.0),
            CompareConfig::builder().masking(f64::NAN),
            CompareConfig::builder().metric(Metric::Vif).masking(1.0),
            CompareConfig::builder().metric(Metric::Vif).error_map(true),
        ];
        for builder in cases {
            assert!(matches!(builder.build(), Err(Error::InvalidParameter(_))));
        }
    }

    #[test]
    fn test_accepts_masking_inside_range() {
        let config = CompareConfig::builder()
            .masking(1.2)
            .workers(8)
            .error_map(true)
            .build()
            .unwrap();
        assert_eq!(config.masking, Some(1.2));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_value(CompareConfig::default()).unwrap();
        assert_eq!(json["scale_mode"], "multiscale");
        assert_eq!(json["color"], "ycbcr");
        assert_eq!(json["output_scale"], "decibel");
    }
}
