//! End-to-end comparison of two images.
//!
//! [`Comparison`] validates its [`CompareConfig`], loads both images,
//! checks that their shapes agree, converts colour, runs the configured
//! engine and wraps the result into a [`ComparisonReport`].

use std::path::Path;

use tracing::{debug, info};

use crate::config::CompareConfig;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::metrics::{ErrorMap, Metric, Ssim, Vif};
use crate::pnm::PnmReader;
use crate::report::ComparisonReport;

/// Result of [`Comparison::compare_files`] and
/// [`Comparison::compare_images`].
#[derive(Debug)]
pub struct ComparisonOutcome {
    pub report: ComparisonReport,
    /// Present when the configuration asked for one.
    pub error_map: Option<ErrorMap>,
}

/// A configured comparison, reusable for many image pairs.
#[derive(Debug, Clone)]
pub struct Comparison {
    config: CompareConfig,
}

impl Comparison {
    #[must_use]
    pub fn new(config: CompareConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    /// Compare two PNM files.
    ///
    /// The configuration is validated before either file is opened, and
    /// both headers are checked against each other before any sample is
    /// read.
    pub fn compare_files(
        &self,
        reference: impl AsRef<Path>,
        distorted: impl AsRef<Path>,
    ) -> Result<ComparisonOutcome> {
        self.config.validate()?;
        let (reference, distorted) = (reference.as_ref(), distorted.as_ref());
        let ref_reader = PnmReader::open(reference)?;
        let dist_reader = PnmReader::open(distorted)?;
        let (rh, dh) = (*ref_reader.header(), *dist_reader.header());
        if rh.planes != dh.planes {
            return Err(Error::ComponentCountMismatch {
                expected: rh.planes,
                actual: dh.planes,
            });
        }
        if rh.dimensions() != dh.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: rh.dimensions(),
                actual: dh.dimensions(),
            });
        }

        let decomposition = self.config.decomposition();
        debug!(
            reference = %reference.display(),
            distorted = %distorted.display(),
            levels = decomposition.levels(),
            "decoding images"
        );
        let a = ref_reader.decode(decomposition)?;
        let b = dist_reader.decode(decomposition)?;

        let mut outcome = self.compare_images(a, b)?;
        outcome.report.reference = Some(reference.to_path_buf());
        outcome.report.distorted = Some(distorted.to_path_buf());
        Ok(outcome)
    }

    /// Compare two decomposed images. Both must have been built with
    /// [`CompareConfig::decomposition`].
    pub fn compare_images(
        &self,
        mut reference: Image,
        mut distorted: Image,
    ) -> Result<ComparisonOutcome> {
        let config = &self.config;
        config.validate()?;
        let expected = config.decomposition();
        for image in [&reference, &distorted] {
            if image.decomposition() != expected {
                return Err(Error::invalid(format!(
                    "image decomposed into {} scales (subbands: {}), expected {} (subbands: {})",
                    image.decomposition().levels(),
                    image.decomposition().retains_subbands(),
                    expected.levels(),
                    expected.retains_subbands()
                )));
            }
        }
        if reference.component_count() != distorted.component_count() {
            return Err(Error::ComponentCountMismatch {
                expected: reference.component_count(),
                actual: distorted.component_count(),
            });
        }
        if reference.dimensions() != distorted.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: reference.dimensions(),
                actual: distorted.dimensions(),
            });
        }

        config.color.apply(&mut reference)?;
        config.color.apply(&mut distorted)?;

        let (width, height) = reference.dimensions();
        let mut error_map = config.error_map.then(|| ErrorMap::new(width, height));
        let metric_report = match config.metric {
            Metric::Ssim => Ssim::new(config.workers, config.by_level, config.masking)?
                .compare(&reference, &distorted, error_map.as_mut())?,
            Metric::Vif => {
                Vif::new(config.workers, config.by_level)?.compare(&reference, &distorted)?
            }
        };

        let value = config.output_scale.apply(metric_report.score);
        info!(
            metric = config.metric.name(),
            score = metric_report.score,
            value,
            "comparison finished"
        );
        let report = ComparisonReport {
            reference: None,
            distorted: None,
            metric: metric_report.metric,
            score: metric_report.score,
            value,
            output_scale: config.output_scale,
            color: (reference.component_count() == 3).then(|| config.color.name().to_string()),
            width,
            height,
            scales: reference.decomposition().levels(),
            workers: config.workers,
            masking: config.masking,
            planes: metric_report.planes,
            timestamp: chrono::Utc::now(),
        };
        Ok(ComparisonOutcome { report, error_map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScaleMode;
    use crate::report::OutputScale;
    use imgref::Img;
    use rgb::RGB8;

    fn single_scale() -> CompareConfig {
        CompareConfig::builder()
            .scale_mode(ScaleMode::SingleScale)
            .build()
            .unwrap()
    }

    fn gray(config: &CompareConfig, f: impl Fn(usize, usize) -> u8) -> Image {
        let pixels: Vec<u8> = (0..24 * 24).map(|i| f(i % 24, i / 24)).collect();
        Image::from_gray8(Img::new(pixels, 24, 24).as_ref(), config.decomposition()).unwrap()
    }

    #[test]
    fn test_identical_images_report() {
        let config = single_scale();
        let texture = |x: usize, y: usize| ((x * 13 + y * 7) % 200) as u8;
        let outcome = Comparison::new(config.clone())
            .compare_images(gray(&config, texture), gray(&config, texture))
            .unwrap();
        let report = outcome.report;
        assert_eq!(report.score, 1.0);
        assert_eq!(report.value, f64::INFINITY);
        assert_eq!(report.color, None);
        assert_eq!(report.planes[0].name, "Y");
        assert!(outcome.error_map.is_none());
    }

    #[test]
    fn test_linear_output_and_error_map() {
        let config = CompareConfig::builder()
            .scale_mode(ScaleMode::SingleScale)
            .output_scale(OutputScale::Linear)
            .error_map(true)
            .build()
            .unwrap();
        let a = gray(&config, |x, y| ((x * 13 + y * 7) % 200) as u8);
        let b = gray(&config, |x, _| (x * 10) as u8);
        let outcome = Comparison::new(config).compare_images(a, b).unwrap();
        assert!(outcome.report.value < 1.0);
        assert_eq!(outcome.report.value, outcome.report.score);
        assert_eq!(outcome.error_map.unwrap().dimensions(), (24, 24));
    }

    #[test]
    fn test_rgb_uses_color_weights() {
        let config = single_scale();
        let pixels: Vec<RGB8> = (0..24 * 24)
            .map(|i| RGB8::new((i % 251) as u8, (i * 3 % 256) as u8, 40))
            .collect();
        let img = Img::new(pixels, 24, 24);
        let a = Image::from_rgb8(img.as_ref(), config.decomposition()).unwrap();
        let b = Image::from_rgb8(img.as_ref(), config.decomposition()).unwrap();
        let report = Comparison::new(config).compare_images(a, b).unwrap().report;
        let names: Vec<_> = report.planes.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Y", "Cb", "Cr"]);
        assert_eq!(report.color.as_deref(), Some("ycbcr"));
        assert!((report.score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_decomposition_rejected() {
        let config = single_scale();
        let other = CompareConfig::default();
        let err = Comparison::new(config)
            .compare_images(gray(&other, |_, _| 0), gray(&other, |_, _| 0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn test_shape_mismatch() {
        let config = single_scale();
        let small = Image::from_gray8(
            Img::new(vec![0u8; 16], 4, 4).as_ref(),
            config.decomposition(),
        )
        .unwrap();
        let err = Comparison::new(config.clone())
            .compare_images(gray(&config, |_, _| 0), small)
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }
}
