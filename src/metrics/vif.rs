//! Visual information fidelity.
//!
//! Every window of every subband fits a gain-plus-noise channel from the
//! reference to the distorted samples. The information passed through that
//! channel is compared with the information in the reference alone; the
//! score is the ratio of both sums over all windows, subbands and scales.

use tracing::{debug, info};

use super::parallel::{Partial, RowPartition, Workers};
use super::window::{WINDOW_SIZE, WindowKernel, plane_variance};
use super::{Metric, check_pair, with_views};
use crate::buffer::{Matrix, MatrixRef};
use crate::component::Component;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::report::{MetricReport, PlaneScore, ScaleScore, level_decibels};
use crate::wavelet::Orientation;

/// Variance of the visual noise added to both channels.
const NOISE: f64 = 0.04;

/// Plane weights for Y, Cb, Cr.
pub const PLANE_WEIGHTS: [f64; 3] = [0.54, 0.19, 0.27];

/// The VIF engine.
#[derive(Debug, Clone)]
pub struct Vif {
    workers: usize,
    by_level: bool,
    kernel: WindowKernel,
}

#[derive(Debug, Default, Clone, Copy)]
struct Information {
    numerator: f64,
    denominator: f64,
}

impl Information {
    fn ratio(self) -> f64 {
        if self.denominator > 0.0 {
            self.numerator / self.denominator
        } else {
            // nothing to lose: every reference window is flat
            1.0
        }
    }
}

impl Partial for Information {
    fn merge(&mut self, other: Self) {
        self.numerator += other.numerator;
        self.denominator += other.denominator;
    }
}

impl Vif {
    pub fn new(workers: usize, by_level: bool) -> Result<Self> {
        if workers == 0 {
            return Err(Error::invalid("worker count must be at least 1"));
        }
        Ok(Self {
            workers,
            by_level,
            kernel: WindowKernel::flat(WINDOW_SIZE),
        })
    }

    /// Compare two decomposed images. Every scale but the coarsest must
    /// keep its oriented subbands.
    pub fn compare(&self, reference: &Image, distorted: &Image) -> Result<MetricReport> {
        check_pair(reference, distorted)?;
        let weights: &[f64] = match reference.component_count() {
            1 => &[1.0],
            3 => &PLANE_WEIGHTS,
            n => {
                return Err(Error::unsupported(format!(
                    "VIF of a {n}-component image"
                )));
            }
        };
        let missing_subbands = reference
            .components()
            .iter()
            .chain(distorted.components())
            .any(|c| c.scales() > 1 && !c.keeps_subbands());
        if missing_subbands {
            return Err(Error::invalid("VIF needs the oriented subbands of every scale"));
        }

        let pool = Workers::new(self.workers)?;
        let mut total = Information::default();
        let mut planes = Vec::with_capacity(weights.len());
        for ((a, b), &weight) in reference
            .components()
            .iter()
            .zip(distorted.components())
            .zip(weights)
        {
            let (plane, scales) = self.plane(a, b, &pool)?;
            total.numerator += weight * plane.numerator;
            total.denominator += weight * plane.denominator;
            planes.push(PlaneScore {
                name: a.name().to_string(),
                weight,
                score: plane.ratio(),
                scales,
            });
        }

        let score = total.ratio();
        debug!(score, workers = self.workers, "VIF complete");
        Ok(MetricReport {
            metric: Metric::Vif,
            score,
            planes,
        })
    }

    fn plane(
        &self,
        a: &Component,
        b: &Component,
        pool: &Workers,
    ) -> Result<(Information, Vec<ScaleScore>)> {
        let nscales = a.scales();
        let mut gathered = Information::default();
        let mut scales = Vec::with_capacity(nscales);

        for scale in 1..=nscales {
            let pairs: Vec<(&Matrix<f32>, &Matrix<f32>)> = if scale == nscales {
                vec![(coefficients(a, scale)?, coefficients(b, scale)?)]
            } else {
                Orientation::ALL
                    .iter()
                    .map(|&o| -> Result<_> { Ok((subband(a, scale, o)?, subband(b, scale, o)?)) })
                    .collect::<Result<_>>()?
            };
            for (ma, mb) in pairs {
                if ma.dimensions() != mb.dimensions() {
                    return Err(Error::DimensionMismatch {
                        expected: ma.dimensions(),
                        actual: mb.dimensions(),
                    });
                }
                gathered.merge(with_views(ma, mb, |ra, rb| {
                    let variance = plane_variance(ra);
                    pool.run(|rows| self.sweep(ra, rb, variance, rows))
                }));
            }

            let value = gathered.ratio();
            if self.by_level {
                info!(
                    plane = a.name(),
                    scale,
                    value,
                    decibel = level_decibels(value),
                    "VIF by level"
                );
            }
            scales.push(ScaleScore { scale, value });
        }
        Ok((gathered, scales))
    }

    fn sweep(
        &self,
        a: &MatrixRef<'_, f32>,
        b: &MatrixRef<'_, f32>,
        variance: f64,
        rows: RowPartition,
    ) -> Information {
        let area = self.kernel.area() as f64;
        let columns = self.kernel.positions(a.width());
        let mut numerator = 0.0;
        let mut windows = 0usize;
        for y in rows.rows(self.kernel.positions(a.height())) {
            for x in 0..columns {
                let mut m = self.kernel.moments(a, b, x, y);
                m.settle();

                let mut gain = if m.var_a > 0.0 && m.var_b > 0.0 {
                    m.cov / m.var_a
                } else {
                    0.0
                };
                let mut noise = if m.var_a > 0.0 {
                    (m.var_b - m.cov * m.cov / m.var_a) / area
                } else {
                    m.var_b / area
                };
                if gain < 0.0 {
                    gain = 0.0;
                    noise = m.var_b / area;
                }
                numerator += (1.0 + gain * gain * variance / (noise + NOISE)).ln();
                windows += 1;
            }
        }
        Information {
            numerator,
            denominator: windows as f64 * (1.0 + variance / NOISE).ln(),
        }
    }
}

fn coefficients(c: &Component, scale: usize) -> Result<&Matrix<f32>> {
    c.coefficients(scale)
        .ok_or_else(|| Error::invalid(format!("plane {} has no scale {scale}", c.name())))
}

fn subband(c: &Component, scale: usize, orientation: Orientation) -> Result<&Matrix<f32>> {
    c.subband(scale, orientation)
        .ok_or_else(|| Error::invalid(format!("plane {} has no scale {scale}", c.name())))
}
