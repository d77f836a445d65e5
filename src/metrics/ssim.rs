//! Multiscale structural similarity.
//!
//! Each scale of each plane is swept with an 11×11 Gaussian window. The
//! per-window score is the product of luminance, contrast and structure
//! terms; luminance only counts on the coarsest scale. Scale scores are
//! combined by a weighted geometric mean and plane scores by the plane
//! weights.
//!
//! With a masking exponent `m` the structure term is relaxed where the local
//! deviations are sparse, measured as the ratio of their L2 norm to their
//! Lm norm.

use tracing::{debug, info, warn};

use super::error_map::ErrorMap;
use super::parallel::{Partial, RowPartition, Workers};
use super::window::{Moments, WindowKernel};
use super::{Metric, check_pair, with_views};
use crate::buffer::MatrixRef;
use crate::component::Component;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::report::{MetricReport, PlaneScore, ScaleScore, level_decibels};

/// Exponents of the five scales, finest first.
pub const SCALE_WEIGHTS: [f64; 5] = [0.0448, 0.2856, 0.3001, 0.2363, 0.1333];

const K1: f64 = 0.01;
const K2: f64 = 0.03;

/// The SSIM engine.
#[derive(Debug, Clone)]
pub struct Ssim {
    workers: usize,
    by_level: bool,
    masking: Option<f64>,
    kernel: WindowKernel,
}

/// Constants of one scale sweep.
#[derive(Debug, Clone, Copy)]
struct ScaleParams {
    c1: f64,
    c2: f64,
    luminance: bool,
    /// Octaves below full resolution.
    exponent: usize,
    /// Plane weight times scale exponent, for the error map.
    log_weight: f64,
}

#[derive(Debug, Default)]
struct WindowSum {
    sum: f64,
    count: usize,
}

impl WindowSum {
    fn mean(&self) -> f64 {
        if self.count == 0 {
            1.0
        } else {
            self.sum / self.count as f64
        }
    }
}

impl Partial for WindowSum {
    fn merge(&mut self, other: Self) {
        self.sum += other.sum;
        self.count += other.count;
    }
}

impl Ssim {
    /// An engine sweeping with `workers` threads. `masking`, when given,
    /// must lie in the open interval (0, 2).
    pub fn new(workers: usize, by_level: bool, masking: Option<f64>) -> Result<Self> {
        if workers == 0 {
            return Err(Error::invalid("worker count must be at least 1"));
        }
        if let Some(m) = masking {
            if !(m > 0.0 && m < 2.0) {
                return Err(Error::invalid(format!(
                    "masking exponent {m} outside the open interval (0, 2)"
                )));
            }
        }
        Ok(Self {
            workers,
            by_level,
            masking,
            kernel: WindowKernel::gaussian(),
        })
    }

    pub fn masking(&self) -> Option<f64> {
        self.masking
    }

    /// Compare two decomposed images. When `error_map` is given it is
    /// cleared, filled with the detection probabilities, and the sweep runs
    /// on a single worker.
    pub fn compare(
        &self,
        reference: &Image,
        distorted: &Image,
        mut error_map: Option<&mut ErrorMap>,
    ) -> Result<MetricReport> {
        check_pair(reference, distorted)?;
        if reference
            .components()
            .iter()
            .chain(distorted.components())
            .any(Component::keeps_subbands)
        {
            return Err(Error::invalid(
                "SSIM needs coefficients at every scale, not subbands",
            ));
        }
        let scales = reference.components()[0].scales();
        if scales > SCALE_WEIGHTS.len() {
            return Err(Error::unsupported(format!(
                "SSIM is defined for up to {} scales, got {scales}",
                SCALE_WEIGHTS.len()
            )));
        }

        let mut workers = self.workers;
        if let Some(map) = error_map.as_deref_mut() {
            if map.dimensions() != reference.dimensions() {
                return Err(Error::DimensionMismatch {
                    expected: reference.dimensions(),
                    actual: map.dimensions(),
                });
            }
            map.clear();
            if workers > 1 {
                warn!(workers, "error map requested, running on a single worker");
                workers = 1;
            }
        }
        let pool = Workers::new(workers)?;

        let mut planes = Vec::with_capacity(reference.component_count());
        let mut score = 0.0;
        for (a, b) in reference.components().iter().zip(distorted.components()) {
            let plane = self.plane(a, b, &pool, error_map.as_deref_mut())?;
            score += plane.weight * plane.score;
            planes.push(plane);
        }
        debug!(score, workers, "SSIM complete");
        Ok(MetricReport {
            metric: Metric::Ssim,
            score,
            planes,
        })
    }

    fn plane(
        &self,
        a: &Component,
        b: &Component,
        pool: &Workers,
        mut error_map: Option<&mut ErrorMap>,
    ) -> Result<PlaneScore> {
        let nscales = a.scales();
        let range = a.scale();
        let mut result = 1.0;
        let mut scales = Vec::with_capacity(nscales);

        for scale in 1..=nscales {
            let (Some(ma), Some(mb)) = (a.coefficients(scale), b.coefficients(scale)) else {
                return Err(Error::invalid(format!("plane {} has no scale {scale}", a.name())));
            };
            if ma.dimensions() != mb.dimensions() {
                return Err(Error::DimensionMismatch {
                    expected: ma.dimensions(),
                    actual: mb.dimensions(),
                });
            }
            let gamma = if nscales > 1 { SCALE_WEIGHTS[scale - 1] } else { 1.0 };
            let params = ScaleParams {
                c1: (K1 * range).powi(2),
                c2: (K2 * range).powi(2),
                luminance: scale == nscales,
                exponent: scale - 1,
                log_weight: a.weight() * gamma,
            };

            let value = with_views(ma, mb, |ra, rb| match error_map.as_deref_mut() {
                Some(map) => self.sweep(ra, rb, &params, RowPartition::all(), Some(map)),
                None => pool.run(|rows| self.sweep(ra, rb, &params, rows, None)),
            })
            .mean();

            if self.by_level {
                info!(
                    plane = a.name(),
                    scale,
                    value,
                    decibel = level_decibels(value),
                    "SSIM by level"
                );
            }
            scales.push(ScaleScore { scale, value });
            result *= if nscales > 1 { value.max(0.0).powf(gamma) } else { value };
        }

        Ok(PlaneScore {
            name: a.name().to_string(),
            weight: a.weight(),
            score: result,
            scales,
        })
    }

    /// Sum the window scores of the rows in `rows`.
    fn sweep(
        &self,
        a: &MatrixRef<'_, f32>,
        b: &MatrixRef<'_, f32>,
        params: &ScaleParams,
        rows: RowPartition,
        mut error_map: Option<&mut ErrorMap>,
    ) -> WindowSum {
        let columns = self.kernel.positions(a.width());
        let mut acc = WindowSum::default();
        for y in rows.rows(self.kernel.positions(a.height())) {
            for x in 0..columns {
                let local = self.window(a, b, x, y, params);
                acc.sum += local;
                acc.count += 1;

                if let Some(map) = error_map.as_deref_mut() {
                    // probability of the error at this window going unnoticed
                    let p = (local + 1.0) * 0.5;
                    let log_p = if p <= 0.0 {
                        f64::NEG_INFINITY
                    } else {
                        params.log_weight * p.ln()
                    };
                    map.deposit(log_p, x, y, self.kernel.size(), params.exponent);
                }
            }
        }
        acc
    }

    /// SSIM of the window at (`x`, `y`).
    fn window(
        &self,
        a: &MatrixRef<'_, f32>,
        b: &MatrixRef<'_, f32>,
        x: usize,
        y: usize,
        p: &ScaleParams,
    ) -> f64 {
        let mut m = self.kernel.moments(a, b, x, y);
        let sigma = m.settle();

        let luminance = if p.luminance {
            (2.0 * m.mean_a * m.mean_b + p.c1)
                / (m.mean_a * m.mean_a + m.mean_b * m.mean_b + p.c1)
        } else {
            1.0
        };
        let contrast = (2.0 * sigma + p.c2) / (m.var_a + m.var_b + p.c2);
        let c3 = p.c2 / 2.0;
        let mut structure = (m.cov + c3) / (sigma + c3);

        if let Some(exponent) = self.masking {
            let visibility = self.visibility(a, b, (x, y), &m, exponent, p.c2);
            structure = 1.0 - visibility * (1.0 - structure);
        }
        luminance * contrast * structure
    }

    /// Ratio of the L2 to the Lm energy of the local deviations, raised to
    /// `m/2` and capped at 1.
    fn visibility(
        &self,
        a: &MatrixRef<'_, f32>,
        b: &MatrixRef<'_, f32>,
        (x, y): (usize, usize),
        m: &Moments,
        exponent: f64,
        c2: f64,
    ) -> f64 {
        let area = self.kernel.area() as f64;
        let c3 = c2 * area.powf(2.0 / exponent - 1.0);
        let (l2_a, lp_a) = self.kernel.deviation_norms(a, x, y, m.mean_a, exponent);
        let (l2_b, lp_b) = self.kernel.deviation_norms(b, x, y, m.mean_b, exponent);
        let v = ((l2_a + l2_b + c3) / (lp_a + lp_b + c3)).powf(exponent / 2.0);
        v.min(1.0)
    }
}
