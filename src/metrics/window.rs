//! Local window weighting and moment accumulation.

use crate::buffer::MatrixRef;

/// Side length of the comparison window.
pub const WINDOW_SIZE: usize = 11;

/// Denominator of the Gaussian exponent: `exp(-(dx² + dy²) / SPREAD)`.
const GAUSSIAN_SPREAD: f64 = 2.25;

/// A square window of weights summing to one.
///
/// The Gaussian window is separable: the 2D weight at (`i`, `j`) is the
/// product of the 1D taps `i` and `j`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowKernel {
    size: usize,
    taps: Vec<f64>,
}

impl WindowKernel {
    /// The SSIM window: an 11×11 Gaussian.
    pub fn gaussian() -> Self {
        Self::gaussian_sized(WINDOW_SIZE)
    }

    /// A Gaussian of the given side, same spread as [`WindowKernel::gaussian`].
    pub fn gaussian_sized(size: usize) -> Self {
        assert!(size > 0, "window must not be empty");
        let center = (size as f64 - 1.0) / 2.0;
        let raw: Vec<f64> = (0..size)
            .map(|i| {
                let d = i as f64 - center;
                (-(d * d) / GAUSSIAN_SPREAD).exp()
            })
            .collect();
        let total: f64 = raw.iter().sum();
        Self {
            size,
            taps: raw.into_iter().map(|t| t / total).collect(),
        }
    }

    /// Equal weights.
    pub fn flat(size: usize) -> Self {
        assert!(size > 0, "window must not be empty");
        Self {
            size,
            taps: vec![1.0 / size as f64; size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of samples covered.
    pub fn area(&self) -> usize {
        self.size * self.size
    }

    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.taps[i] * self.taps[j]
    }

    /// Top-left positions at which the window fits in a `len`-long axis.
    pub fn positions(&self, len: usize) -> usize {
        (len + 1).saturating_sub(self.size)
    }

    /// Weighted moments of the window at (`x`, `y`) in both matrices.
    pub fn moments(
        &self,
        a: &MatrixRef<'_, f32>,
        b: &MatrixRef<'_, f32>,
        x: usize,
        y: usize,
    ) -> Moments {
        let mut sum = Moments::default();
        for j in 0..self.size {
            let row_a = &a.row(y + j)[x..x + self.size];
            let row_b = &b.row(y + j)[x..x + self.size];
            let tj = self.taps[j];
            for (i, (&va, &vb)) in row_a.iter().zip(row_b).enumerate() {
                let w = self.taps[i] * tj;
                let (va, vb) = (f64::from(va), f64::from(vb));
                sum.mean_a += w * va;
                sum.mean_b += w * vb;
                sum.var_a += w * va * va;
                sum.var_b += w * vb * vb;
                sum.cov += w * va * vb;
            }
        }
        sum.var_a -= sum.mean_a * sum.mean_a;
        sum.var_b -= sum.mean_b * sum.mean_b;
        sum.cov -= sum.mean_a * sum.mean_b;
        sum
    }

    /// Weighted L2 and Lp norms of the deviations from `mean` in the window
    /// at (`x`, `y`), with weights rescaled to sum to the window area.
    ///
    /// Returns `(Σ w·d², (Σ w·|d|^p)^(2/p))`.
    pub fn deviation_norms(
        &self,
        m: &MatrixRef<'_, f32>,
        x: usize,
        y: usize,
        mean: f64,
        exponent: f64,
    ) -> (f64, f64) {
        let area = self.area() as f64;
        let (mut l2, mut lp) = (0.0, 0.0);
        for j in 0..self.size {
            let row = &m.row(y + j)[x..x + self.size];
            for (i, &v) in row.iter().enumerate() {
                let w = self.weight(i, j) * area;
                let d = f64::from(v) - mean;
                l2 += d * d * w;
                lp += d.abs().powf(exponent) * w;
            }
        }
        (l2, lp.powf(2.0 / exponent))
    }
}

/// First and second moments of a window pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    pub mean_a: f64,
    pub mean_b: f64,
    pub var_a: f64,
    pub var_b: f64,
    pub cov: f64,
}

impl Moments {
    /// Clamp rounding noise: variances to zero and the covariance to the
    /// Cauchy-Schwarz bound. Returns `sqrt(var_a · var_b)`.
    pub fn settle(&mut self) -> f64 {
        self.var_a = self.var_a.max(0.0);
        self.var_b = self.var_b.max(0.0);
        let bound = (self.var_a * self.var_b).sqrt();
        self.cov = self.cov.clamp(-bound, bound);
        bound
    }
}

/// Unweighted mean and variance of a whole matrix; the variance is clamped
/// at zero.
pub fn plane_variance(m: &MatrixRef<'_, f32>) -> f64 {
    let count = (m.width() * m.height()) as f64;
    if count == 0.0 {
        return 0.0;
    }
    let (mut sum, mut sum_sq) = (0.0, 0.0);
    for y in 0..m.height() {
        for &v in m.row(y) {
            let v = f64::from(v);
            sum += v;
            sum_sq += v * v;
        }
    }
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}
