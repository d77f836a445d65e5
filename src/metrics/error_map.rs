//! Per-pixel error detection probability.
//!
//! Every SSIM window adds the log-probability of its error going unnoticed
//! to the map at full image resolution. Windows on coarse scales spread
//! their contribution over the footprint they cover with a raised-cosine
//! kernel. The probability of detecting an error at a pixel is then
//! `1 − exp(sum)`.

use std::f64::consts::PI;

use imgref::ImgVec;

use crate::buffer::Matrix;

/// Accumulated log-probabilities at full image resolution.
#[derive(Debug, Clone)]
pub struct ErrorMap {
    log_sum: Matrix<f32>,
}

impl ErrorMap {
    /// An empty map: no error detected anywhere.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            log_sum: Matrix::new(width, height),
        }
    }

    pub fn width(&self) -> usize {
        self.log_sum.width()
    }

    pub fn height(&self) -> usize {
        self.log_sum.height()
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.log_sum.dimensions()
    }

    pub fn clear(&mut self) {
        self.log_sum.clean();
    }

    /// Add `log_p` for the `window`-sided window whose top-left corner is at
    /// (`x`, `y`) on the scale `exponent` octaves below full resolution.
    pub(crate) fn deposit(
        &mut self,
        log_p: f64,
        x: usize,
        y: usize,
        window: usize,
        exponent: usize,
    ) {
        let (width, height) = self.dimensions();
        let cx = x + window / 2;
        let cy = y + window / 2;
        let mut m = self.log_sum.write();
        if exponent == 0 {
            if cx < width && cy < height {
                let v = m.get(cx, cy);
                m.set(cx, cy, (f64::from(v) + log_p) as f32);
            }
            return;
        }

        let half = ((1usize << exponent) >> 1) as isize;
        let span = (2usize << exponent) as isize;
        let xmin = ((cx << exponent) as isize) - half;
        let ymin = ((cy << exponent) as isize) - half;
        let (xmax, ymax) = (xmin + span, ymin + span);
        let xmid = (xmin + xmax - 1) as f64 * 0.5;
        let ymid = (ymin + ymax - 1) as f64 * 0.5;
        let f = PI / span as f64;

        let clip = |v: isize, limit: usize| v.clamp(0, limit as isize) as usize;
        for j in clip(ymin, height)..clip(ymax, height) {
            let wy = (f * (j as f64 - ymid)).cos();
            let row = m.row_mut(j);
            for i in clip(xmin, width)..clip(xmax, width) {
                let wx = (f * (i as f64 - xmid)).cos();
                row[i] = (f64::from(row[i]) + log_p * wx * wy) as f32;
            }
        }
    }

    /// Detection probability at (`x`, `y`).
    #[must_use]
    pub fn probability(&self, x: usize, y: usize) -> f64 {
        1.0 - f64::from(self.log_sum.get(x, y)).exp()
    }

    /// The probabilities as 8-bit grey, `⌊255·p⌋` clamped to `0..=255`.
    #[must_use]
    pub fn to_gray8(&self) -> ImgVec<u8> {
        let (width, height) = self.dimensions();
        let view = self.log_sum.read();
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            pixels.extend(view.row(y).iter().map(|&v| {
                let p = 1.0 - f64::from(v).exp();
                (255.0 * p).floor().clamp(0.0, 255.0) as u8
            }));
        }
        ImgVec::new(pixels, width, height)
    }
}
