//! One image plane and its wavelet pyramid.

use crate::buffer::Matrix;
use crate::wavelet::{Band, BandState, Line, Orientation};

/// A single plane: a root [`Band`] plus the metadata the similarity
/// engines need to weight and normalise it.
///
/// Scales are numbered from 1 (finest, the plane itself) to
/// [`Component::scales`] (coarsest).
#[derive(Debug)]
pub struct Component {
    name: String,
    weight: f64,
    signed: bool,
    scale: f64,
    bit_depth: u32,
    band: Band,
    // rows are widened to twice the plane width with samples on even
    // positions, the layout every band expects
    scratch: Line,
}

impl Component {
    /// Create a plane of `width × height` samples in `0..=precision`,
    /// decomposed into `levels` scales.
    ///
    /// # Panics
    ///
    /// Panics if `levels` is zero or `precision` is zero.
    pub fn new(
        name: impl Into<String>,
        width: usize,
        height: usize,
        precision: u32,
        levels: usize,
        keep_subbands: bool,
    ) -> Self {
        assert!(levels > 0, "a component needs at least one scale");
        assert!(precision > 0, "precision must be positive");
        Self {
            name: name.into(),
            weight: 1.0,
            signed: false,
            scale: f64::from(precision),
            bit_depth: (precision + 1).ilog2(),
            band: Band::new(width, height, levels - 1, keep_subbands),
            scratch: Line::new(width * 2),
        }
    }

    /// Push the next row of samples.
    ///
    /// # Panics
    ///
    /// Panics if the row length differs from the plane width or the plane
    /// is already complete.
    pub fn push_row<I>(&mut self, samples: I)
    where
        I: IntoIterator,
        I::Item: Into<i32>,
    {
        let width = self.band.width();
        let mut count = 0;
        for (x, v) in samples.into_iter().enumerate() {
            assert!(x < width, "row longer than plane width {}", width);
            self.scratch.samples_mut()[2 * x] = v.into();
            count = x + 1;
        }
        assert_eq!(count, width, "row shorter than plane width");
        self.band.push_line(&self.scratch);
    }

    /// True once every row has been pushed and the pyramid is built.
    pub fn is_complete(&self) -> bool {
        self.band.state() == BandState::Done
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Contribution of this plane to the combined SSIM score.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    /// Whether samples are centred on zero (chroma planes).
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn set_signed(&mut self, signed: bool) {
        self.signed = signed;
    }

    /// Dynamic range of the samples; the SSIM stabilisers scale with it.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn bit_depth(&self) -> u32 {
        self.bit_depth
    }

    pub fn width(&self) -> usize {
        self.band.width()
    }

    pub fn height(&self) -> usize {
        self.band.height()
    }

    /// Number of scales in the pyramid.
    pub fn scales(&self) -> usize {
        self.band.resolution() + 1
    }

    pub fn keeps_subbands(&self) -> bool {
        self.band.keeps_subbands()
    }

    pub fn root(&self) -> &Band {
        &self.band
    }

    /// The band at `scale` (1-based).
    pub fn level(&self, scale: usize) -> Option<&Band> {
        self.band.descendant(scale.checked_sub(1)?)
    }

    pub fn level_mut(&mut self, scale: usize) -> Option<&mut Band> {
        self.band.descendant_mut(scale.checked_sub(1)?)
    }

    /// Coefficients stored at `scale`; empty where subbands are kept.
    pub fn coefficients(&self, scale: usize) -> Option<&Matrix<f32>> {
        self.level(scale).map(Band::coefficients)
    }

    pub fn subband(&self, scale: usize, orientation: Orientation) -> Option<&Matrix<f32>> {
        self.level(scale).map(|b| b.subband(orientation))
    }

    /// Every matrix holding data in this pyramid, finest first: the
    /// coefficients of each band that stores them and the subbands of each
    /// band that keeps them.
    pub fn matrices_mut(&mut self) -> Vec<&mut Matrix<f32>> {
        let mut out = Vec::new();
        let mut band = Some(&mut self.band);
        while let Some(b) = band {
            let keep = b.keeps_subbands();
            let (coefficients, hl, lh, hh, child) = b.parts_mut();
            if keep {
                out.extend([hl, lh, hh]);
            } else {
                out.push(coefficients);
            }
            band = child;
        }
        out
    }
}
