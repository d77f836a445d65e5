//! Multi-plane images streamed into wavelet pyramids.

use imgref::ImgRef;
use rgb::{RGB8, RGB16};
use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::error::{Error, Result};

/// Shape of the pyramid built for every plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decomposition {
    levels: usize,
    retain_subbands: bool,
}

impl Decomposition {
    /// Scales used by multiscale SSIM.
    pub const MULTISCALE_LEVELS: usize = 5;

    /// Five scales, coefficients only.
    #[must_use]
    pub fn multiscale() -> Self {
        Self {
            levels: Self::MULTISCALE_LEVELS,
            retain_subbands: false,
        }
    }

    /// The plane itself, no wavelet transform.
    #[must_use]
    pub fn single_scale() -> Self {
        Self {
            levels: 1,
            retain_subbands: false,
        }
    }

    /// A pyramid with `levels` scales.
    pub fn new(levels: usize) -> Result<Self> {
        if levels == 0 {
            return Err(Error::invalid("a decomposition needs at least one scale"));
        }
        Ok(Self {
            levels,
            retain_subbands: false,
        })
    }

    /// Keep HL/LH/HH subbands at every scale but the coarsest.
    #[must_use]
    pub fn with_subbands(mut self, retain: bool) -> Self {
        self.retain_subbands = retain;
        self
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn retains_subbands(&self) -> bool {
        self.retain_subbands
    }
}

impl Default for Decomposition {
    fn default() -> Self {
        Self::multiscale()
    }
}

/// An image as an ordered list of [`Component`]s of equal size.
///
/// Rows are pushed in order with [`Image::push_row`]; the pyramid of each
/// plane is built while the rows stream in.
#[derive(Debug)]
pub struct Image {
    width: usize,
    height: usize,
    decomposition: Decomposition,
    components: Vec<Component>,
}

impl Image {
    /// Largest number of samples, over all planes, an image may hold.
    pub const MAX_SAMPLES: u64 = 1 << 32;

    /// Reject shapes whose planes could not be allocated.
    pub(crate) fn check_size(width: usize, height: usize, planes: usize) -> Result<()> {
        let samples = (width as u64)
            .checked_mul(height as u64)
            .and_then(|n| n.checked_mul(planes as u64));
        match samples {
            Some(n) if n <= Self::MAX_SAMPLES => Ok(()),
            _ => Err(Error::invalid(format!(
                "{width}x{height} image with {planes} planes is too large"
            ))),
        }
    }

    /// Create an empty image expecting `height` rows of `width` pixels with
    /// `planes` interleaved samples each, in `0..=precision`.
    pub fn new(
        width: usize,
        height: usize,
        planes: usize,
        precision: u32,
        decomposition: Decomposition,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::invalid(format!(
                "image dimensions must be positive, got {width}x{height}"
            )));
        }
        if planes == 0 {
            return Err(Error::invalid("an image needs at least one plane"));
        }
        Self::check_size(width, height, planes)?;
        if precision == 0 || precision > u32::from(u16::MAX) {
            return Err(Error::OutOfRange(format!(
                "sample precision {precision} outside 1..=65535"
            )));
        }
        let names: &[&str] = if planes == 3 { &["R", "G", "B"] } else { &["Y"] };
        let components = (0..planes)
            .map(|i| {
                let name = names.get(i).map_or_else(|| format!("C{i}"), |n| (*n).to_string());
                Component::new(
                    name,
                    width,
                    height,
                    precision,
                    decomposition.levels(),
                    decomposition.retains_subbands(),
                )
            })
            .collect();
        Ok(Self {
            width,
            height,
            decomposition,
            components,
        })
    }

    /// Push one row of pixel-interleaved samples.
    ///
    /// # Panics
    ///
    /// Panics if the row does not hold `width × planes` samples or every row
    /// was already pushed.
    pub fn push_row<S: Copy + Into<i32>>(&mut self, interleaved: &[S]) {
        let planes = self.components.len();
        assert_eq!(interleaved.len(), self.width * planes, "interleaved row length");
        for (i, component) in self.components.iter_mut().enumerate() {
            component.push_row(interleaved.iter().skip(i).step_by(planes).copied());
        }
    }

    /// Build an 8-bit single-plane image.
    pub fn from_gray8(pixels: ImgRef<'_, u8>, decomposition: Decomposition) -> Result<Self> {
        let mut image = Self::new(pixels.width(), pixels.height(), 1, 255, decomposition)?;
        for row in pixels.rows() {
            image.components[0].push_row(row.iter().copied());
        }
        Ok(image)
    }

    /// Build a single-plane image with samples in `0..=precision`.
    pub fn from_gray16(
        pixels: ImgRef<'_, u16>,
        precision: u16,
        decomposition: Decomposition,
    ) -> Result<Self> {
        let mut image = Self::new(
            pixels.width(),
            pixels.height(),
            1,
            u32::from(precision),
            decomposition,
        )?;
        for row in pixels.rows() {
            if let Some(&v) = row.iter().find(|&&v| v > precision) {
                return Err(Error::OutOfRange(format!(
                    "sample {v} exceeds precision {precision}"
                )));
            }
            image.components[0].push_row(row.iter().copied());
        }
        Ok(image)
    }

    /// Build an 8-bit three-plane image.
    pub fn from_rgb8(pixels: ImgRef<'_, RGB8>, decomposition: Decomposition) -> Result<Self> {
        let mut image = Self::new(pixels.width(), pixels.height(), 3, 255, decomposition)?;
        for row in pixels.rows() {
            image.push_rgb_row(row.iter().map(|p| [p.r, p.g, p.b]));
        }
        Ok(image)
    }

    /// Build a three-plane image with samples in `0..=precision`.
    pub fn from_rgb16(
        pixels: ImgRef<'_, RGB16>,
        precision: u16,
        decomposition: Decomposition,
    ) -> Result<Self> {
        let mut image = Self::new(
            pixels.width(),
            pixels.height(),
            3,
            u32::from(precision),
            decomposition,
        )?;
        for row in pixels.rows() {
            if row.iter().any(|p| p.r > precision || p.g > precision || p.b > precision) {
                return Err(Error::OutOfRange(format!(
                    "sample exceeds precision {precision}"
                )));
            }
            image.push_rgb_row(row.iter().map(|p| [p.r, p.g, p.b]));
        }
        Ok(image)
    }

    fn push_rgb_row<S, I>(&mut self, pixels: I)
    where
        S: Copy + Into<i32>,
        I: Iterator<Item = [S; 3]> + Clone,
    {
        for (i, component) in self.components.iter_mut().enumerate() {
            component.push_row(pixels.clone().map(|p| p[i]));
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn decomposition(&self) -> Decomposition {
        self.decomposition
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [Component] {
        &mut self.components
    }

    pub fn component(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    /// True once every plane received all of its rows.
    pub fn is_complete(&self) -> bool {
        self.components.iter().all(Component::is_complete)
    }
}
