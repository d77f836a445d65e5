//! Similarity engines over decomposed images.
//!
//! Two metrics are supported:
//!
//! - **SSIM**: multiscale structural similarity on the coefficient pyramid,
//!   optionally with contrast masking and a per-pixel error map.
//! - **VIF**: visual information fidelity on the oriented subbands.
//!
//! Both take two [`Image`]s with equal shapes and return a
//! [`MetricReport`]. Both are deterministic: the worker count changes only
//! the order of floating-point additions.

pub mod error_map;
pub mod parallel;
pub mod ssim;
pub mod vif;
pub mod window;

use serde::{Deserialize, Serialize};

use crate::buffer::{Matrix, MatrixRef};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::report::MetricReport;

pub use error_map::ErrorMap;
pub use ssim::Ssim;
pub use vif::Vif;

/// Which similarity index to compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Ssim,
    Vif,
}

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ssim => "SSIM",
            Self::Vif => "VIF",
        }
    }

    /// Whether the engine reads oriented subbands rather than coefficients.
    pub fn needs_subbands(self) -> bool {
        matches!(self, Self::Vif)
    }
}

/// SSIM of two images; see [`Ssim`].
pub fn compute_ssim(
    reference: &Image,
    distorted: &Image,
    workers: usize,
    by_level: bool,
    masking: Option<f64>,
    error_map: Option<&mut ErrorMap>,
) -> Result<f64> {
    let report = Ssim::new(workers, by_level, masking)?.compare(reference, distorted, error_map)?;
    Ok(report.score)
}

/// VIF of two images; see [`Vif`].
pub fn compute_vif(
    reference: &Image,
    distorted: &Image,
    workers: usize,
    by_level: bool,
) -> Result<f64> {
    Ok(Vif::new(workers, by_level)?.compare(reference, distorted)?.score)
}

/// Check that two images can be compared plane by plane.
pub(crate) fn check_pair(reference: &Image, distorted: &Image) -> Result<()> {
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
    if !matches!(reference.component_count(), 1 | 3) {
        return Err(Error::unsupported(format!(
            "comparison of {}-component images",
            reference.component_count()
        )));
    }
    if !reference.is_complete() || !distorted.is_complete() {
        return Err(Error::invalid("image rows are still missing"));
    }
    for (a, b) in reference.components().iter().zip(distorted.components()) {
        if a.scales() != b.scales() {
            return Err(Error::invalid(format!(
                "plane {} has {} scales in one image and {} in the other",
                a.name(),
                a.scales(),
                b.scales()
            )));
        }
    }
    Ok(())
}

/// Lock both matrices for reading. A matrix compared with itself is locked
/// once.
pub(crate) fn with_views<R>(
    a: &Matrix<f32>,
    b: &Matrix<f32>,
    f: impl FnOnce(&MatrixRef<'_, f32>, &MatrixRef<'_, f32>) -> R,
) -> R {
    let ra = a.read();
    if a.same_view(b) {
        f(&ra, &ra)
    } else {
        let rb = b.read();
        f(&ra, &rb)
    }
}
