//! # wavemetric
//!
//! Multiscale SSIM and VIF image similarity on an integer wavelet pyramid.
//!
//! Images are streamed row by row into a 13/7 lifting wavelet transform
//! that builds the pyramid of every plane while the rows arrive. The
//! similarity engines then sweep local windows over each scale, optionally
//! on several worker threads.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wavemetric::{CompareConfig, Comparison, Metric};
//!
//! let config = CompareConfig::builder()
//!     .metric(Metric::Ssim)
//!     .workers(4)
//!     .build()?;
//!
//! let outcome = Comparison::new(config).compare_files("reference.ppm", "distorted.ppm")?;
//! println!("{:.4} dB", outcome.report.value);
//! ```
//!
//! ## Modules
//!
//! - [`buffer`]: Shared sample storage and strided matrix views
//! - [`wavelet`]: Lifting filters and the streaming band decomposition
//! - [`image`]: Planes and their pyramids
//! - [`color`]: RGB to luma/chroma conversion
//! - [`pnm`]: PGM/PPM reading and writing
//! - [`metrics`]: SSIM and VIF engines
//! - [`compare`]: End-to-end comparison driver
//! - [`report`]: Scores and their JSON/CSV forms

pub mod buffer;
pub mod color;
pub mod compare;
pub mod component;
pub mod config;
pub mod error;
pub mod image;
pub mod metrics;
pub mod pnm;
pub mod report;
pub mod wavelet;

// Re-export commonly used types
pub use buffer::{Matrix, SharedBuffer};
pub use color::ColorTransform;
pub use compare::{Comparison, ComparisonOutcome};
pub use component::Component;
pub use config::{CompareConfig, CompareConfigBuilder, ScaleMode};
pub use error::{Error, Result};
pub use image::{Decomposition, Image};
pub use metrics::{ErrorMap, Metric, Ssim, Vif, compute_ssim, compute_vif};
pub use pnm::{PnmHeader, PnmReader, read_image, write_pgm};
pub use report::{
    ComparisonReport, MetricReport, OutputScale, PlaneScore, ScaleScore, level_decibels,
};
