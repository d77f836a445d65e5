//! Streaming integer wavelet analysis.
//!
//! Rows are pushed into a [`Band`] one at a time; each band lifts them with
//! the 13/7 integer wavelet and pushes the low-pass rows into its child, so
//! a full pyramid is built with only a dozen lines buffered per level.

pub mod band;
pub mod filter;
pub mod line;

pub use band::{Band, BandState, Orientation};
pub use line::{Line, Phase, SUPPORT};
