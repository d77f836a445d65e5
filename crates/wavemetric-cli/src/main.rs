//! wavemetric CLI - wavelet-domain SSIM and VIF

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use wavemetric::ColorTransform;

mod commands;

/// Compare a distorted image against its reference with multiscale SSIM or
/// VIF. Both images must be binary PGM (P5) or PPM (P6) files of the same
/// size and type.
#[derive(Parser)]
#[command(name = "wavemetric")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Reference image
    reference: PathBuf,

    /// Distorted image
    distorted: PathBuf,

    /// Number of worker threads
    #[arg(short = 'j', long, default_value_t = 1, env = "WAVEMETRIC_WORKERS")]
    workers: usize,

    /// Print the score of every plane and scale
    #[arg(long)]
    by_level: bool,

    /// Print the linear score instead of decibels
    #[arg(long)]
    linear: bool,

    /// Skip the wavelet transform and compare the planes directly
    #[arg(long)]
    single_scale: bool,

    /// Compute VIF instead of SSIM
    #[arg(long)]
    vif: bool,

    /// SSIM contrast masking exponent, in (0, 2)
    #[arg(long, value_name = "EXPONENT")]
    masking: Option<f64>,

    /// Write the error detection probability map as 8-bit PGM
    #[arg(long, value_name = "PATH")]
    error_map: Option<PathBuf>,

    /// Colour transform for PPM input
    #[arg(long, value_enum, default_value_t = ColorArg::Ycbcr)]
    color: ColorArg,

    /// Write the full report as JSON
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// Write the per-scale scores as CSV
    #[arg(long, value_name = "PATH")]
    csv: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorArg {
    Ycbcr,
    LinearYcbcr,
    Itp,
    Luv,
}

impl From<ColorArg> for ColorTransform {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Ycbcr => Self::YCbCr,
            ColorArg::LinearYcbcr => Self::LinearYCbCr,
            ColorArg::Itp => Self::Itp,
            ColorArg::Luv => Self::Luv,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match commands::compare::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(5)
        }
    }
}
