//! Compare command.

use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use tracing::info;
use wavemetric::{
    CompareConfig, Comparison, ComparisonReport, Metric, OutputScale, ScaleMode, level_decibels,
    write_pgm,
};

use crate::Cli;

pub(crate) fn run(cli: Cli) -> Result<()> {
    let mut builder = CompareConfig::builder()
        .metric(if cli.vif { Metric::Vif } else { Metric::Ssim })
        .workers(cli.workers)
        .by_level(cli.by_level)
        .scale_mode(if cli.single_scale {
            ScaleMode::SingleScale
        } else {
            ScaleMode::Multiscale
        })
        .output_scale(if cli.linear {
            OutputScale::Linear
        } else {
            OutputScale::Decibel
        })
        .color(cli.color.into())
        .error_map(cli.error_map.is_some());
    if let Some(m) = cli.masking {
        builder = builder.masking(m);
    }
    let config = builder.build().context("invalid settings")?;
    info!(?config, "comparing");

    let outcome = Comparison::new(config)
        .compare_files(&cli.reference, &cli.distorted)
        .with_context(|| {
            format!(
                "failed to compare {} with {}",
                cli.reference.display(),
                cli.distorted.display()
            )
        })?;
    let report = outcome.report;

    if cli.by_level {
        print_by_level(&report);
    }
    println!("{}", format_value(report.value));

    if let (Some(path), Some(map)) = (&cli.error_map, &outcome.error_map) {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        write_pgm(BufWriter::new(file), map.to_gray8().as_ref())
            .with_context(|| format!("failed to write {}", path.display()))?;
        if cli.verbose {
            eprintln!("Error map written to: {}", path.display());
        }
    }
    if let Some(path) = &cli.json {
        report
            .write_json(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    if let Some(path) = &cli.csv {
        report
            .write_csv(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn print_by_level(report: &ComparisonReport) {
    for plane in &report.planes {
        println!("{} plane (weight {:.2}):", plane.name, plane.weight);
        for s in &plane.scales {
            println!(
                "  scale {}: {:.6} ({} dB)",
                s.scale,
                s.value,
                format_value(level_decibels(s.value))
            );
        }
    }
    println!();
}

fn format_value(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.6}")
    } else {
        value.to_string()
    }
}
