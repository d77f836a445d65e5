//! Comparison results and their serialized forms.
//!
//! A [`MetricReport`] is what an engine returns: the combined score plus a
//! per-plane, per-scale breakdown. The comparison driver wraps it into a
//! [`ComparisonReport`] that can be written as JSON, and the per-scale
//! table can be exported as CSV.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::Metric;

/// Score of one plane at one scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleScore {
    /// 1 is the finest scale.
    pub scale: usize,
    /// SSIM of this scale alone, or the running VIF ratio after it.
    pub value: f64,
}

/// Score of one plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneScore {
    pub name: String,
    /// Weight the plane contributed with.
    pub weight: f64,
    pub score: f64,
    pub scales: Vec<ScaleScore>,
}

/// Output of a similarity engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    pub metric: Metric,
    /// Combined score on the linear scale.
    pub score: f64,
    pub planes: Vec<PlaneScore>,
}

impl MetricReport {
    /// The combined score in decibels.
    #[must_use]
    pub fn decibels(&self) -> f64 {
        OutputScale::Decibel.apply(self.score)
    }

    /// Write the per-scale table as CSV with a `plane,scale,value` header.
    pub fn write_scales_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(["plane", "scale", "value"])?;
        for plane in &self.planes {
            for s in &plane.scales {
                wtr.write_record([
                    plane.name.as_str(),
                    &s.scale.to_string(),
                    &format!("{:.6}", s.value),
                ])?;
            }
        }
        wtr.flush()?;
        Ok(())
    }
}

/// How a score in `[0, 1]` is presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputScale {
    /// `-10·log10(1 − v)`; identical images give infinity.
    #[default]
    Decibel,
    Linear,
}

impl OutputScale {
    #[must_use]
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Decibel => -10.0 * (1.0 - value).log10(),
            Self::Linear => value,
        }
    }
}

/// Decibel form of a single scale's score, `-20·log10(1 − v)`, as shown in
/// by-level diagnostics. The combined score uses [`OutputScale::Decibel`].
pub fn level_decibels(value: f64) -> f64 {
    -20.0 * (1.0 - value).log10()
}

/// Complete record of one comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Path of the reference image, when it came from a file.
    pub reference: Option<PathBuf>,

    /// Path of the distorted image, when it came from a file.
    pub distorted: Option<PathBuf>,

    pub metric: Metric,

    /// Combined score on the linear scale.
    pub score: f64,

    /// `score` after `output_scale` was applied.
    #[serde(with = "float_or_string")]
    pub value: f64,

    pub output_scale: OutputScale,

    /// Colour transform applied to three-plane images.
    pub color: Option<String>,

    pub width: usize,
    pub height: usize,
    pub scales: usize,
    pub workers: usize,
    pub masking: Option<f64>,

    pub planes: Vec<PlaneScore>,

    /// When this report was generated.
    #[serde(with = "chrono_serde")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ComparisonReport {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Write the per-scale table to a CSV file.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.metric_report().write_scales_csv(file)
    }

    /// The engine-level part of this report.
    #[must_use]
    pub fn metric_report(&self) -> MetricReport {
        MetricReport {
            metric: self.metric,
            score: self.score,
            planes: self.planes.clone(),
        }
    }
}

// JSON has no infinity; the decibel value of identical images is written
// as the string "inf".
mod float_or_string {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if value.is_finite() {
            value.serialize(serializer)
        } else {
            value.to_string().serialize(serializer)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

mod chrono_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        dt.to_rfc3339().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
