//! Session summary
//!
//! A [`Summary`] is a read-only snapshot of a sampling session: peak rate,
//! peak distance, the accepted series and per-series statistics. It renders
//! as a boxed terminal block, converts into a [`Plot`] and serializes to JSON.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::plot::{Plot, PlotSeries, PlotStyle};
use crate::sampling::TargetSeries;
use crate::types::DeviceId;

/// Count, mean, spread and extremes of one series, in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub target: DeviceId,
    pub count: usize,
    pub mean_m: f64,
    /// Population standard deviation
    pub std_dev_m: f64,
    /// Population variance
    pub variance_m2: f64,
    pub min_m: f64,
    pub max_m: f64,
}

impl SeriesStats {
    /// `None` for an empty series.
    pub fn from_series(series: &TargetSeries) -> Option<Self> {
        if series.points.is_empty() {
            return None;
        }
        let distances: Vec<f64> = series.points.iter().map(|p| p.distance_m()).collect();
        let n = distances.len() as f64;
        let mean = distances.iter().sum::<f64>() / n;
        let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
        let min = distances.iter().copied().fold(f64::INFINITY, f64::min);
        let max = distances.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            target: series.target,
            count: distances.len(),
            mean_m: mean,
            std_dev_m: variance.sqrt(),
            variance_m2: variance,
            min_m: min,
            max_m: max,
        })
    }
}

/// Snapshot of a sampling session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub title: String,
    pub targets: Vec<DeviceId>,
    pub relay: Option<DeviceId>,
    /// Highest observed sampling rate, `None` until two successful rounds
    pub max_rate_hz: Option<f64>,
    /// Largest distance of any successful measurement, filtered or not (mm)
    pub max_distance_mm: f64,
    pub series: Vec<TargetSeries>,
    pub stats: Vec<SeriesStats>,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejected: u64,
    pub clock_regressions: u64,
}

impl Summary {
    /// False while every series is empty.
    pub fn has_data(&self) -> bool {
        self.series.iter().any(|s| !s.is_empty())
    }

    pub fn max_distance_m(&self) -> f64 {
        self.max_distance_mm / 1000.0
    }

    /// Rate for display, `n/a` when no rate was measured.
    pub fn rate_label(&self) -> String {
        match self.max_rate_hz {
            Some(rate) => format!("{:.2}", rate),
            None => "n/a".to_string(),
        }
    }

    /// Time (s) against distance (m), one series per target.
    pub fn to_plot(&self, style: PlotStyle) -> Plot {
        Plot {
            title: self.title.clone(),
            x_label: "Time (s)".to_string(),
            y_label: "Distance (m)".to_string(),
            annotation: format!("Max Sampling Rate: {}", self.rate_label()),
            style,
            series: self
                .series
                .iter()
                .map(|s| PlotSeries {
                    label: s.label(),
                    points: s.points.iter().map(|p| (p.elapsed_s(), p.distance_m())).collect(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width: usize = 56;
        let head = format!("\u{250C}\u{2500} {} ", self.title);
        let fill = width.saturating_sub(head.chars().count());
        writeln!(f, "{}{}", head.bold(), "\u{2500}".repeat(fill))?;

        let bar = "\u{2502}";
        if !self.has_data() {
            writeln!(f, "{} {}", bar, "no data".yellow())?;
        }

        let rate = match self.max_rate_hz {
            Some(_) => self.rate_label().green().to_string(),
            None => "n/a".dimmed().to_string(),
        };
        writeln!(f, "{} Max Sampling Rate(Hz): {}", bar, rate)?;
        writeln!(f, "{} Max Distance(m): {:.2}", bar, self.max_distance_m())?;
        writeln!(
            f,
            "{} Rounds: {} ({} ok, {} failed), {} rejected by filter",
            bar, self.attempts, self.successes, self.failures, self.rejected
        )?;
        if self.clock_regressions > 0 {
            writeln!(
                f,
                "{} {} device clock went backwards {} time(s)",
                bar,
                "\u{26A0}".yellow(),
                self.clock_regressions
            )?;
        }

        for stats in &self.stats {
            writeln!(f, "{}", bar)?;
            writeln!(f, "{} {}", bar, stats.target.to_string().bold())?;
            writeln!(
                f,
                "{}   samples {}, mean {:.3} m, std {:.3} m, var {:.4} m\u{00B2}",
                bar, stats.count, stats.mean_m, stats.std_dev_m, stats.variance_m2
            )?;
            writeln!(
                f,
                "{}   min {:.3} m, max {:.3} m",
                bar, stats.min_m, stats.max_m
            )?;
        }

        writeln!(f, "\u{2514}{}", "\u{2500}".repeat(width - 1))
    }
}
