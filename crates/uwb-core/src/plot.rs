//! Plot model and sinks
//!
//! The sampling loop builds a [`Plot`] and hands it to a [`PlotSink`]. Sinks
//! are display side effects only: a terminal scatter plot, a CSV file, or an
//! in-memory `Vec<Plot>` for tests.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// How points are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotStyle {
    /// Connected points
    #[default]
    Line,
    /// Unconnected markers
    Scatter,
}

/// One labeled series of (x, y) points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSeries {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

/// Two-axis plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub annotation: String,
    pub style: PlotStyle,
    pub series: Vec<PlotSeries>,
}

impl Plot {
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.points.is_empty())
    }

    /// (x_min, x_max, y_min, y_max) over all series, `None` without points.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points.iter());
        let &(x0, y0) = points.next()?;
        Some(points.fold((x0, x0, y0, y0), |(xmin, xmax, ymin, ymax), &(x, y)| {
            (xmin.min(x), xmax.max(x), ymin.min(y), ymax.max(y))
        }))
    }
}

/// Receives the finished plot.
pub trait PlotSink {
    fn render(&mut self, plot: &Plot) -> io::Result<()>;
}

/// Keeps every rendered plot.
impl PlotSink for Vec<Plot> {
    fn render(&mut self, plot: &Plot) -> io::Result<()> {
        self.push(plot.clone());
        Ok(())
    }
}

impl<T: PlotSink + ?Sized> PlotSink for &mut T {
    fn render(&mut self, plot: &Plot) -> io::Result<()> {
        (**self).render(plot)
    }
}

// =============================================================================
// Terminal
// =============================================================================

const MARKERS: [char; 6] = ['o', 'x', '+', '*', '#', '@'];

/// Character-cell scatter plot printed to stdout.
#[derive(Debug, Clone, Copy)]
pub struct TerminalPlot {
    pub width: usize,
    pub height: usize,
}

impl Default for TerminalPlot {
    fn default() -> Self {
        Self {
            width: 72,
            height: 20,
        }
    }
}

impl TerminalPlot {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.max(10),
            height: height.max(5),
        }
    }

    /// Draw the plot without color codes.
    pub fn render_to_string(&self, plot: &Plot) -> String {
        let mut out = String::new();
        out.push_str(&plot.title);
        out.push('\n');
        out.push_str(&plot.annotation);
        out.push('\n');

        let Some((x_min, x_max, y_min, y_max)) = self.padded_bounds(plot) else {
            out.push_str("(no data)\n");
            return out;
        };

        let mut grid = vec![vec![' '; self.width]; self.height];
        for (index, series) in plot.series.iter().enumerate() {
            let marker = MARKERS[index % MARKERS.len()];
            let mut previous: Option<(usize, usize)> = None;
            for &(x, y) in &series.points {
                let col = scale(x, x_min, x_max, self.width);
                let row = self.height - 1 - scale(y, y_min, y_max, self.height);
                if plot.style == PlotStyle::Line {
                    if let Some((pc, pr)) = previous {
                        self.connect(&mut grid, (pc, pr), (col, row));
                    }
                }
                grid[row][col] = marker;
                previous = Some((col, row));
            }
        }

        let y_top = format!("{:.2}", y_max);
        let y_bottom = format!("{:.2}", y_min);
        let margin = y_top.len().max(y_bottom.len());

        for (row, cells) in grid.iter().enumerate() {
            let label = if row == 0 {
                y_top.as_str()
            } else if row == self.height - 1 {
                y_bottom.as_str()
            } else {
                ""
            };
            let line: String = cells.iter().collect();
            out.push_str(&format!("{:>margin$} |{}\n", label, line.trim_end()));
        }
        out.push_str(&format!("{:>margin$} +{}\n", "", "-".repeat(self.width)));

        let x_left = format!("{:.1}", x_min);
        let x_right = format!("{:.1}", x_max);
        let gap = self.width.saturating_sub(x_left.len() + x_right.len());
        out.push_str(&format!(
            "{:>margin$}  {}{}{}\n",
            "",
            x_left,
            " ".repeat(gap),
            x_right
        ));
        out.push_str(&format!(
            "{:>margin$}  x: {}, y: {}\n",
            "", plot.x_label, plot.y_label
        ));

        for (index, series) in plot.series.iter().enumerate() {
            out.push_str(&format!(
                "  {} {} ({} points)\n",
                MARKERS[index % MARKERS.len()],
                series.label,
                series.points.len()
            ));
        }
        out
    }

    fn padded_bounds(&self, plot: &Plot) -> Option<(f64, f64, f64, f64)> {
        let (mut x_min, mut x_max, mut y_min, mut y_max) = plot.bounds()?;
        if (x_max - x_min).abs() < f64::EPSILON {
            x_min -= 0.5;
            x_max += 0.5;
        }
        if (y_max - y_min).abs() < f64::EPSILON {
            y_min -= 0.5;
            y_max += 0.5;
        }
        Some((x_min, x_max, y_min, y_max))
    }

    /// Fill the cells between two markers with dots.
    fn connect(&self, grid: &mut [Vec<char>], from: (usize, usize), to: (usize, usize)) {
        let steps = from.0.abs_diff(to.0).max(from.1.abs_diff(to.1));
        for step in 1..steps {
            let t = step as f64 / steps as f64;
            let col = (from.0 as f64 + (to.0 as f64 - from.0 as f64) * t).round() as usize;
            let row = (from.1 as f64 + (to.1 as f64 - from.1 as f64) * t).round() as usize;
            if grid[row][col] == ' ' {
                grid[row][col] = '.';
            }
        }
    }
}

fn scale(value: f64, min: f64, max: f64, cells: usize) -> usize {
    let ratio = ((value - min) / (max - min)).clamp(0.0, 1.0);
    ((ratio * (cells - 1) as f64).round() as usize).min(cells - 1)
}

impl PlotSink for TerminalPlot {
    fn render(&mut self, plot: &Plot) -> io::Result<()> {
        let text = self.render_to_string(plot);
        let mut lines = text.lines();
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Some(title) = lines.next() {
            writeln!(out, "{}", title.bold())?;
        }
        if let Some(annotation) = lines.next() {
            writeln!(out, "{}", annotation.cyan())?;
        }
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()
    }
}

// =============================================================================
// CSV
// =============================================================================

/// Writes every point as `series,elapsed_s,distance_m`.
#[derive(Debug, Clone)]
pub struct CsvPlotSink {
    path: PathBuf,
}

impl CsvPlotSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PlotSink for CsvPlotSink {
    fn render(&mut self, plot: &Plot) -> io::Result<()> {
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "series,elapsed_s,distance_m")?;
        for series in &plot.series {
            for (x, y) in &series.points {
                writeln!(writer, "{},{:.3},{:.3}", series.label, x, y)?;
            }
        }

        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plot(style: PlotStyle, points: Vec<(f64, f64)>) -> Plot {
        Plot {
            title: "Range Test".to_string(),
            x_label: "Time (s)".to_string(),
            y_label: "Distance (m)".to_string(),
            annotation: "Max Sampling Rate: 10".to_string(),
            style,
            series: vec![PlotSeries {
                label: "Distance to 0x7612".to_string(),
                points,
            }],
        }
    }

    #[test]
    fn test_bounds() {
        let p = plot(PlotStyle::Line, vec![(0.0, 1.0), (2.0, 0.5), (1.0, 3.0)]);
        assert_eq!(p.bounds(), Some((0.0, 2.0, 0.5, 3.0)));
        assert_eq!(plot(PlotStyle::Line, vec![]).bounds(), None);
    }

    #[test]
    fn test_terminal_plot_places_markers() {
        let terminal = TerminalPlot::new(20, 5);
        let text = terminal.render_to_string(&plot(PlotStyle::Scatter, vec![(0.0, 0.0), (1.0, 1.0)]));
        let rows: Vec<&str> = text.lines().collect();

        assert_eq!(rows[0], "Range Test");
        assert_eq!(rows[1], "Max Sampling Rate: 10");
        // top row holds the maximum at the right edge, bottom row the minimum at the left
        assert!(rows[2].starts_with("1.00 |"));
        assert!(rows[2].ends_with('o'));
        assert!(rows[6].starts_with("0.00 |o"));
        assert!(text.contains("x: Time (s), y: Distance (m)"));
        assert!(text.contains("o Distance to 0x7612 (2 points)"));
    }

    #[test]
    fn test_terminal_plot_line_connects() {
        let terminal = TerminalPlot::new(20, 5);
        let text = terminal.render_to_string(&plot(PlotStyle::Line, vec![(0.0, 0.0), (1.0, 0.0)]));
        assert!(text.contains(&format!("o{}o", ".".repeat(18))));
    }

    #[test]
    fn test_terminal_plot_empty() {
        let text = TerminalPlot::default().render_to_string(&plot(PlotStyle::Line, vec![]));
        assert!(text.contains("(no data)"));
    }

    #[test]
    fn test_csv_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        let mut sink = CsvPlotSink::new(&path);
        sink.render(&plot(PlotStyle::Line, vec![(0.0, 0.5), (0.2, 0.51)])).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "series,elapsed_s,distance_m");
        assert_eq!(lines[1], "Distance to 0x7612,0.000,0.500");
        assert_eq!(lines[2], "Distance to 0x7612,0.200,0.510");
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<Plot> = Vec::new();
        sink.render(&plot(PlotStyle::Line, vec![(0.0, 1.0)])).unwrap();
        assert_eq!(sink.len(), 1);
    }
}
