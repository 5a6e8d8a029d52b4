//! Affinity histograms for persisted score tables
//!
//! Uses the SVG backend so no system fonts are needed.

use log::{info, warn};
use plotters::prelude::*;
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::table::{read_scores, ResultTable, TableError, TABLE_SUFFIX};

/// Default number of histogram buckets
pub const DEFAULT_BINS: usize = 10;

/// Points sampled along the density curve
const CURVE_SAMPLES: usize = 200;

/// Errors that can occur while plotting score tables
#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Score directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Bucket count must be at least 1")]
    InvalidBins,

    #[error("Nothing to plot for {0}")]
    Empty(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Score table error: {0}")]
    Table(#[from] TableError),

    #[error("Drawing error: {0}")]
    Drawing(String),
}

fn drawing<E: std::fmt::Display>(e: E) -> PlotError {
    PlotError::Drawing(e.to_string())
}

/// Equal-width buckets over the range of the data
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Left edge of the first bucket
    pub lo: f64,
    /// Width of every bucket
    pub width: f64,
    pub counts: Vec<u32>,
}

impl Histogram {
    /// Bucket finite `values` into `bins` buckets spanning their min..max
    ///
    /// A single distinct value gets a unit-wide range centred on it.
    pub fn new(values: &[f64], bins: usize) -> Option<Self> {
        if bins == 0 {
            return None;
        }

        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let (mut lo, mut hi) = finite
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if finite.is_empty() {
            return None;
        }
        if hi - lo < 1e-9 {
            lo -= 0.5;
            hi += 0.5;
        }

        let width = (hi - lo) / bins as f64;
        let mut counts = vec![0u32; bins];
        for v in finite {
            let bin = (((v - lo) / width).floor() as usize).min(bins - 1);
            counts[bin] += 1;
        }

        Some(Self { lo, width, counts })
    }

    /// Right edge of the last bucket
    pub fn hi(&self) -> f64 {
        self.lo + self.width * self.counts.len() as f64
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }
}

/// Gaussian kernel density estimate scaled to histogram counts
///
/// Bandwidth follows Scott's rule. Returns `None` when the sample has fewer
/// than two points or no spread.
pub fn density_curve(values: &[f64], histogram: &Histogram) -> Option<Vec<(f64, f64)>> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std_dev = variance.sqrt();
    if !(std_dev > 0.0) {
        return None;
    }

    let bandwidth = std_dev * (n as f64).powf(-0.2);
    let norm = 1.0 / (n as f64 * bandwidth * (2.0 * PI).sqrt());
    let scale = n as f64 * histogram.width;

    let (lo, hi) = (histogram.lo, histogram.hi());
    let step = (hi - lo) / (CURVE_SAMPLES - 1) as f64;
    let curve = (0..CURVE_SAMPLES)
        .map(|i| {
            let x = lo + step * i as f64;
            let density: f64 = values
                .iter()
                .map(|v| (-0.5 * ((x - v) / bandwidth).powi(2)).exp())
                .sum::<f64>()
                * norm;
            (x, density * scale)
        })
        .collect();

    Some(curve)
}

/// Plot file name for a score table: `<table stem>_plot.svg`
pub fn plot_path(table_path: &Path) -> PathBuf {
    let stem = table_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scores".to_string());
    table_path.with_file_name(format!("{}_plot.svg", stem))
}

/// Draw the affinity histogram of `table` to an SVG file
pub fn plot_table(
    table: &ResultTable,
    title: &str,
    path: &Path,
    bins: usize,
) -> Result<(), PlotError> {
    if bins == 0 {
        return Err(PlotError::InvalidBins);
    }
    let affinities = table.affinities();
    let histogram =
        Histogram::new(&affinities, bins).ok_or_else(|| PlotError::Empty(title.to_string()))?;
    let curve = density_curve(&affinities, &histogram);

    let max_count = histogram.counts.iter().copied().max().unwrap_or(0).max(1) as f64;
    let curve_peak = curve
        .iter()
        .flatten()
        .map(|(_, y)| *y)
        .fold(0.0f64, f64::max);
    let y_max = max_count.max(curve_peak) * 1.1;

    let root = SVGBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(drawing)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Binding Affinity Distribution: {}", title),
            ("sans-serif", 20),
        )
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(histogram.lo..histogram.hi(), 0f64..y_max)
        .map_err(drawing)?;

    chart
        .configure_mesh()
        .x_desc("Affinity (kcal/mol)")
        .y_desc("Frequency")
        .draw()
        .map_err(drawing)?;

    chart
        .draw_series(histogram.counts.iter().enumerate().map(|(i, &count)| {
            let x0 = histogram.lo + i as f64 * histogram.width;
            Rectangle::new(
                [(x0, 0.0), (x0 + histogram.width, count as f64)],
                BLUE.mix(0.6).filled(),
            )
        }))
        .map_err(drawing)?;

    if let Some(curve) = curve {
        chart
            .draw_series(LineSeries::new(curve, RED.stroke_width(2)))
            .map_err(drawing)?;
    }

    root.present().map_err(drawing)?;
    Ok(())
}

/// Plot every `*_scores.csv` table in `dir`
///
/// Tables without poses are skipped, as are tables that cannot be read or
/// drawn (with a warning). Returns the plots written, in file name order.
pub fn plot_directory(dir: &Path, bins: usize) -> Result<Vec<PathBuf>, PlotError> {
    if bins == 0 {
        return Err(PlotError::InvalidBins);
    }
    if !dir.is_dir() {
        return Err(PlotError::MissingDirectory(dir.to_path_buf()));
    }

    let mut tables: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.ends_with(TABLE_SUFFIX))
        })
        .collect();
    tables.sort();

    let mut plots = Vec::new();
    for table_path in tables {
        let table = match read_scores(&table_path) {
            Ok(table) => table,
            Err(e) => {
                warn!("Skipping {}: {}", table_path.display(), e);
                continue;
            }
        };

        if table.is_empty() {
            info!("Skipping {}: no poses", table_path.display());
            continue;
        }

        let title = table_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let out = plot_path(&table_path);
        if let Err(e) = plot_table(&table, &title, &out, bins) {
            warn!("Skipping {}: {}", table_path.display(), e);
            continue;
        }
        info!("Saved plot {}", out.display());
        plots.push(out);
    }

    Ok(plots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::write_scores;
    use assert_approx_eq::assert_approx_eq;
    use tempfile::tempdir;

    #[test]
    fn test_histogram_buckets() {
        let values = [-9.0, -8.0, -8.0, -7.5, -7.0];
        let histogram = Histogram::new(&values, 4).unwrap();
        assert_approx_eq!(histogram.lo, -9.0);
        assert_approx_eq!(histogram.width, 0.5);
        assert_approx_eq!(histogram.hi(), -7.0);
        // The maximum lands in the last bucket
        assert_eq!(histogram.counts, vec![1, 0, 2, 2]);
        assert_eq!(histogram.total(), 5);
    }

    #[test]
    fn test_histogram_single_value() {
        let histogram = Histogram::new(&[-6.0, -6.0], 10).unwrap();
        assert_approx_eq!(histogram.lo, -6.5);
        assert_approx_eq!(histogram.hi(), -5.5);
        assert_eq!(histogram.total(), 2);
        assert!(Histogram::new(&[], 10).is_none());
        assert!(Histogram::new(&[-6.0], 0).is_none());
    }

    #[test]
    fn test_density_curve() {
        let values = [-9.0, -8.6, -8.1, -7.9, -7.2, -7.0, -6.4];
        let histogram = Histogram::new(&values, 10).unwrap();
        let curve = density_curve(&values, &histogram).unwrap();
        assert_eq!(curve.len(), CURVE_SAMPLES);
        assert!(curve.iter().all(|(_, y)| y.is_finite() && *y >= 0.0));
        assert!(density_curve(&[-7.0, -7.0], &histogram).is_none());
        assert!(density_curve(&[-7.0], &histogram).is_none());
    }

    #[test]
    fn test_plot_path() {
        assert_eq!(
            plot_path(Path::new("results/ligA_scores.csv")),
            PathBuf::from("results/ligA_scores_plot.svg")
        );
    }

    #[test]
    fn test_plot_directory_skips_empty_tables() {
        let dir = tempdir().unwrap();
        write_scores(
            &ResultTable::from_scores("ligA", vec![(-7.3, 0.0, 0.0), (-6.9, 1.1, 2.0)]),
            dir.path(),
        )
        .unwrap();
        write_scores(&ResultTable::empty("ligB"), dir.path()).unwrap();
        fs::write(dir.path().join("other.csv"), "a,b\n").unwrap();

        let plots = plot_directory(dir.path(), DEFAULT_BINS).unwrap();
        assert_eq!(plots, vec![dir.path().join("ligA_scores_plot.svg")]);

        let svg = fs::read_to_string(&plots[0]).unwrap();
        assert!(svg.contains("<svg"));
        assert!(!dir.path().join("ligB_scores_plot.svg").exists());
    }

    #[test]
    fn test_unplottable_table_does_not_stop_later_ones() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("a_scores.csv"),
            "Pose,Affinity (kcal/mol),RMSD l.b.,RMSD u.b.\n1,NaN,0,0\n",
        )
        .unwrap();
        write_scores(
            &ResultTable::from_scores("b", vec![(-7.1, 0.0, 0.0), (-6.4, 1.0, 1.5)]),
            dir.path(),
        )
        .unwrap();

        let plots = plot_directory(dir.path(), DEFAULT_BINS).unwrap();
        assert_eq!(plots, vec![dir.path().join("b_scores_plot.svg")]);
        assert!(plots[0].exists());
        assert!(!dir.path().join("a_scores_plot.svg").exists());
    }

    #[test]
    fn test_plot_directory_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            plot_directory(&dir.path().join("absent"), DEFAULT_BINS),
            Err(PlotError::MissingDirectory(_))
        ));
        assert!(matches!(
            plot_directory(dir.path(), 0),
            Err(PlotError::InvalidBins)
        ));
    }
}
