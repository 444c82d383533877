//! Cycle time charts.
//!
//! One scatter chart per identifier: observation time on the x axis, the
//! interval to the next observation on the y axis.

use std::ops::Range;
use std::path::Path;

use plotters::prelude::*;

use crate::analyzer::CycleTimeSeries;
use crate::error::ReportError;
use crate::identifier::format_hex;

/// Renders the chart of one identifier to `path`.
pub trait CyclePlotter {
    fn plot(&self, series: &CycleTimeSeries, path: &Path) -> Result<(), ReportError>;

    /// File name of the chart for `raw_id`.
    fn file_name(&self, raw_id: u32) -> String;
}

/// SVG scatter charts via plotters.
#[derive(Debug, Clone, Copy)]
pub struct SvgPlotter {
    pub width: u32,
    pub height: u32,
}

impl Default for SvgPlotter {
    fn default() -> Self {
        Self {
            width: 1500,
            height: 500,
        }
    }
}

impl SvgPlotter {
    fn render(
        &self,
        series: &CycleTimeSeries,
        path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let root = SVGBackend::new(path, (self.width, self.height)).into_drawing_area();
        root.fill(&WHITE)?;

        let (x_range, y_range) = axis_ranges(series);
        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("Cycle Time vs Time (ID {})", format_hex(series.raw_id)),
                ("sans-serif", 20).into_font(),
            )
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(x_range, y_range)?;

        chart
            .configure_mesh()
            .x_desc("Time (ms)")
            .y_desc("Cycle Time (ms)")
            .draw()?;

        chart.draw_series(
            series
                .points()
                .map(|(x, y)| Circle::new((x, y), 3, BLUE.filled())),
        )?;

        root.present()?;
        Ok(())
    }
}

impl CyclePlotter for SvgPlotter {
    fn plot(&self, series: &CycleTimeSeries, path: &Path) -> Result<(), ReportError> {
        self.render(series, path).map_err(|e| ReportError::Plot {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn file_name(&self, raw_id: u32) -> String {
        format!("cycle_time_vs_time_ID_{}.svg", raw_id)
    }
}

/// Axis ranges covering every point; a unit range when there are none.
fn axis_ranges(series: &CycleTimeSeries) -> (Range<f64>, Range<f64>) {
    let mut points = series.points().peekable();
    if points.peek().is_none() {
        return (0.0..1.0, 0.0..1.0);
    }

    let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y_min, mut y_max) = (0.0_f64, f64::NEG_INFINITY);
    for (x, y) in points {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    (padded(x_min, x_max, 0.02), padded(y_min, y_max, 0.1))
}

fn padded(lo: f64, hi: f64, fraction: f64) -> Range<f64> {
    let span = hi - lo;
    if span <= 0.0 {
        return (lo - 1.0)..(hi + 1.0);
    }
    (lo - span * fraction)..(hi + span * fraction)
}
