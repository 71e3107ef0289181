//! Growth series for the chart.
//!
//! Turns stored entries into date-sorted `(date, height)` points and
//! serializes them as the trace payload the index page hands to Plotly.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};

use crate::entry::{PlantEntry, DATE_FORMAT};

/// One point on the growth chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    /// Observation date.
    pub date: NaiveDate,
    /// Height in centimetres.
    pub height: f64,
}

/// Chronologically ordered growth points.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    points: Vec<SeriesPoint>,
}

/// Build the growth series for a set of entries.
///
/// The input order does not matter: points are sorted by calendar date, and
/// entries sharing a date keep their relative input order.
#[must_use]
pub fn build_series(entries: &[PlantEntry]) -> Series {
    let mut points: Vec<SeriesPoint> = entries
        .iter()
        .map(|e| SeriesPoint {
            date: e.date,
            height: e.height,
        })
        .collect();
    points.sort_by_key(|p| p.date);
    Series { points }
}

impl Series {
    /// The points, oldest first.
    #[must_use]
    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there is nothing to chart.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Plotly trace array for this series.
    ///
    /// An empty series produces an empty array so the page renders an empty
    /// chart instead of a trace with no points.
    #[must_use]
    pub fn chart_traces(&self) -> Value {
        if self.is_empty() {
            return json!([]);
        }

        let x: Vec<String> = self
            .points
            .iter()
            .map(|p| p.date.format(DATE_FORMAT).to_string())
            .collect();
        let y: Vec<f64> = self.points.iter().map(|p| p.height).collect();

        json!([{
            "type": "scatter",
            "mode": "lines+markers",
            "name": "Height",
            "x": x,
            "y": y,
        }])
    }
}
