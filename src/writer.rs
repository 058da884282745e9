//! Destination routing and the tabular layout shared by both backends
//!
//! A write call produces one Summary row (horizontal layout, one row per
//! workout) and one detail sheet named after the resolved rower name. The
//! local workbook backend and the Google Sheets backend share the header and
//! row construction here so the two layouts cannot drift apart.
//!
//! The read-existing-names-then-write sequence is not atomic; concurrent
//! writers targeting the same destination must be serialized by the caller.
//! Neither backend takes any internal lock.

use crate::models::{Destination, Location, WorkoutData, WorkoutResult, WorkoutType};
use crate::sheets::SheetsClient;
use crate::workbook;
use thiserror::Error;

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum WriteError {
  /// File, permission, or network problem reaching the destination.
  #[error("destination unreachable: {0}")]
  DestinationUnreachable(String),

  /// The given file or URL does not open as a spreadsheet.
  #[error("malformed existing destination: {0}")]
  MalformedExistingDestination(String),

  /// One of the two sub-writes landed and the other did not; the message
  /// states which half, so the caller can decide how to retry.
  #[error("partial write: {0}")]
  PartialWriteFailure(String),
}

/// ---------------------------------------------------------------------------
/// Destination Dispatch
/// ---------------------------------------------------------------------------

/// Persist a workout to its destination, returning where it landed.
pub async fn write(
  result: &WorkoutResult,
  destination: &Destination,
) -> Result<Location, WriteError> {
  match destination {
    Destination::NewWorkbook(path) => workbook::create(result, path),
    Destination::ExistingWorkbook(path) => workbook::append(result, path),
    Destination::NewOnlineSheet { title } => {
      SheetsClient::from_env()?.create(result, title.as_deref()).await
    }
    Destination::ExistingOnlineSheet { url } => {
      SheetsClient::from_env()?.append(result, url).await
    }
  }
}

/// ---------------------------------------------------------------------------
/// Cell Values
/// ---------------------------------------------------------------------------

/// A single cell, backend-agnostic. Optional source fields that are absent
/// become `Empty` and render as blank cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
  Text(String),
  Number(f64),
  Empty,
}

impl Cell {
  fn text(value: &str) -> Self {
    Cell::Text(value.to_string())
  }

  fn int(value: u32) -> Self {
    Cell::Number(value as f64)
  }

  fn opt_int(value: Option<u32>) -> Self {
    value.map(Cell::int).unwrap_or(Cell::Empty)
  }

  fn opt_number(value: Option<f64>) -> Self {
    value.map(Cell::Number).unwrap_or(Cell::Empty)
  }

  fn opt_text(value: &Option<String>) -> Self {
    value.as_deref().map(Cell::text).unwrap_or(Cell::Empty)
  }
}

/// ---------------------------------------------------------------------------
/// Summary Table Layout
/// ---------------------------------------------------------------------------

pub fn summary_headers(workout_type: WorkoutType) -> &'static [&'static str] {
  match workout_type {
    WorkoutType::Regular => &[
      "Name",
      "Total Distance (m)",
      "Total Time",
      "Average Pace",
      "Average Rate (spm)",
      "Average HR",
      "Average Watts",
    ],
    WorkoutType::Interval => &[
      "Name",
      "Total Distance (m)",
      "Total Time",
      "Average Pace",
      "Average Rate (spm)",
      "Average HR",
      "Average Watts",
      "Total Intervals",
      "Rest Time",
    ],
  }
}

/// The Summary row for one workout, with the resolved display name leading.
pub fn summary_row(result: &WorkoutResult, resolved_name: &str) -> Vec<Cell> {
  match &result.data {
    WorkoutData::Regular { summary, .. } => vec![
      Cell::text(resolved_name),
      Cell::int(summary.total_distance),
      Cell::text(&summary.total_time),
      Cell::text(&summary.average_pace),
      Cell::int(summary.average_stroke_rate),
      Cell::opt_int(summary.average_heart_rate),
      Cell::opt_number(summary.average_watts),
    ],
    WorkoutData::Interval { summary, .. } => vec![
      Cell::text(resolved_name),
      Cell::int(summary.total_distance),
      Cell::text(&summary.total_time),
      Cell::text(&summary.average_pace),
      Cell::int(summary.average_stroke_rate),
      Cell::opt_int(summary.average_heart_rate),
      Cell::opt_number(summary.average_watts),
      Cell::int(summary.total_intervals),
      Cell::opt_text(&summary.rest_time),
    ],
  }
}

/// ---------------------------------------------------------------------------
/// Detail Table Layout
/// ---------------------------------------------------------------------------

pub fn detail_headers(workout_type: WorkoutType) -> &'static [&'static str] {
  match workout_type {
    WorkoutType::Regular => &[
      "Split #",
      "Distance (m)",
      "Time",
      "Pace",
      "Rate (spm)",
      "HR",
      "Watts",
    ],
    WorkoutType::Interval => &[
      "Interval #",
      "Distance (m)",
      "Time",
      "Pace",
      "Rate (spm)",
      "HR",
      "Watts",
      "Rest Time",
    ],
  }
}

/// Detail rows in their original sequence order.
pub fn detail_rows(data: &WorkoutData) -> Vec<Vec<Cell>> {
  match data {
    WorkoutData::Regular { splits, .. } => splits
      .iter()
      .map(|s| {
        vec![
          Cell::text(&s.number),
          Cell::int(s.distance),
          Cell::text(&s.time),
          Cell::text(&s.pace),
          Cell::int(s.stroke_rate),
          Cell::opt_int(s.heart_rate),
          Cell::opt_number(s.watts),
        ]
      })
      .collect(),
    WorkoutData::Interval { intervals, .. } => intervals
      .iter()
      .map(|i| {
        vec![
          Cell::text(&i.number),
          Cell::int(i.distance),
          Cell::text(&i.time),
          Cell::text(&i.pace),
          Cell::int(i.stroke_rate),
          Cell::opt_int(i.heart_rate),
          Cell::opt_number(i.watts),
          Cell::opt_text(&i.rest_time),
        ]
      })
      .collect(),
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::{mock_interval_result, mock_regular_result};

  #[test]
  fn test_summary_row_matches_headers() {
    let result = mock_regular_result("John C150");
    let row = summary_row(&result, "John C150");
    assert_eq!(row.len(), summary_headers(WorkoutType::Regular).len());
    assert_eq!(row[0], Cell::Text("John C150".to_string()));

    let result = mock_interval_result("Jane Smith");
    let row = summary_row(&result, "Jane Smith 2");
    assert_eq!(row.len(), summary_headers(WorkoutType::Interval).len());
    assert_eq!(row[0], Cell::Text("Jane Smith 2".to_string()));
  }

  #[test]
  fn test_detail_rows_preserve_order() {
    let result = mock_regular_result("John C150");
    let rows = detail_rows(&result.data);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0][0], Cell::Text("1".to_string()));
    assert_eq!(rows[3][0], Cell::Text("4".to_string()));
    for row in &rows {
      assert_eq!(row.len(), detail_headers(WorkoutType::Regular).len());
    }
  }

  #[test]
  fn test_absent_optionals_render_empty() {
    let mut result = mock_interval_result("Jane Smith");
    if let WorkoutData::Interval { summary, intervals } = &mut result.data {
      summary.average_heart_rate = None;
      summary.rest_time = None;
      intervals[0].heart_rate = None;
      intervals[0].rest_time = None;
    }

    let row = summary_row(&result, "Jane Smith");
    assert_eq!(row[5], Cell::Empty);
    assert_eq!(row[8], Cell::Empty);

    let rows = detail_rows(&result.data);
    assert_eq!(rows[0][5], Cell::Empty);
    assert_eq!(rows[0][7], Cell::Empty);
  }
}
