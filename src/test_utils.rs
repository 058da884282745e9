//! Mock data factories shared across tests

use crate::models::{
  Interval, IntervalSummary, Split, Summary, WorkoutData, WorkoutResult,
};

/// A 2000m regular workout with four 500m splits.
pub fn mock_regular_result(rower_name: &str) -> WorkoutResult {
  let splits = vec![
    mock_split("1", 500, "1:37.0", "1:37.0", 35, Some(182)),
    mock_split("2", 1000, "1:38.1", "1:38.1", 34, Some(187)),
    mock_split("3", 1500, "1:37.8", "1:37.8", 33, Some(190)),
    mock_split("4", 2000, "1:36.2", "1:36.2", 36, Some(193)),
  ];

  WorkoutResult {
    data: WorkoutData::Regular {
      summary: Summary {
        total_distance: 2000,
        total_time: "6:29.1".to_string(),
        average_pace: "1:37.2".to_string(),
        average_stroke_rate: 34,
        average_heart_rate: Some(188),
        average_watts: None,
      },
      splits,
    },
    rower_name: rower_name.to_string(),
  }
}

/// A 4x500m interval workout with rest periods.
pub fn mock_interval_result(rower_name: &str) -> WorkoutResult {
  let intervals = vec![
    mock_interval("1", 500, "1:45.0", "1:45.0", 30, Some(165), Some("1:00.0")),
    mock_interval("2", 1000, "1:46.3", "1:46.3", 29, Some(172), Some("1:00.0")),
    mock_interval("3", 1500, "1:47.1", "1:47.1", 29, Some(176), Some("1:00.0")),
    mock_interval("4", 2000, "1:44.8", "1:44.8", 31, Some(181), None),
  ];

  WorkoutResult {
    data: WorkoutData::Interval {
      summary: IntervalSummary {
        total_distance: 2000,
        total_time: "10:03.2".to_string(),
        average_pace: "1:45.8".to_string(),
        average_stroke_rate: 30,
        average_heart_rate: Some(174),
        average_watts: None,
        total_intervals: 4,
        rest_time: Some("3:00.0".to_string()),
      },
      intervals,
    },
    rower_name: rower_name.to_string(),
  }
}

fn mock_split(
  number: &str,
  distance: u32,
  time: &str,
  pace: &str,
  stroke_rate: u32,
  heart_rate: Option<u32>,
) -> Split {
  Split {
    number: number.to_string(),
    distance,
    time: time.to_string(),
    pace: pace.to_string(),
    stroke_rate,
    heart_rate,
    watts: None,
  }
}

#[allow(clippy::too_many_arguments)]
fn mock_interval(
  number: &str,
  distance: u32,
  time: &str,
  pace: &str,
  stroke_rate: u32,
  heart_rate: Option<u32>,
  rest_time: Option<&str>,
) -> Interval {
  Interval {
    number: number.to_string(),
    distance,
    time: time.to_string(),
    pace: pace.to_string(),
    stroke_rate,
    heart_rate,
    rest_time: rest_time.map(str::to_string),
    watts: None,
  }
}
