//! Workout records extracted from ergometer screen images
//!
//! These are the shapes the vision extraction must produce. They are validated
//! eagerly at the extraction boundary; nothing unvalidated crosses into the
//! spreadsheet writers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ---------------------------------------------------------------------------
/// Workout Type
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutType {
  Regular,
  Interval,
}

impl WorkoutType {
  pub fn as_str(&self) -> &'static str {
    match self {
      WorkoutType::Regular => "regular",
      WorkoutType::Interval => "interval",
    }
  }
}

impl fmt::Display for WorkoutType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for WorkoutType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "regular" => Ok(WorkoutType::Regular),
      "interval" => Ok(WorkoutType::Interval),
      other => Err(format!("unknown workout type: {}", other)),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Detail Rows
/// ---------------------------------------------------------------------------

/// One split of a regular workout.
///
/// `distance` is the cumulative meter count as shown on the erg screen;
/// `watts` is derived from pace after extraction, never requested from the
/// vision model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Split {
  /// Sequence label as printed on the screen ("1", "2", ...)
  pub number: String,
  pub distance: u32,
  pub time: String,
  pub pace: String,
  pub stroke_rate: u32,
  #[serde(default)]
  pub heart_rate: Option<u32>,
  #[serde(default)]
  pub watts: Option<f64>,
}

/// One interval of an interval workout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interval {
  pub number: String,
  pub distance: u32,
  pub time: String,
  pub pace: String,
  pub stroke_rate: u32,
  #[serde(default)]
  pub heart_rate: Option<u32>,
  #[serde(default)]
  pub rest_time: Option<String>,
  #[serde(default)]
  pub watts: Option<f64>,
}

/// ---------------------------------------------------------------------------
/// Summaries
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
  pub total_distance: u32,
  pub total_time: String,
  pub average_pace: String,
  pub average_stroke_rate: u32,
  #[serde(default)]
  pub average_heart_rate: Option<u32>,
  #[serde(default)]
  pub average_watts: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalSummary {
  pub total_distance: u32,
  pub total_time: String,
  pub average_pace: String,
  pub average_stroke_rate: u32,
  #[serde(default)]
  pub average_heart_rate: Option<u32>,
  #[serde(default)]
  pub average_watts: Option<f64>,
  pub total_intervals: u32,
  #[serde(default)]
  pub rest_time: Option<String>,
}

/// ---------------------------------------------------------------------------
/// Extracted Workout
/// ---------------------------------------------------------------------------

/// Summary plus ordered detail rows, tagged by workout type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "workout_type", rename_all = "lowercase")]
pub enum WorkoutData {
  Regular {
    summary: Summary,
    splits: Vec<Split>,
  },
  Interval {
    summary: IntervalSummary,
    intervals: Vec<Interval>,
  },
}

impl WorkoutData {
  pub fn workout_type(&self) -> WorkoutType {
    match self {
      WorkoutData::Regular { .. } => WorkoutType::Regular,
      WorkoutData::Interval { .. } => WorkoutType::Interval,
    }
  }

  pub fn detail_count(&self) -> usize {
    match self {
      WorkoutData::Regular { splits, .. } => splits.len(),
      WorkoutData::Interval { intervals, .. } => intervals.len(),
    }
  }

  /// Sequence labels of the detail rows, in order.
  pub fn sequence_numbers(&self) -> Vec<&str> {
    match self {
      WorkoutData::Regular { splits, .. } => splits.iter().map(|s| s.number.as_str()).collect(),
      WorkoutData::Interval { intervals, .. } => {
        intervals.iter().map(|i| i.number.as_str()).collect()
      }
    }
  }
}

/// One fully-extracted workout, ready for the writer.
///
/// Produced once per successful extraction and consumed exactly once; the
/// only mutation after creation is filling in derived watts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutResult {
  #[serde(flatten)]
  pub data: WorkoutData,
  pub rower_name: String,
}

impl WorkoutResult {
  pub fn workout_type(&self) -> WorkoutType {
    self.data.workout_type()
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_workout_type_round_trip() {
    assert_eq!("regular".parse::<WorkoutType>().unwrap(), WorkoutType::Regular);
    assert_eq!("interval".parse::<WorkoutType>().unwrap(), WorkoutType::Interval);
    assert!("rowing".parse::<WorkoutType>().is_err());
  }

  #[test]
  fn test_result_serializes_with_type_tag() {
    let result = WorkoutResult {
      data: WorkoutData::Regular {
        summary: Summary {
          total_distance: 2000,
          total_time: "6:29.1".to_string(),
          average_pace: "1:37.2".to_string(),
          average_stroke_rate: 34,
          average_heart_rate: Some(188),
          average_watts: None,
        },
        splits: vec![],
      },
      rower_name: "John C150".to_string(),
    };

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["workout_type"], "regular");
    assert_eq!(json["summary"]["total_distance"], 2000);
    assert_eq!(json["rower_name"], "John C150");
  }

  #[test]
  fn test_interval_rows_accept_missing_optionals() {
    let interval: Interval = serde_json::from_str(
      r#"{"number":"1","distance":500,"time":"1:45.0","pace":"1:45.0","stroke_rate":28}"#,
    )
    .unwrap();

    assert_eq!(interval.heart_rate, None);
    assert_eq!(interval.rest_time, None);
    assert_eq!(interval.watts, None);
  }
}
