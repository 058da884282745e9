//! Derived power metrics
//!
//! The erg screen shows pace but the model is never asked for watts; power is
//! derived here from pace and per-row distance using the standard ergometer
//! relation `watts = 2.80 / (seconds per meter)^3`. A pace that is zero,
//! negative, or unparsable simply leaves the field empty.

use crate::models::WorkoutData;

/// ---------------------------------------------------------------------------
/// Time Parsing
/// ---------------------------------------------------------------------------

/// Parse an erg time string to seconds.
///
/// Accepts `M:SS`, `M:SS.s`, `H:MM:SS.s`, and the bare-seconds forms `SS.s`
/// and `:SS.s` that monitors show for sub-minute splits. Returns `None` for
/// anything else.
pub fn parse_time(value: &str) -> Option<f64> {
  let value = value.trim();
  if value.is_empty() {
    return None;
  }

  let (main, frac) = match value.split_once('.') {
    Some((main, frac)) => {
      if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
      }
      (main, format!("0.{}", frac).parse::<f64>().ok()?)
    }
    None => (value, 0.0),
  };

  // Monitors render sub-minute values as ":29.7"
  let main = main.strip_prefix(':').unwrap_or(main);

  let parts: Vec<&str> = main.split(':').collect();
  let whole = match parts.as_slice() {
    [s] => parse_component(s)?,
    [m, s] => parse_component(m)? * 60 + parse_component(s)?,
    [h, m, s] => parse_component(h)? * 3600 + parse_component(m)? * 60 + parse_component(s)?,
    _ => return None,
  };

  Some(whole as f64 + frac)
}

fn parse_component(s: &str) -> Option<u64> {
  if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
    return None;
  }
  s.parse().ok()
}

/// ---------------------------------------------------------------------------
/// Watts Calculation
/// ---------------------------------------------------------------------------

/// Compute watts from a pace string and the distance it covers, rounded to
/// one decimal. `None` when the pace is unusable or the distance is zero.
pub fn watts_from_pace(pace: &str, distance_m: u32) -> Option<f64> {
  if distance_m == 0 {
    return None;
  }

  let seconds = parse_time(pace)?;
  if seconds <= 0.0 {
    return None;
  }

  let seconds_per_meter = seconds / distance_m as f64;
  Some(round1(2.80 / seconds_per_meter.powi(3)))
}

fn round1(value: f64) -> f64 {
  (value * 10.0).round() / 10.0
}

/// ---------------------------------------------------------------------------
/// Derived-Field Fill
/// ---------------------------------------------------------------------------

/// Fill in watts for every detail row and the summary average.
///
/// Row distances are the deltas of the cumulative meter counts. Regular
/// workouts fall back to 500 m when a delta is unusable; intervals fall back
/// to the row's own distance. Values already supplied by the extraction are
/// left alone.
pub fn fill_derived(data: &mut WorkoutData) {
  match data {
    WorkoutData::Regular { summary, splits } => {
      let mut prev = 0i64;
      for split in splits.iter_mut() {
        let delta = split.distance as i64 - prev;
        prev = split.distance as i64;

        if split.watts.is_none() {
          let distance = if delta > 0 { delta as u32 } else { 500 };
          split.watts = watts_from_pace(&split.pace, distance);
        }
      }

      if summary.average_watts.is_none() {
        summary.average_watts = average(splits.iter().filter_map(|s| s.watts));
      }
    }
    WorkoutData::Interval { summary, intervals } => {
      let mut prev = 0i64;
      for interval in intervals.iter_mut() {
        let delta = interval.distance as i64 - prev;
        prev = interval.distance as i64;

        if interval.watts.is_none() {
          let distance = if delta > 0 { delta as u32 } else { interval.distance };
          interval.watts = watts_from_pace(&interval.pace, distance);
        }
      }

      if summary.average_watts.is_none() {
        summary.average_watts = average(intervals.iter().filter_map(|i| i.watts));
      }
    }
  }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
  let values: Vec<f64> = values.collect();
  if values.is_empty() {
    return None;
  }
  Some(round1(values.iter().sum::<f64>() / values.len() as f64))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{Split, Summary};

  #[test]
  fn test_parse_time_formats() {
    assert_eq!(parse_time("6:29.1"), Some(389.1));
    assert_eq!(parse_time("1:37.2"), Some(97.2));
    assert_eq!(parse_time("2:05"), Some(125.0));
    assert_eq!(parse_time("1:02:03.5"), Some(3723.5));
    assert_eq!(parse_time(":29.7"), Some(29.7));
    assert_eq!(parse_time("29.7"), Some(29.7));
  }

  #[test]
  fn test_parse_time_rejects_garbage() {
    assert_eq!(parse_time(""), None);
    assert_eq!(parse_time("fast"), None);
    assert_eq!(parse_time("1:2:3:4"), None);
    assert_eq!(parse_time("-1:00"), None);
    assert_eq!(parse_time("1:00."), None);
    assert_eq!(parse_time("1:0x.3"), None);
  }

  #[test]
  fn test_watts_known_value() {
    // 2:00 per 500m is the canonical 202.5W reference point
    assert_eq!(watts_from_pace("2:00.0", 500), Some(202.5));
  }

  #[test]
  fn test_watts_not_computable() {
    assert_eq!(watts_from_pace("0:00.0", 500), None);
    assert_eq!(watts_from_pace("2:00.0", 0), None);
    assert_eq!(watts_from_pace("??", 500), None);
  }

  fn split(number: &str, distance: u32, pace: &str) -> Split {
    Split {
      number: number.to_string(),
      distance,
      time: "1:45.0".to_string(),
      pace: pace.to_string(),
      stroke_rate: 30,
      heart_rate: None,
      watts: None,
    }
  }

  #[test]
  fn test_fill_derived_uses_cumulative_deltas() {
    let mut data = WorkoutData::Regular {
      summary: Summary {
        total_distance: 1000,
        total_time: "4:00.0".to_string(),
        average_pace: "2:00.0".to_string(),
        average_stroke_rate: 30,
        average_heart_rate: None,
        average_watts: None,
      },
      splits: vec![split("1", 500, "2:00.0"), split("2", 1000, "2:00.0")],
    };

    fill_derived(&mut data);

    let WorkoutData::Regular { summary, splits } = &data else {
      unreachable!()
    };
    // Both rows cover 500m at 2:00, so both land on the reference wattage
    assert_eq!(splits[0].watts, Some(202.5));
    assert_eq!(splits[1].watts, Some(202.5));
    assert_eq!(summary.average_watts, Some(202.5));
  }

  #[test]
  fn test_fill_derived_keeps_supplied_values() {
    let mut data = WorkoutData::Regular {
      summary: Summary {
        total_distance: 500,
        total_time: "2:00.0".to_string(),
        average_pace: "2:00.0".to_string(),
        average_stroke_rate: 30,
        average_heart_rate: None,
        average_watts: Some(250.0),
      },
      splits: vec![Split {
        watts: Some(199.9),
        ..split("1", 500, "2:00.0")
      }],
    };

    fill_derived(&mut data);

    let WorkoutData::Regular { summary, splits } = &data else {
      unreachable!()
    };
    assert_eq!(splits[0].watts, Some(199.9));
    assert_eq!(summary.average_watts, Some(250.0));
  }

  #[test]
  fn test_fill_derived_leaves_unparsable_pace_empty() {
    let mut data = WorkoutData::Regular {
      summary: Summary {
        total_distance: 500,
        total_time: "2:00.0".to_string(),
        average_pace: "2:00.0".to_string(),
        average_stroke_rate: 30,
        average_heart_rate: None,
        average_watts: None,
      },
      splits: vec![split("1", 500, "n/a")],
    };

    fill_derived(&mut data);

    let WorkoutData::Regular { summary, splits } = &data else {
      unreachable!()
    };
    assert_eq!(splits[0].watts, None);
    assert_eq!(summary.average_watts, None);
  }
}
