//! Display-name collision handling for detail sheets
//!
//! A destination gets one detail sheet per rower. When the desired display
//! name is already taken, a numeric suffix is appended until the name is
//! unique. The existing-name set must be derived from the destination's sheet
//! titles immediately before the write; see the writer docs for the
//! serialization requirement this implies.

use crate::models::WorkoutType;
use std::collections::HashSet;

const SPLIT_SUFFIX: &str = " Split Breakdown";
const INTERVAL_SUFFIX: &str = " Interval Breakdown";

/// Return `desired` unchanged if unused, otherwise the first `"desired N"`
/// (smallest N >= 2) not present in `existing`.
///
/// An empty desired name is disambiguated like any other string.
pub fn resolve_name(desired: &str, existing: &HashSet<String>) -> String {
  if !existing.contains(desired) {
    return desired.to_string();
  }

  let mut n = 2u32;
  loop {
    let candidate = format!("{} {}", desired, n);
    if !existing.contains(&candidate) {
      return candidate;
    }
    n += 1;
  }
}

/// Title of the detail sheet for a rower, e.g. `"Jane Smith Split Breakdown"`.
pub fn detail_sheet_title(name: &str, workout_type: WorkoutType) -> String {
  match workout_type {
    WorkoutType::Regular => format!("{}{}", name, SPLIT_SUFFIX),
    WorkoutType::Interval => format!("{}{}", name, INTERVAL_SUFFIX),
  }
}

/// Rower name embedded in a detail sheet title, if the title is one.
pub fn base_name(sheet_title: &str) -> Option<&str> {
  sheet_title
    .strip_suffix(SPLIT_SUFFIX)
    .or_else(|| sheet_title.strip_suffix(INTERVAL_SUFFIX))
}

/// Collect the rower names already holding a detail sheet in a destination.
pub fn existing_rower_names<'a>(sheet_titles: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
  sheet_titles
    .into_iter()
    .filter_map(base_name)
    .map(str::to_string)
    .collect()
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  fn set(names: &[&str]) -> HashSet<String> {
    names.iter().map(|n| n.to_string()).collect()
  }

  #[test]
  fn test_unused_name_passes_through() {
    assert_eq!(resolve_name("Jane Smith", &set(&[])), "Jane Smith");
    assert_eq!(resolve_name("Jane Smith", &set(&["John C150"])), "Jane Smith");
  }

  #[test]
  fn test_collision_appends_smallest_suffix() {
    assert_eq!(resolve_name("Jane Smith", &set(&["Jane Smith"])), "Jane Smith 2");
    assert_eq!(
      resolve_name("Jane Smith", &set(&["Jane Smith", "Jane Smith 2"])),
      "Jane Smith 3"
    );
    // Gaps are filled with the smallest free suffix
    assert_eq!(
      resolve_name("Jane Smith", &set(&["Jane Smith", "Jane Smith 3"])),
      "Jane Smith 2"
    );
  }

  #[test]
  fn test_result_never_collides() {
    let existing = set(&["A", "A 2", "A 3", "A 4"]);
    let resolved = resolve_name("A", &existing);
    assert!(!existing.contains(&resolved));
  }

  #[test]
  fn test_empty_name_is_disambiguated_literally() {
    assert_eq!(resolve_name("", &set(&[])), "");
    assert_eq!(resolve_name("", &set(&[""])), " 2");
  }

  #[test]
  fn test_sheet_title_round_trip() {
    let title = detail_sheet_title("Jane Smith", WorkoutType::Interval);
    assert_eq!(title, "Jane Smith Interval Breakdown");
    assert_eq!(base_name(&title), Some("Jane Smith"));

    let title = detail_sheet_title("John C150", WorkoutType::Regular);
    assert_eq!(title, "John C150 Split Breakdown");
    assert_eq!(base_name(&title), Some("John C150"));

    assert_eq!(base_name("Summary"), None);
  }

  #[test]
  fn test_existing_names_from_sheet_titles() {
    let names = existing_rower_names(vec![
      "Summary",
      "Jane Smith Interval Breakdown",
      "John C150 Split Breakdown",
    ]);
    assert_eq!(names, set(&["Jane Smith", "John C150"]));
  }
}
