//! Write destinations and the location handles they produce

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Where a workout should be written. Selected per request, never persisted.
#[derive(Debug, Clone)]
pub enum Destination {
  /// Create a fresh workbook at the given path.
  NewWorkbook(PathBuf),
  /// Append to a workbook that already exists on disk.
  ExistingWorkbook(PathBuf),
  /// Create a new Google Sheet; `title` overrides the generated name.
  NewOnlineSheet { title: Option<String> },
  /// Append to an existing Google Sheet identified by its browser URL.
  ExistingOnlineSheet { url: String },
}

/// Opaque handle returned after a successful write.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Location {
  Workbook(PathBuf),
  OnlineSheet(String),
}

impl fmt::Display for Location {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Location::Workbook(path) => write!(f, "{}", path.display()),
      Location::OnlineSheet(url) => f.write_str(url),
    }
  }
}
