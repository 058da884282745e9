//! Local workbook backend (.xlsx)
//!
//! Workbooks are edited in memory and saved in one pass, so a failed save
//! leaves an existing file untouched. The Summary sheet holds one row per
//! workout; each rower gets a detail sheet named by the collision resolver.

use crate::models::{Location, WorkoutResult};
use crate::naming;
use crate::writer::{detail_headers, detail_rows, summary_headers, summary_row, Cell, WriteError};
use std::path::Path;
use tracing::info;
use umya_spreadsheet::{Spreadsheet, Worksheet};

const SUMMARY_SHEET: &str = "Summary";

/// ---------------------------------------------------------------------------
/// New Workbook
/// ---------------------------------------------------------------------------

/// Write a workout into a fresh workbook at `path`.
pub fn create(result: &WorkoutResult, path: &Path) -> Result<Location, WriteError> {
  let mut book = umya_spreadsheet::new_file_empty_worksheet();

  let summary = new_sheet(&mut book, SUMMARY_SHEET)?;
  write_row(summary, 1, summary_headers(result.workout_type()));
  write_cells(summary, 2, &summary_row(result, &result.rower_name));

  add_detail_sheet(&mut book, result, &result.rower_name)?;

  save(&book, path)?;
  info!(path = %path.display(), "workbook created");
  Ok(Location::Workbook(path.to_path_buf()))
}

/// ---------------------------------------------------------------------------
/// Existing Workbook
/// ---------------------------------------------------------------------------

/// Append a workout to the workbook at `path`.
///
/// The rower name is resolved against the detail sheets already present; the
/// Summary sheet gains one row (with a header first if the sheet is empty).
/// When no sheet named "Summary" exists the first sheet in the workbook is
/// used as the summary target instead of failing.
pub fn append(result: &WorkoutResult, path: &Path) -> Result<Location, WriteError> {
  if !path.exists() {
    return Err(WriteError::DestinationUnreachable(format!(
      "no such workbook: {}",
      path.display()
    )));
  }

  let mut book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| {
    WriteError::MalformedExistingDestination(format!(
      "{} does not open as a workbook: {}",
      path.display(),
      e
    ))
  })?;

  let existing = naming::existing_rower_names(
    book
      .get_sheet_collection()
      .iter()
      .map(|sheet| sheet.get_name()),
  );
  let resolved = naming::resolve_name(&result.rower_name, &existing);

  let summary_title = summary_target(&mut book)?;
  let summary = book
    .get_sheet_by_name_mut(&summary_title)
    .ok_or_else(|| WriteError::DestinationUnreachable("summary sheet vanished".to_string()))?;

  let mut next_row = summary.get_highest_row() + 1;
  if next_row == 1 {
    write_row(summary, 1, summary_headers(result.workout_type()));
    next_row = 2;
  }
  write_cells(summary, next_row, &summary_row(result, &resolved));

  add_detail_sheet(&mut book, result, &resolved)?;

  save(&book, path)?;
  info!(path = %path.display(), rower = %resolved, "workbook appended");
  Ok(Location::Workbook(path.to_path_buf()))
}

/// Name of the sheet the summary row goes to, creating "Summary" only when
/// the workbook has no sheets at all.
fn summary_target(book: &mut Spreadsheet) -> Result<String, WriteError> {
  if book.get_sheet_by_name(SUMMARY_SHEET).is_some() {
    return Ok(SUMMARY_SHEET.to_string());
  }
  if let Some(first) = book.get_sheet_collection().first() {
    return Ok(first.get_name().to_string());
  }
  new_sheet(book, SUMMARY_SHEET)?;
  Ok(SUMMARY_SHEET.to_string())
}

/// ---------------------------------------------------------------------------
/// Sheet Helpers
/// ---------------------------------------------------------------------------

fn add_detail_sheet(
  book: &mut Spreadsheet,
  result: &WorkoutResult,
  resolved_name: &str,
) -> Result<(), WriteError> {
  let title = naming::detail_sheet_title(resolved_name, result.workout_type());
  let sheet = new_sheet(book, &title)?;

  write_row(sheet, 1, detail_headers(result.workout_type()));
  for (i, row) in detail_rows(&result.data).iter().enumerate() {
    write_cells(sheet, i as u32 + 2, row);
  }
  Ok(())
}

fn new_sheet<'a>(book: &'a mut Spreadsheet, title: &str) -> Result<&'a mut Worksheet, WriteError> {
  book
    .new_sheet(title)
    .map_err(|e| WriteError::DestinationUnreachable(format!("could not add sheet {:?}: {}", title, e)))
}

fn write_row(sheet: &mut Worksheet, row: u32, values: &[&str]) {
  for (i, value) in values.iter().enumerate() {
    sheet.get_cell_mut((i as u32 + 1, row)).set_value(*value);
  }
}

fn write_cells(sheet: &mut Worksheet, row: u32, cells: &[Cell]) {
  for (i, cell) in cells.iter().enumerate() {
    let coordinate = (i as u32 + 1, row);
    match cell {
      Cell::Text(text) => {
        sheet.get_cell_mut(coordinate).set_value(text.as_str());
      }
      Cell::Number(value) => {
        sheet.get_cell_mut(coordinate).set_value_number(*value);
      }
      Cell::Empty => {}
    }
  }
}

fn save(book: &Spreadsheet, path: &Path) -> Result<(), WriteError> {
  umya_spreadsheet::writer::xlsx::write(book, path)
    .map_err(|e| WriteError::DestinationUnreachable(format!("saving {}: {}", path.display(), e)))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
