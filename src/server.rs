//! Web interface: upload, file listing, and workbook download
//!
//! Thin HTTP glue over the extraction and writer modules. Each upload request
//! runs end-to-end (extract, derive, write) before responding; the only long
//! wait is the vision call itself.

use crate::models::{Destination, Location, WorkoutResult, WorkoutType};
use crate::power;
use crate::vision::{ExtractionError, VisionClient};
use crate::writer::{self, WriteError};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

const XLSX_CONTENT_TYPE: &str =
  "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff"];
const DEFAULT_ROWER_NAME: &str = "John C150";

/// Shared application context passed to all handlers
pub struct AppContext {
  pub output_dir: PathBuf,
}

/// ---------------------------------------------------------------------------
/// Server Setup
/// ---------------------------------------------------------------------------

pub fn router(ctx: Arc<AppContext>) -> Router {
  Router::new()
    .route("/upload", post(upload))
    .route("/files", get(list_files))
    .route("/download/:filename", get(download))
    .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(ctx)
}

pub async fn run(port: u16, output_dir: PathBuf) -> anyhow::Result<()> {
  tokio::fs::create_dir_all(&output_dir).await?;

  let app = router(Arc::new(AppContext { output_dir }));
  let addr = SocketAddr::from(([0, 0, 0, 0], port));
  let listener = tokio::net::TcpListener::bind(addr).await?;
  info!("listening on http://{}", addr);
  axum::serve(listener, app).await?;
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Error Mapping
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorBody {
  success: bool,
  error: String,
}

struct ApiError {
  status: StatusCode,
  message: String,
}

impl ApiError {
  fn bad_request(message: impl Into<String>) -> Self {
    Self {
      status: StatusCode::BAD_REQUEST,
      message: message.into(),
    }
  }

  fn internal(message: impl Into<String>) -> Self {
    Self {
      status: StatusCode::INTERNAL_SERVER_ERROR,
      message: message.into(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = ErrorBody {
      success: false,
      error: self.message,
    };
    (self.status, Json(body)).into_response()
  }
}

impl From<ExtractionError> for ApiError {
  fn from(e: ExtractionError) -> Self {
    let status = match e {
      ExtractionError::InvalidImage(_) => StatusCode::BAD_REQUEST,
      ExtractionError::ProviderFailure(_) | ExtractionError::SchemaMismatch(_) => {
        StatusCode::BAD_GATEWAY
      }
    };
    Self {
      status,
      message: e.to_string(),
    }
  }
}

impl From<WriteError> for ApiError {
  fn from(e: WriteError) -> Self {
    let status = match e {
      WriteError::MalformedExistingDestination(_) => StatusCode::BAD_REQUEST,
      WriteError::DestinationUnreachable(_) | WriteError::PartialWriteFailure(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };
    Self {
      status,
      message: e.to_string(),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Upload
/// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct UploadForm {
  image: Option<Vec<u8>>,
  filename: Option<String>,
  workout_type: Option<String>,
  name: Option<String>,
  output_format: Option<String>,
  spreadsheet_option: Option<String>,
  existing_filename: Option<String>,
  sheet_name: Option<String>,
  sheet_url: Option<String>,
}

async fn read_form(multipart: &mut Multipart) -> Result<UploadForm, ApiError> {
  let mut form = UploadForm::default();

  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| ApiError::bad_request(e.to_string()))?
  {
    let Some(field_name) = field.name().map(str::to_string) else {
      continue;
    };

    if field_name == "file" {
      form.filename = field.file_name().map(str::to_string);
      let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
      form.image = Some(bytes.to_vec());
      continue;
    }

    let value = field
      .text()
      .await
      .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let value = if value.is_empty() { None } else { Some(value) };

    match field_name.as_str() {
      "workout_type" => form.workout_type = value,
      "name" => form.name = value,
      "output_format" => form.output_format = value,
      "spreadsheet_option" => form.spreadsheet_option = value,
      "existing_filename" => form.existing_filename = value,
      "sheet_name" => form.sheet_name = value,
      "sheet_url" => form.sheet_url = value,
      _ => {}
    }
  }

  Ok(form)
}

fn allowed_file(filename: &str) -> bool {
  filename
    .rsplit_once('.')
    .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    .unwrap_or(false)
}

/// Keep a client-supplied name inside the output directory.
fn sanitize_filename(filename: &str) -> Result<&str, ApiError> {
  if filename.is_empty()
    || filename.contains('/')
    || filename.contains('\\')
    || filename.contains("..")
  {
    return Err(ApiError::bad_request("Invalid filename"));
  }
  Ok(filename)
}

fn generated_output_filename() -> String {
  format!("erg_workout_{}.xlsx", Local::now().format("%Y%m%d_%H%M%S"))
}

fn select_destination(form: &UploadForm, ctx: &AppContext) -> Result<Destination, ApiError> {
  if form.output_format.as_deref() == Some("sheets") {
    if let Some(url) = &form.sheet_url {
      return Ok(Destination::ExistingOnlineSheet { url: url.clone() });
    }
    return Ok(Destination::NewOnlineSheet {
      title: form.sheet_name.clone(),
    });
  }

  if form.spreadsheet_option.as_deref() == Some("existing") {
    let filename = form
      .existing_filename
      .as_deref()
      .ok_or_else(|| ApiError::bad_request("No existing file selected"))?;
    let filename = sanitize_filename(filename)?;
    return Ok(Destination::ExistingWorkbook(ctx.output_dir.join(filename)));
  }

  Ok(Destination::NewWorkbook(
    ctx.output_dir.join(generated_output_filename()),
  ))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
  success: bool,
  data: WorkoutResult,
  #[serde(skip_serializing_if = "Option::is_none")]
  output_filename: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  sheet_url: Option<String>,
  message: String,
}

async fn upload(
  State(ctx): State<Arc<AppContext>>,
  mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
  let form = read_form(&mut multipart).await?;

  let image = form
    .image
    .as_deref()
    .filter(|bytes| !bytes.is_empty())
    .ok_or_else(|| ApiError::bad_request("No file selected"))?;
  let filename = form
    .filename
    .as_deref()
    .ok_or_else(|| ApiError::bad_request("No file selected"))?;
  if !allowed_file(filename) {
    return Err(ApiError::bad_request("Invalid file type"));
  }

  let workout_type: WorkoutType = form
    .workout_type
    .as_deref()
    .unwrap_or("regular")
    .parse()
    .map_err(ApiError::bad_request)?;
  let rower_name = form
    .name
    .clone()
    .unwrap_or_else(|| DEFAULT_ROWER_NAME.to_string());

  let destination = select_destination(&form, &ctx)?;

  let client = VisionClient::from_env().map_err(ApiError::from)?;
  let mut data = client.extract(image, workout_type).await?;
  power::fill_derived(&mut data);

  let result = WorkoutResult { data, rower_name };
  let location = writer::write(&result, &destination).await?;

  let (output_filename, sheet_url) = match &location {
    Location::Workbook(path) => (
      path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned()),
      None,
    ),
    Location::OnlineSheet(url) => (None, Some(url.clone())),
  };

  let message = format!("{} workout processed successfully", workout_type);
  info!(%location, "upload processed");

  Ok(Json(UploadResponse {
    success: true,
    data: result,
    output_filename,
    sheet_url,
    message,
  }))
}

/// ---------------------------------------------------------------------------
/// File Listing
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct FileEntry {
  name: String,
  size: u64,
  modified: String,
}

#[derive(Debug, Serialize)]
struct FileListing {
  files: Vec<FileEntry>,
}

async fn list_files(State(ctx): State<Arc<AppContext>>) -> Result<Json<FileListing>, ApiError> {
  let mut entries: Vec<(SystemTime, FileEntry)> = Vec::new();

  let mut dir = tokio::fs::read_dir(&ctx.output_dir)
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?;

  while let Some(entry) = dir
    .next_entry()
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?
  {
    let path = entry.path();
    if path.extension().and_then(|e| e.to_str()) != Some("xlsx") {
      continue;
    }

    let metadata = entry
      .metadata()
      .await
      .map_err(|e| ApiError::internal(e.to_string()))?;
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    entries.push((
      modified,
      FileEntry {
        name: entry.file_name().to_string_lossy().into_owned(),
        size: metadata.len(),
        modified: DateTime::<Local>::from(modified)
          .format("%Y-%m-%d %H:%M:%S")
          .to_string(),
      },
    ));
  }

  // Newest first
  entries.sort_by(|a, b| b.0.cmp(&a.0));

  Ok(Json(FileListing {
    files: entries.into_iter().map(|(_, e)| e).collect(),
  }))
}

/// ---------------------------------------------------------------------------
/// Download
/// ---------------------------------------------------------------------------

async fn download(
  State(ctx): State<Arc<AppContext>>,
  Path(filename): Path<String>,
) -> Result<Response, ApiError> {
  let filename = sanitize_filename(&filename)?.to_string();
  let path = ctx.output_dir.join(&filename);

  let bytes = match tokio::fs::read(&path).await {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      return Err(ApiError {
        status: StatusCode::NOT_FOUND,
        message: "File not found".to_string(),
      });
    }
    Err(e) => return Err(ApiError::internal(e.to_string())),
  };

  let headers = [
    (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
    (
      header::CONTENT_DISPOSITION,
      format!("attachment; filename=\"{}\"", filename),
    ),
  ];
  Ok((headers, bytes).into_response())
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
