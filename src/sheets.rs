//! Google Sheets backend
//!
//! Talks to the Sheets and Drive REST APIs with a bearer token obtained by
//! exchanging a long-lived refresh token, the same shape as any other OAuth
//! API client. Newly created spreadsheets are shared link-writable so a crew
//! can edit without per-user grants; that is the sharing default, not a
//! security mechanism.

use crate::models::{Location, WorkoutResult};
use crate::naming;
use crate::writer::{detail_headers, detail_rows, summary_headers, summary_row, Cell, WriteError};
use chrono::Local;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

/// ---------------------------------------------------------------------------
/// Configuration Constants
/// ---------------------------------------------------------------------------

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const DRIVE_API_BASE: &str = "https://www.googleapis.com";

const SUMMARY_SHEET: &str = "Summary";

/// ---------------------------------------------------------------------------
/// OAuth Configuration
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SheetsConfig {
  pub client_id: String,
  pub client_secret: String,
  pub refresh_token: String,
}

impl SheetsConfig {
  pub fn from_env() -> Result<Self, WriteError> {
    Ok(Self {
      client_id: require_env("GOOGLE_CLIENT_ID")?,
      client_secret: require_env("GOOGLE_CLIENT_SECRET")?,
      refresh_token: require_env("GOOGLE_REFRESH_TOKEN")?,
    })
  }
}

fn require_env(name: &str) -> Result<String, WriteError> {
  std::env::var(name)
    .map_err(|_| WriteError::DestinationUnreachable(format!("{} not set", name)))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
}

/// ---------------------------------------------------------------------------
/// API Response Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetCreated {
  spreadsheet_id: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
  sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
  properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
  title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
  #[serde(default)]
  values: Vec<Vec<serde_json::Value>>,
}

/// ---------------------------------------------------------------------------
/// Sheets Client
/// ---------------------------------------------------------------------------

pub struct SheetsClient {
  client: Client,
  config: SheetsConfig,
  token_url: String,
  sheets_base: String,
  drive_base: String,
}

impl SheetsClient {
  /// Create a client, loading OAuth credentials from the environment.
  pub fn from_env() -> Result<Self, WriteError> {
    Ok(Self {
      client: Client::new(),
      config: SheetsConfig::from_env()?,
      token_url: TOKEN_URL.to_string(),
      sheets_base: SHEETS_API_BASE.to_string(),
      drive_base: DRIVE_API_BASE.to_string(),
    })
  }

  #[cfg(test)]
  fn with_base_urls(base: &str) -> Self {
    Self {
      client: Client::new(),
      config: SheetsConfig {
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        refresh_token: "refresh".to_string(),
      },
      token_url: format!("{}/token", base),
      sheets_base: base.to_string(),
      drive_base: base.to_string(),
    }
  }

  /// ---------------------------------------------------------------------------
  /// Write Paths
  /// ---------------------------------------------------------------------------

  /// Create a new spreadsheet and write the workout into it.
  pub async fn create(
    &self,
    result: &WorkoutResult,
    title: Option<&str>,
  ) -> Result<Location, WriteError> {
    let token = self.access_token().await?;

    let title = match title {
      Some(t) => t.to_string(),
      None => generate_sheet_title(&result.rower_name),
    };

    let response = self
      .client
      .post(self.sheets_url(&["v4", "spreadsheets"], None)?)
      .bearer_auth(&token)
      .json(&json!({
        "properties": {"title": title},
        "sheets": [{"properties": {"title": SUMMARY_SHEET}}],
      }))
      .send()
      .await
      .map_err(request_error)?;
    if !response.status().is_success() {
      return Err(api_error("creating spreadsheet", response).await);
    }
    let created: SpreadsheetCreated = response.json().await.map_err(request_error)?;
    let id = created.spreadsheet_id;

    self.share_with_link(&token, &id).await;

    // The sheet is brand new, so the name cannot collide yet
    let rows = headers_and_row(result, &result.rower_name);
    self
      .update_values(&token, &id, &range_of(SUMMARY_SHEET), rows)
      .await?;

    self
      .write_detail(&token, &id, result, &result.rower_name)
      .await
      .map_err(partial_after_summary)?;

    info!(spreadsheet_id = %id, "online sheet created");
    Ok(Location::OnlineSheet(sheet_url(&id)))
  }

  /// Append the workout to an existing spreadsheet identified by URL.
  pub async fn append(&self, result: &WorkoutResult, url: &str) -> Result<Location, WriteError> {
    let id = parse_spreadsheet_id(url)?;
    let token = self.access_token().await?;

    let titles = self.sheet_titles(&token, &id).await?;
    let existing = naming::existing_rower_names(titles.iter().map(String::as_str));
    let resolved = naming::resolve_name(&result.rower_name, &existing);

    // Fall back to the first sheet when no "Summary" sheet exists
    let summary_title = titles
      .iter()
      .find(|t| t.as_str() == SUMMARY_SHEET)
      .or_else(|| titles.first())
      .ok_or_else(|| {
        WriteError::MalformedExistingDestination("spreadsheet has no sheets".to_string())
      })?
      .clone();

    let row = summary_row(result, &resolved)
      .iter()
      .map(cell_to_value)
      .collect::<Vec<_>>();

    if self.sheet_is_empty(&token, &id, &summary_title).await? {
      let rows = headers_and_row(result, &resolved);
      self
        .update_values(&token, &id, &range_of(&summary_title), rows)
        .await?;
    } else {
      self
        .append_values(&token, &id, &range_of(&summary_title), vec![row])
        .await?;
    }

    self
      .write_detail(&token, &id, result, &resolved)
      .await
      .map_err(partial_after_summary)?;

    info!(spreadsheet_id = %id, rower = %resolved, "online sheet appended");
    Ok(Location::OnlineSheet(sheet_url(&id)))
  }

  /// ---------------------------------------------------------------------------
  /// Token Exchange
  /// ---------------------------------------------------------------------------

  async fn access_token(&self) -> Result<String, WriteError> {
    let response = self
      .client
      .post(&self.token_url)
      .form(&[
        ("client_id", self.config.client_id.as_str()),
        ("client_secret", self.config.client_secret.as_str()),
        ("refresh_token", self.config.refresh_token.as_str()),
        ("grant_type", "refresh_token"),
      ])
      .send()
      .await
      .map_err(request_error)?;

    if !response.status().is_success() {
      return Err(api_error("token refresh", response).await);
    }

    let token: TokenResponse = response.json().await.map_err(request_error)?;
    Ok(token.access_token)
  }

  /// ---------------------------------------------------------------------------
  /// Sheets API Calls
  /// ---------------------------------------------------------------------------

  async fn sheet_titles(&self, token: &str, id: &str) -> Result<Vec<String>, WriteError> {
    let mut url = self.sheets_url(&["v4", "spreadsheets", id], None)?;
    url.query_pairs_mut().append_pair("fields", "sheets.properties");

    let response = self
      .client
      .get(url)
      .bearer_auth(token)
      .send()
      .await
      .map_err(request_error)?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Err(WriteError::MalformedExistingDestination(format!(
        "no spreadsheet with id {}",
        id
      )));
    }
    if !response.status().is_success() {
      return Err(api_error("loading spreadsheet", response).await);
    }

    let meta: SpreadsheetMeta = response.json().await.map_err(request_error)?;
    Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
  }

  async fn sheet_is_empty(&self, token: &str, id: &str, title: &str) -> Result<bool, WriteError> {
    let url = self.sheets_url(
      &["v4", "spreadsheets", id, "values", &format!("{}!A1:A1", quote_title(title))],
      None,
    )?;

    let response = self
      .client
      .get(url)
      .bearer_auth(token)
      .send()
      .await
      .map_err(request_error)?;
    if !response.status().is_success() {
      return Err(api_error("checking summary sheet", response).await);
    }

    let values: ValueRange = response.json().await.map_err(request_error)?;
    Ok(values.values.is_empty())
  }

  async fn update_values(
    &self,
    token: &str,
    id: &str,
    range: &str,
    rows: Vec<Vec<serde_json::Value>>,
  ) -> Result<(), WriteError> {
    let url = self.sheets_url(&["v4", "spreadsheets", id, "values", range], Some("RAW"))?;

    let response = self
      .client
      .put(url)
      .bearer_auth(token)
      .json(&json!({"values": rows}))
      .send()
      .await
      .map_err(request_error)?;
    if !response.status().is_success() {
      return Err(api_error("writing values", response).await);
    }
    Ok(())
  }

  async fn append_values(
    &self,
    token: &str,
    id: &str,
    range: &str,
    rows: Vec<Vec<serde_json::Value>>,
  ) -> Result<(), WriteError> {
    let url = self.sheets_url(
      &["v4", "spreadsheets", id, "values", &format!("{}:append", range)],
      Some("RAW"),
    )?;

    let response = self
      .client
      .post(url)
      .bearer_auth(token)
      .json(&json!({"values": rows}))
      .send()
      .await
      .map_err(request_error)?;
    if !response.status().is_success() {
      return Err(api_error("appending values", response).await);
    }
    Ok(())
  }

  async fn add_sheet(&self, token: &str, id: &str, title: &str) -> Result<(), WriteError> {
    let url = self.sheets_url(&["v4", "spreadsheets", &format!("{}:batchUpdate", id)], None)?;

    let response = self
      .client
      .post(url)
      .bearer_auth(token)
      .json(&json!({
        "requests": [{"addSheet": {"properties": {"title": title}}}],
      }))
      .send()
      .await
      .map_err(request_error)?;
    if !response.status().is_success() {
      return Err(api_error("adding detail sheet", response).await);
    }
    Ok(())
  }

  async fn write_detail(
    &self,
    token: &str,
    id: &str,
    result: &WorkoutResult,
    resolved_name: &str,
  ) -> Result<(), WriteError> {
    let title = naming::detail_sheet_title(resolved_name, result.workout_type());
    self.add_sheet(token, id, &title).await?;

    let mut rows: Vec<Vec<serde_json::Value>> = vec![header_values(detail_headers(
      result.workout_type(),
    ))];
    for row in detail_rows(&result.data) {
      rows.push(row.iter().map(cell_to_value).collect());
    }

    self.update_values(token, id, &range_of(&title), rows).await
  }

  /// Open the spreadsheet to anyone with the link, as a writer. Sharing is
  /// best-effort; a refusal is logged and the write continues.
  async fn share_with_link(&self, token: &str, id: &str) {
    let url = match self.drive_url(&["drive", "v3", "files", id, "permissions"]) {
      Ok(url) => url,
      Err(e) => {
        warn!("could not build drive permissions url: {}", e);
        return;
      }
    };

    let outcome = self
      .client
      .post(url)
      .bearer_auth(token)
      .query(&[("sendNotificationEmail", "false")])
      .json(&json!({"type": "anyone", "role": "writer"}))
      .send()
      .await;

    match outcome {
      Ok(response) if response.status().is_success() => {}
      Ok(response) => warn!("could not share spreadsheet: HTTP {}", response.status()),
      Err(e) => warn!("could not share spreadsheet: {}", e),
    }
  }

  /// ---------------------------------------------------------------------------
  /// URL Helpers
  /// ---------------------------------------------------------------------------

  fn sheets_url(&self, segments: &[&str], value_input: Option<&str>) -> Result<Url, WriteError> {
    let mut url = Url::parse(&self.sheets_base)
      .map_err(|e| WriteError::DestinationUnreachable(e.to_string()))?;
    url
      .path_segments_mut()
      .map_err(|_| WriteError::DestinationUnreachable("invalid api base".to_string()))?
      .extend(segments);
    if let Some(option) = value_input {
      url.query_pairs_mut().append_pair("valueInputOption", option);
    }
    Ok(url)
  }

  fn drive_url(&self, segments: &[&str]) -> Result<Url, WriteError> {
    let mut url = Url::parse(&self.drive_base)
      .map_err(|e| WriteError::DestinationUnreachable(e.to_string()))?;
    url
      .path_segments_mut()
      .map_err(|_| WriteError::DestinationUnreachable("invalid api base".to_string()))?
      .extend(segments);
    Ok(url)
  }
}

/// ---------------------------------------------------------------------------
/// Free Helpers
/// ---------------------------------------------------------------------------

fn request_error(e: reqwest::Error) -> WriteError {
  WriteError::DestinationUnreachable(e.to_string())
}

async fn api_error(what: &str, response: reqwest::Response) -> WriteError {
  let status = response.status();
  let body = response.text().await.unwrap_or_default();
  WriteError::DestinationUnreachable(format!("{} failed: HTTP {}: {}", what, status, body))
}

fn partial_after_summary(e: WriteError) -> WriteError {
  WriteError::PartialWriteFailure(format!("summary row written; detail sheet failed: {}", e))
}

fn headers_and_row(result: &WorkoutResult, resolved_name: &str) -> Vec<Vec<serde_json::Value>> {
  vec![
    header_values(summary_headers(result.workout_type())),
    summary_row(result, resolved_name)
      .iter()
      .map(cell_to_value)
      .collect(),
  ]
}

fn header_values(headers: &[&str]) -> Vec<serde_json::Value> {
  headers.iter().map(|h| json!(h)).collect()
}

fn cell_to_value(cell: &Cell) -> serde_json::Value {
  match cell {
    Cell::Text(text) => json!(text),
    Cell::Number(value) => json!(value),
    Cell::Empty => json!(""),
  }
}

/// A1-notation range covering a whole sheet.
fn range_of(title: &str) -> String {
  format!("{}!A1", quote_title(title))
}

/// Sheet titles in A1 notation are single-quoted, with embedded quotes doubled.
fn quote_title(title: &str) -> String {
  format!("'{}'", title.replace('\'', "''"))
}

/// `"<rower name> - YYYY-MM-DD HH:MM:SS"`, the auto-generated title.
pub fn generate_sheet_title(base: &str) -> String {
  format!("{} - {}", base, Local::now().format("%Y-%m-%d %H:%M:%S"))
}

fn sheet_url(id: &str) -> String {
  format!("https://docs.google.com/spreadsheets/d/{}/edit", id)
}

/// Spreadsheet id from a browser URL like
/// `https://docs.google.com/spreadsheets/d/<id>/edit#gid=0`.
pub fn parse_spreadsheet_id(raw: &str) -> Result<String, WriteError> {
  let url = Url::parse(raw)
    .map_err(|e| WriteError::MalformedExistingDestination(format!("{}: {}", raw, e)))?;

  let segments: Vec<&str> = url
    .path_segments()
    .map(|s| s.collect())
    .unwrap_or_default();

  let id = segments
    .windows(3)
    .find(|w| w[0] == "spreadsheets" && w[1] == "d" && !w[2].is_empty())
    .map(|w| w[2].to_string());

  id.ok_or_else(|| {
    WriteError::MalformedExistingDestination(format!("not a spreadsheet url: {}", raw))
  })
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::mock_regular_result;
  use mockito::Matcher;

  #[test]
  fn test_parse_spreadsheet_id() {
    let id =
      parse_spreadsheet_id("https://docs.google.com/spreadsheets/d/abc123XYZ/edit#gid=0").unwrap();
    assert_eq!(id, "abc123XYZ");

    assert!(matches!(
      parse_spreadsheet_id("https://docs.google.com/document/d/abc/edit"),
      Err(WriteError::MalformedExistingDestination(_))
    ));
    assert!(matches!(
      parse_spreadsheet_id("not a url"),
      Err(WriteError::MalformedExistingDestination(_))
    ));
  }

  #[test]
  fn test_generated_title_shape() {
    let title = generate_sheet_title("Jane Smith");
    let stamp = title.strip_prefix("Jane Smith - ").unwrap();
    assert!(chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").is_ok());
  }

  #[test]
  fn test_quote_title_escapes_apostrophes() {
    assert_eq!(quote_title("Summary"), "'Summary'");
    assert_eq!(quote_title("O'Brien Split Breakdown"), "'O''Brien Split Breakdown'");
  }

  async fn token_mock(server: &mut mockito::Server) -> mockito::Mock {
    server
      .mock("POST", "/token")
      .with_status(200)
      .with_body(r#"{"access_token": "tok", "expires_in": 3599, "token_type": "Bearer"}"#)
      .create_async()
      .await
  }

  #[tokio::test]
  async fn test_create_writes_summary_and_detail() {
    let mut server = mockito::Server::new_async().await;
    let _token = token_mock(&mut server).await;

    let created = server
      .mock("POST", "/v4/spreadsheets")
      .with_status(200)
      .with_body(r#"{"spreadsheetId": "sheet123"}"#)
      .create_async()
      .await;
    let _share = server
      .mock("POST", "/drive/v3/files/sheet123/permissions")
      .match_query(Matcher::Any)
      .with_status(200)
      .with_body("{}")
      .create_async()
      .await;
    let values = server
      .mock("PUT", Matcher::Regex(r"^/v4/spreadsheets/sheet123/values/.*$".to_string()))
      .match_query(Matcher::Any)
      .with_status(200)
      .with_body("{}")
      .expect(2)
      .create_async()
      .await;
    let add_sheet = server
      .mock("POST", "/v4/spreadsheets/sheet123:batchUpdate")
      .with_status(200)
      .with_body("{}")
      .create_async()
      .await;

    let client = SheetsClient::with_base_urls(&server.url());
    let location = client
      .create(&mock_regular_result("John C150"), None)
      .await
      .unwrap();

    created.assert_async().await;
    values.assert_async().await;
    add_sheet.assert_async().await;
    assert_eq!(
      location.to_string(),
      "https://docs.google.com/spreadsheets/d/sheet123/edit"
    );
  }

  #[tokio::test]
  async fn test_detail_failure_after_summary_is_partial() {
    let mut server = mockito::Server::new_async().await;
    let _token = token_mock(&mut server).await;

    let _created = server
      .mock("POST", "/v4/spreadsheets")
      .with_status(200)
      .with_body(r#"{"spreadsheetId": "sheet123"}"#)
      .create_async()
      .await;
    let _share = server
      .mock("POST", "/drive/v3/files/sheet123/permissions")
      .match_query(Matcher::Any)
      .with_status(200)
      .with_body("{}")
      .create_async()
      .await;
    let _values = server
      .mock("PUT", Matcher::Regex(r"^/v4/spreadsheets/sheet123/values/.*$".to_string()))
      .match_query(Matcher::Any)
      .with_status(200)
      .with_body("{}")
      .create_async()
      .await;
    let _add_sheet = server
      .mock("POST", "/v4/spreadsheets/sheet123:batchUpdate")
      .with_status(500)
      .with_body(r#"{"error": "boom"}"#)
      .create_async()
      .await;

    let client = SheetsClient::with_base_urls(&server.url());
    let err = client
      .create(&mock_regular_result("John C150"), None)
      .await
      .unwrap_err();

    assert!(matches!(err, WriteError::PartialWriteFailure(_)));
  }

  #[tokio::test]
  async fn test_append_resolves_against_existing_detail_sheets() {
    let mut server = mockito::Server::new_async().await;
    let _token = token_mock(&mut server).await;

    let _meta = server
      .mock("GET", "/v4/spreadsheets/sheet123")
      .match_query(Matcher::Any)
      .with_status(200)
      .with_body(
        r#"{"sheets": [
          {"properties": {"title": "Summary", "sheetId": 0}},
          {"properties": {"title": "John C150 Split Breakdown", "sheetId": 1}}
        ]}"#,
      )
      .create_async()
      .await;
    let _check = server
      .mock("GET", Matcher::Regex(r"^/v4/spreadsheets/sheet123/values/.*A1.*$".to_string()))
      .match_query(Matcher::Any)
      .with_status(200)
      .with_body(r#"{"range": "Summary!A1:A1", "values": [["Name"]]}"#)
      .create_async()
      .await;
    let append = server
      .mock(
        "POST",
        Matcher::Regex(r"^/v4/spreadsheets/sheet123/values/.*append$".to_string()),
      )
      .match_query(Matcher::Any)
      .match_body(Matcher::Regex(r#""John C150 2""#.to_string()))
      .with_status(200)
      .with_body("{}")
      .create_async()
      .await;
    let add_sheet = server
      .mock("POST", "/v4/spreadsheets/sheet123:batchUpdate")
      .match_body(Matcher::Regex("John C150 2 Split Breakdown".to_string()))
      .with_status(200)
      .with_body("{}")
      .create_async()
      .await;
    let _detail_values = server
      .mock("PUT", Matcher::Regex(r"^/v4/spreadsheets/sheet123/values/.*$".to_string()))
      .match_query(Matcher::Any)
      .with_status(200)
      .with_body("{}")
      .create_async()
      .await;

    let client = SheetsClient::with_base_urls(&server.url());
    client
      .append(
        &mock_regular_result("John C150"),
        "https://docs.google.com/spreadsheets/d/sheet123/edit",
      )
      .await
      .unwrap();

    append.assert_async().await;
    add_sheet.assert_async().await;
  }
}
