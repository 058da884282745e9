//! Vision extraction adapter
//!
//! This module handles communication with the Claude API for turning an erg
//! screen photo into structured workout records. One request per extraction,
//! no retries; the response is parsed and validated eagerly so that nothing
//! malformed reaches the spreadsheet writers.

use crate::models::{Interval, IntervalSummary, Split, Summary, WorkoutData, WorkoutType};
use crate::power;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// ---------------------------------------------------------------------------
/// Configuration
/// ---------------------------------------------------------------------------

const API_BASE: &str = "https://api.anthropic.com";
const MESSAGES_PATH: &str = "/v1/messages";
const VISION_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;

const REGULAR_PROMPT: &str = include_str!("prompts/regular.txt");
const INTERVAL_PROMPT: &str = include_str!("prompts/interval.txt");

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ExtractionError {
  /// The uploaded bytes are not a readable image.
  #[error("invalid image: {0}")]
  InvalidImage(String),

  /// Network, auth, or rate-limit failure from the vision provider.
  #[error("vision provider failure: {0}")]
  ProviderFailure(String),

  /// The provider answered, but not with a record matching the schema.
  #[error("schema mismatch: {0}")]
  SchemaMismatch(String),
}

/// ---------------------------------------------------------------------------
/// Claude API Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct VisionRequest {
  model: String,
  max_tokens: u32,
  messages: Vec<VisionMessage>,
}

#[derive(Debug, Serialize)]
struct VisionMessage {
  role: String,
  content: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RequestContent {
  Image { source: ImageSource },
  Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageSource {
  #[serde(rename = "type")]
  source_type: &'static str,
  media_type: &'static str,
  data: String,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
  content: Vec<ContentBlock>,
  usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  content_type: String,
  text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
  input_tokens: u32,
  output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
  error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
  message: String,
}

/// Wire shapes the model is asked to produce. Parsed here, then re-tagged as
/// `WorkoutData` once validation passes.
#[derive(Debug, Deserialize)]
struct RegularExtraction {
  summary: Summary,
  splits: Vec<Split>,
}

#[derive(Debug, Deserialize)]
struct IntervalExtraction {
  summary: IntervalSummary,
  intervals: Vec<Interval>,
}

/// ---------------------------------------------------------------------------
/// Vision Client
/// ---------------------------------------------------------------------------

pub struct VisionClient {
  client: Client,
  api_key: String,
  base_url: String,
}

impl VisionClient {
  /// Create a client, loading the API key from the environment.
  pub fn from_env() -> Result<Self, ExtractionError> {
    let api_key = std::env::var("ANTHROPIC_API_KEY")
      .map_err(|_| ExtractionError::ProviderFailure("ANTHROPIC_API_KEY not set".to_string()))?;

    Ok(Self {
      client: Client::new(),
      api_key,
      base_url: API_BASE.to_string(),
    })
  }

  #[cfg(test)]
  fn with_base_url(api_key: &str, base_url: &str) -> Self {
    Self {
      client: Client::new(),
      api_key: api_key.to_string(),
      base_url: base_url.to_string(),
    }
  }

  /// Extract workout records from an erg screen image.
  ///
  /// Single-attempt, blocking from the caller's perspective; callers impose
  /// their own timeout or cancellation policy.
  pub async fn extract(
    &self,
    image: &[u8],
    workout_type: WorkoutType,
  ) -> Result<WorkoutData, ExtractionError> {
    let media_type = sniff_media_type(image)
      .ok_or_else(|| ExtractionError::InvalidImage("unrecognized image format".to_string()))?;

    let prompt = match workout_type {
      WorkoutType::Regular => REGULAR_PROMPT,
      WorkoutType::Interval => INTERVAL_PROMPT,
    };

    let request = VisionRequest {
      model: VISION_MODEL.to_string(),
      max_tokens: MAX_TOKENS,
      messages: vec![VisionMessage {
        role: "user".to_string(),
        content: vec![
          RequestContent::Image {
            source: ImageSource {
              source_type: "base64",
              media_type,
              data: base64::engine::general_purpose::STANDARD.encode(image),
            },
          },
          RequestContent::Text {
            text: prompt.to_string(),
          },
        ],
      }],
    };

    let response = self
      .client
      .post(format!("{}{}", self.base_url, MESSAGES_PATH))
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
      .header("content-type", "application/json")
      .json(&request)
      .send()
      .await
      .map_err(|e| ExtractionError::ProviderFailure(e.to_string()))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| ExtractionError::ProviderFailure(e.to_string()))?;

    if !status.is_success() {
      if let Ok(error_resp) = serde_json::from_str::<ApiErrorResponse>(&body) {
        return Err(ExtractionError::ProviderFailure(error_resp.error.message));
      }
      return Err(ExtractionError::ProviderFailure(format!(
        "HTTP {}: {}",
        status, body
      )));
    }

    let vision_response: VisionResponse =
      serde_json::from_str(&body).map_err(|e| ExtractionError::ProviderFailure(e.to_string()))?;

    debug!(
      input_tokens = vision_response.usage.input_tokens,
      output_tokens = vision_response.usage.output_tokens,
      "vision extraction complete"
    );

    let text = vision_response
      .content
      .iter()
      .find(|c| c.content_type == "text")
      .and_then(|c| c.text.clone())
      .ok_or_else(|| {
        ExtractionError::SchemaMismatch("no text content in response".to_string())
      })?;

    let json_str = extract_json(&text)?;
    parse_and_validate(&json_str, workout_type)
  }
}

/// ---------------------------------------------------------------------------
/// Response Parsing
/// ---------------------------------------------------------------------------

fn parse_and_validate(
  json_str: &str,
  workout_type: WorkoutType,
) -> Result<WorkoutData, ExtractionError> {
  let data = match workout_type {
    WorkoutType::Regular => {
      let parsed: RegularExtraction = serde_json::from_str(json_str)
        .map_err(|e| ExtractionError::SchemaMismatch(e.to_string()))?;
      WorkoutData::Regular {
        summary: parsed.summary,
        splits: parsed.splits,
      }
    }
    WorkoutType::Interval => {
      let parsed: IntervalExtraction = serde_json::from_str(json_str)
        .map_err(|e| ExtractionError::SchemaMismatch(e.to_string()))?;
      WorkoutData::Interval {
        summary: parsed.summary,
        intervals: parsed.intervals,
      }
    }
  };

  validate(&data)?;
  Ok(data)
}

/// Check every time-format field and the sequence-number invariant. A record
/// failing any check is reported as a schema mismatch rather than returned
/// partially populated.
fn validate(data: &WorkoutData) -> Result<(), ExtractionError> {
  let mut seen = HashSet::new();
  for number in data.sequence_numbers() {
    if !seen.insert(number) {
      return Err(ExtractionError::SchemaMismatch(format!(
        "duplicate sequence number: {:?}",
        number
      )));
    }
  }

  match data {
    WorkoutData::Regular { summary, splits } => {
      check_time("summary.total_time", &summary.total_time)?;
      check_time("summary.average_pace", &summary.average_pace)?;
      for split in splits {
        check_time("split.time", &split.time)?;
        check_time("split.pace", &split.pace)?;
      }
    }
    WorkoutData::Interval { summary, intervals } => {
      check_time("summary.total_time", &summary.total_time)?;
      check_time("summary.average_pace", &summary.average_pace)?;
      if let Some(rest) = &summary.rest_time {
        check_time("summary.rest_time", rest)?;
      }
      for interval in intervals {
        check_time("interval.time", &interval.time)?;
        check_time("interval.pace", &interval.pace)?;
        if let Some(rest) = &interval.rest_time {
          check_time("interval.rest_time", rest)?;
        }
      }
    }
  }

  Ok(())
}

fn check_time(field: &str, value: &str) -> Result<(), ExtractionError> {
  if power::parse_time(value).is_none() {
    return Err(ExtractionError::SchemaMismatch(format!(
      "{} is not a time value: {:?}",
      field, value
    )));
  }
  Ok(())
}

/// Extract JSON from the model's response (handles markdown code blocks).
fn extract_json(text: &str) -> Result<String, ExtractionError> {
  // Try direct parse first
  if text.trim().starts_with('{') {
    return Ok(text.trim().to_string());
  }

  // Look for JSON in code blocks
  if let Some(start) = text.find("```json") {
    let start = start + 7;
    if let Some(end) = text[start..].find("```") {
      return Ok(text[start..start + end].trim().to_string());
    }
  }

  // Look for plain code blocks
  if let Some(start) = text.find("```") {
    let start = start + 3;
    // Skip language identifier if present
    let content_start = text[start..]
      .find('\n')
      .map(|i| start + i + 1)
      .unwrap_or(start);
    if let Some(end) = text[content_start..].find("```") {
      return Ok(text[content_start..content_start + end].trim().to_string());
    }
  }

  // Last resort: first { to last }
  if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
    return Ok(text[start..=end].to_string());
  }

  Err(ExtractionError::SchemaMismatch(
    "could not extract JSON from response".to_string(),
  ))
}

/// ---------------------------------------------------------------------------
/// Image Sniffing
/// ---------------------------------------------------------------------------

/// Media type from magic bytes. The provider decides which of these it can
/// actually read; unrecognized bytes never leave this process.
fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
  if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
    Some("image/png")
  } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
    Some("image/jpeg")
  } else if bytes.starts_with(b"GIF8") {
    Some("image/gif")
  } else if bytes.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || bytes.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
    Some("image/tiff")
  } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
    Some("image/webp")
  } else if bytes.starts_with(b"BM") {
    Some("image/bmp")
  } else {
    None
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

  #[test]
  fn test_sniff_media_type() {
    assert_eq!(sniff_media_type(PNG_MAGIC), Some("image/png"));
    assert_eq!(sniff_media_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
    assert_eq!(sniff_media_type(b"GIF89a"), Some("image/gif"));
    assert_eq!(sniff_media_type(b"RIFF\x00\x00\x00\x00WEBP"), Some("image/webp"));
    assert_eq!(sniff_media_type(b"not an image"), None);
    assert_eq!(sniff_media_type(&[]), None);
  }

  #[test]
  fn test_extract_json_direct() {
    let input = r#"{"summary": {}, "splits": []}"#;
    let result = extract_json(input).unwrap();
    assert!(result.contains("summary"));
  }

  #[test]
  fn test_extract_json_code_block() {
    let input = "Here is the data:\n\n```json\n{\"summary\": {}}\n```\n";
    let result = extract_json(input).unwrap();
    assert_eq!(result, r#"{"summary": {}}"#);
  }

  #[test]
  fn test_extract_json_fallback() {
    let input = r#"The extracted data is {"summary": {}} as shown."#;
    let result = extract_json(input).unwrap();
    assert!(result.starts_with('{'));
  }

  fn regular_payload() -> String {
    serde_json::json!({
      "summary": {
        "total_distance": 2000,
        "total_time": "6:29.1",
        "average_pace": "1:37.2",
        "average_stroke_rate": 34,
        "average_heart_rate": 188
      },
      "splits": [
        {"number": "1", "distance": 500, "time": "1:37.0", "pace": "1:37.0", "stroke_rate": 34, "heart_rate": 180},
        {"number": "2", "distance": 1000, "time": "1:38.1", "pace": "1:38.1", "stroke_rate": 33, "heart_rate": 186}
      ]
    })
    .to_string()
  }

  #[test]
  fn test_parse_and_validate_regular() {
    let data = parse_and_validate(&regular_payload(), WorkoutType::Regular).unwrap();
    assert_eq!(data.workout_type(), WorkoutType::Regular);
    assert_eq!(data.detail_count(), 2);
  }

  #[test]
  fn test_duplicate_sequence_numbers_rejected() {
    let payload = regular_payload().replace(r#""number":"2""#, r#""number":"1""#);
    let err = parse_and_validate(&payload, WorkoutType::Regular).unwrap_err();
    assert!(matches!(err, ExtractionError::SchemaMismatch(_)));
  }

  #[test]
  fn test_bad_time_format_rejected() {
    let payload = regular_payload().replace("6:29.1", "six minutes");
    let err = parse_and_validate(&payload, WorkoutType::Regular).unwrap_err();
    assert!(matches!(err, ExtractionError::SchemaMismatch(_)));
  }

  #[test]
  fn test_missing_field_rejected() {
    let payload = regular_payload().replace(r#""total_distance":2000,"#, "");
    let err = parse_and_validate(&payload, WorkoutType::Regular).unwrap_err();
    assert!(matches!(err, ExtractionError::SchemaMismatch(_)));
  }

  fn claude_body(text: &str) -> String {
    serde_json::json!({
      "content": [{"type": "text", "text": text}],
      "usage": {"input_tokens": 1200, "output_tokens": 300}
    })
    .to_string()
  }

  #[tokio::test]
  async fn test_extract_happy_path() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/v1/messages")
      .match_header("x-api-key", "test-key")
      .with_status(200)
      .with_body(claude_body(&regular_payload()))
      .create_async()
      .await;

    let client = VisionClient::with_base_url("test-key", &server.url());
    let data = client.extract(PNG_MAGIC, WorkoutType::Regular).await.unwrap();

    mock.assert_async().await;
    assert_eq!(data.detail_count(), 2);
  }

  #[tokio::test]
  async fn test_extract_invalid_image_skips_provider() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/v1/messages")
      .expect(0)
      .create_async()
      .await;

    let client = VisionClient::with_base_url("test-key", &server.url());
    let err = client
      .extract(b"definitely not an image", WorkoutType::Regular)
      .await
      .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, ExtractionError::InvalidImage(_)));
  }

  #[tokio::test]
  async fn test_extract_provider_error_surfaces() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/v1/messages")
      .with_status(429)
      .with_body(r#"{"error": {"type": "rate_limit_error", "message": "rate limited"}}"#)
      .create_async()
      .await;

    let client = VisionClient::with_base_url("test-key", &server.url());
    let err = client.extract(PNG_MAGIC, WorkoutType::Regular).await.unwrap_err();

    match err {
      ExtractionError::ProviderFailure(msg) => assert_eq!(msg, "rate limited"),
      other => panic!("expected ProviderFailure, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_extract_schema_mismatch_from_model_text() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/v1/messages")
      .with_status(200)
      .with_body(claude_body("I could not read the screen, sorry."))
      .create_async()
      .await;

    let client = VisionClient::with_base_url("test-key", &server.url());
    let err = client.extract(PNG_MAGIC, WorkoutType::Regular).await.unwrap_err();
    assert!(matches!(err, ExtractionError::SchemaMismatch(_)));
  }
}
