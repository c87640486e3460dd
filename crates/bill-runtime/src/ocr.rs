//! Meter-reading slip extraction through the Gemini `generateContent` API.
//!
//! The image is sent inline (base64) together with a JSON response schema;
//! the model's text answer is cut down to its outermost JSON object and read
//! into an [`OcrExtraction`]. Rate limiting, server errors and transport
//! failures are retried per the client's [`RetryPolicy`].

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use bill_core::error::{BillError, Result};
use bill_core::models::OcrExtraction;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::retry::{retry_with_backoff, RetryPolicy};

/// Gemini REST endpoint prefix; the model name and method are appended.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const SYSTEM_PROMPT: &str = "あなたは電気の検針票から正確な数値と契約情報を抽出する専門家です。\
指示された情報を厳密にJSON形式でのみ出力してください。余計な説明やコメントは一切含めないでください。";

const USER_PROMPT: &str = "添付された電気の検針票画像から、以下の項目をJSONで抽出してください。\n\
1. 使用電力量(kWh)\n2. 合計金額(円)\n3. 検針期間の日数(数値のみ)\n4. 料金年月分(例: R7 6月分)\n5. 契約種別\n\
料金年月は「○ヶ月分」ではなく必ず「○月分」です。契約種別の末尾の記号(αなど)は省略しないでください。";

// ── Request payload ───────────────────────────────────────────────────────────

fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "usageKwh": {
                "type": "NUMBER",
                "description": "使用電力量 (kWh)。小数点以下も含む。"
            },
            "totalCost": {
                "type": "NUMBER",
                "description": "合計請求金額 (円)。カンマは除去すること。"
            },
            "periodDays": {
                "type": "NUMBER",
                "description": "検針期間の日数。日付範囲ではなく日数の数値のみ。"
            },
            "billingDate": {
                "type": "STRING",
                "description": "料金年月分を「R[数字] [数字]月分」の形式で出力。例: 'R7 6月分'。不明な場合は空文字列。"
            },
            "contractName": {
                "type": "STRING",
                "description": "電気の契約種別またはプラン名。例: 低圧電力α, 灯季時別, 従量電灯B。αは必ずαで出力。"
            }
        },
        "propertyOrdering": ["usageKwh", "totalCost", "periodDays", "billingDate", "contractName"]
    })
}

/// Build the `generateContent` request body for one image.
pub fn build_request(image_base64: &str, mime_type: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": USER_PROMPT },
                { "inlineData": { "mimeType": mime_type, "data": image_base64 } }
            ]
        }],
        "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema()
        }
    })
}

// ── Response parsing ──────────────────────────────────────────────────────────

/// Read the extraction out of a `generateContent` response body.
pub fn parse_response(body: &Value) -> Result<OcrExtraction> {
    let text = body
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| BillError::OcrResponse("response contained no candidate text".to_string()))?;
    parse_extraction_text(text)
}

/// Parse the JSON object embedded in the model's text answer.
///
/// Anything before the first `{` or after the last `}` (code fences,
/// commentary) is ignored.
pub fn parse_extraction_text(text: &str) -> Result<OcrExtraction> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json_text = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => {
            return Err(BillError::OcrResponse(format!(
                "no JSON object in model output: {}",
                text.trim()
            )))
        }
    };
    serde_json::from_str(json_text).map_err(|e| BillError::OcrResponse(e.to_string()))
}

/// MIME type of a slip photo, inferred from its extension.
pub fn mime_from_path(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        "webp" => Ok("image/webp"),
        "heic" => Ok("image/heic"),
        "heif" => Ok("image/heif"),
        "gif" => Ok("image/gif"),
        _ => Err(BillError::Validation(format!(
            "unsupported image type: {}",
            path.display()
        ))),
    }
}

// ── OcrClient ─────────────────────────────────────────────────────────────────

/// Client for slip extraction.
pub struct OcrClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    policy: RetryPolicy,
}

impl OcrClient {
    /// Create a client for `model`. Fails when no API key is configured.
    pub fn new(api_key: Option<&str>, model: &str, policy: RetryPolicy) -> Result<Self> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(BillError::MissingApiKey)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BillError::OcrTransport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            policy,
        })
    }

    /// Point the client at another endpoint prefix (no trailing slash).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        )
    }

    /// Read the file at `path` and extract bill fields from it.
    pub async fn extract_file(&self, path: &Path) -> Result<OcrExtraction> {
        let mime_type = mime_from_path(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BillError::file(path, e))?;
        self.extract(&bytes, mime_type).await
    }

    /// Extract bill fields from an encoded image.
    pub async fn extract(&self, image: &[u8], mime_type: &str) -> Result<OcrExtraction> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let payload = build_request(&encoded, mime_type);
        info!(model = %self.model, bytes = image.len(), mime = mime_type, "requesting slip extraction");

        let body = retry_with_backoff(&self.policy, |attempt| {
            debug!(attempt, "sending OCR request");
            self.post(&payload)
        })
        .await?;

        let extraction = parse_response(&body)?;
        debug!(?extraction, "slip extraction parsed");
        Ok(extraction)
    }

    /// One request/response exchange.
    async fn post(&self, payload: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(self.url())
            .json(payload)
            .send()
            .await
            .map_err(|e| BillError::OcrTransport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BillError::OcrStatus {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|e| BillError::OcrTransport(e.without_url().to_string()))?;
        serde_json::from_str(&text).map_err(|e| BillError::OcrResponse(e.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
