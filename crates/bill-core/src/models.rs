use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{BillError, Result};
use crate::period;

/// Day count substituted when a bill carries no usable period length.
pub const DEFAULT_PERIOD_DAYS: u32 = 30;

/// Joins member ids into the id of a merged row.
pub const COMPOSITE_ID_SEPARATOR: char = '_';

/// Recorder name used when no user name is known.
pub const GUEST_RECORDER: &str = "ゲストユーザー";

// ── BillRecord ────────────────────────────────────────────────────────────────

/// A persisted electricity bill.
///
/// Numeric fields are always numbers once a record exists; lenient
/// deserialization also accepts numeric strings written by older clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillRecord {
    /// Opaque id assigned by the store.
    pub id: String,
    /// Owning user; immutable after creation.
    pub author_id: String,
    /// Display label chosen by the user.
    pub recorder_name: String,
    /// Utility contract or plan name.
    pub contract_type: String,
    /// Canonical billing period (`R7 6月分`) or empty.
    #[serde(default)]
    pub billing_date: String,
    /// Energy used in the period (kWh).
    #[serde(deserialize_with = "lenient::number")]
    pub usage_kwh: f64,
    /// Cost of the period.
    #[serde(deserialize_with = "lenient::number")]
    pub total_cost: f64,
    /// Days covered by the bill; `0` means unknown.
    #[serde(default, deserialize_with = "lenient::days")]
    pub period_days: u32,
    #[serde(default)]
    pub notes: String,
    /// Creation time assigned by the store.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl BillRecord {
    /// Build a stored record from a validated submission.
    pub fn from_new(id: String, timestamp: DateTime<Utc>, new: NewBillRecord) -> Self {
        Self {
            id,
            author_id: new.author_id,
            recorder_name: new.recorder_name,
            contract_type: new.contract_type,
            billing_date: new.billing_date,
            usage_kwh: new.usage_kwh,
            total_cost: new.total_cost,
            period_days: new.period_days,
            notes: new.notes,
            timestamp: Some(timestamp),
        }
    }

    /// Period length used for per-day figures (falls back to 30 days).
    pub fn effective_period_days(&self) -> u32 {
        if self.period_days > 0 {
            self.period_days
        } else {
            DEFAULT_PERIOD_DAYS
        }
    }
}

/// A validated bill awaiting an id and timestamp from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBillRecord {
    pub author_id: String,
    pub recorder_name: String,
    pub contract_type: String,
    pub billing_date: String,
    pub usage_kwh: f64,
    pub total_cost: f64,
    pub period_days: u32,
    pub notes: String,
}

// ── DerivedBillRecord ─────────────────────────────────────────────────────────

/// A bill decorated with per-day figures. Recomputed on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedBillRecord {
    #[serde(flatten)]
    pub record: BillRecord,
    /// `usage_kwh / effective_period_days`.
    pub daily_usage: f64,
    /// `total_cost / effective_period_days`.
    pub daily_cost: f64,
    /// Ids of the source records when this row merges several bills.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub merged_ids: Vec<String>,
}

impl DerivedBillRecord {
    /// Decorate a single source record.
    pub fn from_record(record: BillRecord) -> Self {
        Self::with_members(record, Vec::new())
    }

    /// Decorate a merged row built from `merged_ids`.
    pub fn with_members(record: BillRecord, merged_ids: Vec<String>) -> Self {
        let days = f64::from(record.effective_period_days());
        Self {
            daily_usage: record.usage_kwh / days,
            daily_cost: record.total_cost / days,
            record,
            merged_ids,
        }
    }

    /// `true` for merged rows, which cannot be deleted individually.
    pub fn is_merged(&self) -> bool {
        !self.merged_ids.is_empty()
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// `true` when `id` is a merged-row sentinel rather than a store id.
pub fn is_composite_id(id: &str) -> bool {
    id.contains(COMPOSITE_ID_SEPARATOR)
}

// ── OcrExtraction ─────────────────────────────────────────────────────────────

/// Best-effort fields read from a meter-reading slip by the OCR service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrExtraction {
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub usage_kwh: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub total_cost: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub period_days: Option<f64>,
    #[serde(default)]
    pub billing_date: Option<String>,
    #[serde(default)]
    pub contract_name: Option<String>,
}

// ── BillDraft ─────────────────────────────────────────────────────────────────

/// The editable bill form. Every field is text until validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BillDraft {
    pub recorder_name: String,
    pub contract_type: String,
    pub billing_date: String,
    pub usage_kwh: String,
    pub total_cost: String,
    pub period_days: String,
    pub notes: String,
}

impl BillDraft {
    /// An empty form pre-filled with the recorder name.
    pub fn new(recorder_name: Option<&str>) -> Self {
        Self {
            recorder_name: recorder_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(GUEST_RECORDER)
                .to_string(),
            ..Default::default()
        }
    }

    /// Store a billing period, normalizing it on the way in.
    pub fn set_billing_date(&mut self, raw: &str) {
        self.billing_date = period::normalize(raw);
    }

    /// Fill the form from an OCR result.
    ///
    /// Missing numbers become empty text (never zero) so the user is
    /// prompted to fill them in. The contract type is kept when the
    /// extraction has no contract name.
    pub fn apply_extraction(&mut self, extraction: &OcrExtraction) {
        let text = |v: Option<f64>| v.map(|n| n.to_string()).unwrap_or_default();
        self.usage_kwh = text(extraction.usage_kwh);
        self.total_cost = text(extraction.total_cost);
        self.period_days = text(extraction.period_days);
        self.set_billing_date(extraction.billing_date.as_deref().unwrap_or(""));
        if let Some(name) = extraction
            .contract_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
        {
            self.contract_type = name.to_string();
        }
    }

    /// Check required fields and convert the text values to numbers.
    pub fn validate(&self, author_id: &str) -> Result<NewBillRecord> {
        let required = [
            ("recorder name", &self.recorder_name),
            ("contract type", &self.contract_type),
            ("usage", &self.usage_kwh),
            ("total cost", &self.total_cost),
            ("period days", &self.period_days),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(BillError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let usage_kwh = parse_field("usage", &self.usage_kwh)?;
        if usage_kwh < 0.0 {
            return Err(BillError::Validation(
                "usage must not be negative".to_string(),
            ));
        }
        let total_cost = parse_field("total cost", &self.total_cost)?;
        let days = parse_field("period days", &self.period_days)?;
        if days < 0.0 || days.fract() != 0.0 || days > f64::from(u32::MAX) {
            return Err(BillError::Validation(format!(
                "period days must be a whole number of days, got {}",
                self.period_days.trim()
            )));
        }

        Ok(NewBillRecord {
            author_id: author_id.to_string(),
            recorder_name: self.recorder_name.trim().to_string(),
            contract_type: self.contract_type.trim().to_string(),
            billing_date: self.billing_date.trim().to_string(),
            usage_kwh,
            total_cost,
            period_days: days as u32,
            notes: self.notes.clone(),
        })
    }
}

/// Parse a user- or OCR-supplied number, ignoring thousands separators.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_field(name: &str, text: &str) -> Result<f64> {
    parse_number(text).ok_or_else(|| {
        BillError::Validation(format!("{name} must be a number, got {:?}", text.trim()))
    })
}

// ── Lenient numeric deserializers ─────────────────────────────────────────────

mod lenient {
    use super::*;
    use serde::de::Error as _;
    use serde_json::Value;

    fn to_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_number(s),
            _ => None,
        }
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
        let value = Value::deserialize(d)?;
        to_number(&value).ok_or_else(|| D::Error::custom(format!("expected a number, got {value}")))
    }

    pub fn optional_number<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Option<f64>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(to_number(&value))
    }

    pub fn days<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
        let value = Value::deserialize(d)?;
        // Fractional or out-of-range counts fall back to the default period.
        Ok(to_number(&value)
            .filter(|n| *n > 0.0 && n.fract() == 0.0 && *n <= f64::from(u32::MAX))
            .map(|n| n as u32)
            .unwrap_or(0))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_record(period_days: u32, usage: f64, cost: f64) -> BillRecord {
        BillRecord {
            id: "r1".to_string(),
            author_id: "u1".to_string(),
            recorder_name: "山田".to_string(),
            contract_type: "低圧電力α".to_string(),
            billing_date: "R7 6月分".to_string(),
            usage_kwh: usage,
            total_cost: cost,
            period_days,
            notes: String::new(),
            timestamp: Some(Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()),
        }
    }

    fn filled_draft() -> BillDraft {
        BillDraft {
            recorder_name: "山田".to_string(),
            contract_type: "低圧電力α".to_string(),
            billing_date: "R7 6月分".to_string(),
            usage_kwh: "350.5".to_string(),
            total_cost: "12,500".to_string(),
            period_days: "30".to_string(),
            notes: "note".to_string(),
        }
    }

    // ── Derived figures ───────────────────────────────────────────────────────

    #[test]
    fn test_daily_figures() {
        let derived = DerivedBillRecord::from_record(make_record(31, 310.0, 6200.0));
        assert!((derived.daily_usage - 10.0).abs() < 1e-9);
        assert!((derived.daily_cost - 200.0).abs() < 1e-9);
        assert!(!derived.is_merged());
    }

    #[test]
    fn test_zero_days_uses_default() {
        let derived = DerivedBillRecord::from_record(make_record(0, 30.0, 900.0));
        assert!((derived.daily_usage - 1.0).abs() < 1e-9);
        assert!((derived.daily_cost - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_composite_id_detection() {
        assert!(is_composite_id("a_b"));
        assert!(!is_composite_id("0f8c5a2e-1d7b-4a8e-9a4b-7f3c2d1e0b9a"));
    }

    // ── Serialization ─────────────────────────────────────────────────────────

    #[test]
    fn test_record_serializes_numbers_as_numbers() {
        let json = serde_json::to_value(make_record(30, 100.0, 3000.0)).unwrap();
        assert!(json["usageKwh"].is_number());
        assert!(json["totalCost"].is_number());
        assert!(json["periodDays"].is_number());
        assert_eq!(json["contractType"], "低圧電力α");
    }

    #[test]
    fn test_record_accepts_numeric_strings() {
        let json = r#"{
            "id": "x", "authorId": "u", "recorderName": "r", "contractType": "c",
            "usageKwh": "120.5", "totalCost": "3,400", "periodDays": "29"
        }"#;
        let record: BillRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.usage_kwh, 120.5);
        assert_eq!(record.total_cost, 3400.0);
        assert_eq!(record.period_days, 29);
        assert!(record.timestamp.is_none());
        assert!(record.billing_date.is_empty());
    }

    #[test]
    fn test_record_fractional_days_use_default() {
        let json = r#"{
            "id": "x", "authorId": "u", "recorderName": "r", "contractType": "c",
            "usageKwh": 59, "totalCost": 600, "periodDays": 29.5
        }"#;
        let record: BillRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.period_days, 0);
        assert_eq!(record.effective_period_days(), DEFAULT_PERIOD_DAYS);

        let json = json.replace("29.5", "\"29.0\"");
        let record: BillRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record.period_days, 29);
    }

    #[test]
    fn test_record_missing_days_is_zero() {
        let json = r#"{
            "id": "x", "authorId": "u", "recorderName": "r", "contractType": "c",
            "usageKwh": 1, "totalCost": 2
        }"#;
        let record: BillRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.period_days, 0);
        assert_eq!(record.effective_period_days(), DEFAULT_PERIOD_DAYS);
    }

    #[test]
    fn test_record_rejects_non_numeric_usage() {
        let json = r#"{
            "id": "x", "authorId": "u", "recorderName": "r", "contractType": "c",
            "usageKwh": "lots", "totalCost": 2
        }"#;
        assert!(serde_json::from_str::<BillRecord>(json).is_err());
    }

    #[test]
    fn test_ocr_extraction_lenient_fields() {
        let json = r#"{"usageKwh": 350.5, "totalCost": "12,500", "billingDate": "令和7年6月分"}"#;
        let ext: OcrExtraction = serde_json::from_str(json).unwrap();
        assert_eq!(ext.usage_kwh, Some(350.5));
        assert_eq!(ext.total_cost, Some(12500.0));
        assert_eq!(ext.period_days, None);
        assert_eq!(ext.contract_name, None);
    }

    // ── BillDraft ─────────────────────────────────────────────────────────────

    #[test]
    fn test_draft_defaults_to_guest() {
        assert_eq!(BillDraft::new(None).recorder_name, GUEST_RECORDER);
        assert_eq!(BillDraft::new(Some("  ")).recorder_name, GUEST_RECORDER);
        assert_eq!(BillDraft::new(Some("佐藤")).recorder_name, "佐藤");
    }

    #[test]
    fn test_draft_normalizes_billing_date() {
        let mut draft = BillDraft::new(None);
        draft.set_billing_date("令和7年6月分");
        assert_eq!(draft.billing_date, "R7 6月分");
    }

    #[test]
    fn test_apply_extraction_fills_fields() {
        let mut draft = BillDraft::new(Some("山田"));
        draft.contract_type = "従量電灯B".to_string();
        draft.apply_extraction(&OcrExtraction {
            usage_kwh: Some(350.5),
            total_cost: Some(12500.0),
            period_days: Some(30.0),
            billing_date: Some("R76月分".to_string()),
            contract_name: Some("低圧電力α".to_string()),
        });
        assert_eq!(draft.usage_kwh, "350.5");
        assert_eq!(draft.total_cost, "12500");
        assert_eq!(draft.period_days, "30");
        assert_eq!(draft.billing_date, "R7 6月分");
        assert_eq!(draft.contract_type, "低圧電力α");
    }

    #[test]
    fn test_apply_extraction_missing_numbers_are_blank() {
        let mut draft = filled_draft();
        draft.apply_extraction(&OcrExtraction::default());
        assert_eq!(draft.usage_kwh, "");
        assert_eq!(draft.total_cost, "");
        assert_eq!(draft.period_days, "");
        assert_eq!(draft.billing_date, "");
        // Contract type survives when the extraction has none.
        assert_eq!(draft.contract_type, "低圧電力α");
    }

    #[test]
    fn test_validate_converts_numbers() {
        let new = filled_draft().validate("uid-1").unwrap();
        assert_eq!(new.author_id, "uid-1");
        assert_eq!(new.usage_kwh, 350.5);
        assert_eq!(new.total_cost, 12500.0);
        assert_eq!(new.period_days, 30);
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let mut draft = filled_draft();
        draft.usage_kwh.clear();
        draft.contract_type = " ".to_string();
        let err = draft.validate("u").unwrap_err().to_string();
        assert!(err.contains("contract type"));
        assert!(err.contains("usage"));
    }

    #[test]
    fn test_validate_rejects_non_numeric() {
        let mut draft = filled_draft();
        draft.total_cost = "abc".to_string();
        assert!(matches!(
            draft.validate("u"),
            Err(BillError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_fractional_days() {
        let mut draft = filled_draft();
        draft.period_days = "29.5".to_string();
        assert!(draft.validate("u").is_err());
    }

    #[test]
    fn test_validate_rejects_negative_usage() {
        let mut draft = filled_draft();
        draft.usage_kwh = "-1".to_string();
        assert!(draft.validate("u").is_err());
    }

    #[test]
    fn test_from_new_assigns_id_and_timestamp() {
        let new = filled_draft().validate("u").unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 7, 2, 9, 0, 0).unwrap();
        let record = BillRecord::from_new("id-9".to_string(), ts, new);
        assert_eq!(record.id, "id-9");
        assert_eq!(record.timestamp, Some(ts));
        assert_eq!(record.notes, "note");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 1,234.5 "), Some(1234.5));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
    }
}
