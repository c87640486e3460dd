//! CSV export of a projected bill list.

use std::path::Path;

use bill_core::error::{BillError, Result};
use bill_core::formatting::format_fixed;
use bill_core::models::DerivedBillRecord;
use bill_core::time_utils::{date_stamp, format_record_date};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::info;

/// Byte-order mark so spreadsheet tools detect UTF-8.
pub const UTF8_BOM: &str = "\u{feff}";

/// Column headers, in output order.
pub const CSV_HEADERS: [&str; 9] = [
    "記録者名",
    "契約種別",
    "料金年月分",
    "日数",
    "使用量(kWh)",
    "合計料金(円)",
    "日平均使用量(kWh/日)",
    "日平均料金(円/日)",
    "メモ",
];

/// `電気料金履歴_YYYYMMDD.csv` for the local date of `now`.
pub fn default_file_name(now: DateTime<Utc>, tz: Tz) -> String {
    format!("電気料金履歴_{}.csv", date_stamp(now, tz))
}

/// Render `records` as CSV text, BOM included.
///
/// Fails when there is nothing to export.
pub fn to_csv(records: &[DerivedBillRecord], tz: Tz) -> Result<String> {
    if records.is_empty() {
        return Err(BillError::Validation(
            "there are no records to export".to_string(),
        ));
    }

    let mut out = String::from(UTF8_BOM);
    out.push_str(&CSV_HEADERS.join(","));
    out.push('\n');

    for derived in records {
        let r = &derived.record;
        let period = if r.billing_date.is_empty() {
            format_record_date(r.timestamp, tz)
        } else {
            r.billing_date.clone()
        };
        let row = [
            quote(&r.recorder_name),
            quote(&r.contract_type),
            quote(&period),
            r.period_days.to_string(),
            format_fixed(r.usage_kwh, 2),
            format_fixed(r.total_cost, 0),
            format_fixed(derived.daily_usage, 2),
            format_fixed(derived.daily_cost, 2),
            quote(&r.notes),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }

    Ok(out)
}

/// Write the CSV for `records` to `path`.
pub fn write_csv(path: &Path, records: &[DerivedBillRecord], tz: Tz) -> Result<()> {
    let csv = to_csv(records, tz)?;
    std::fs::write(path, csv).map_err(|e| BillError::file(path, e))?;
    info!(path = %path.display(), rows = records.len(), "exported bills");
    Ok(())
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
