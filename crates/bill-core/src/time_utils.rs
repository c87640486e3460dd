use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Shown in place of a date when a record has no timestamp.
pub const UNKNOWN_DATE: &str = "日付不明";

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Resolve a timezone name, treating `"auto"` as the system timezone.
///
/// Unknown names fall back to UTC with a warning.
pub fn resolve_timezone(name: &str) -> Tz {
    let name = if name == "auto" {
        get_system_timezone()
    } else {
        name.to_string()
    };
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!("unrecognised timezone \"{}\", falling back to UTC", name);
        Tz::UTC
    })
}

/// Validate that `tz_name` is a recognised IANA timezone identifier.
pub fn validate_timezone(tz_name: &str) -> bool {
    tz_name.parse::<Tz>().is_ok()
}

// ── Date formatting ───────────────────────────────────────────────────────────

/// Local calendar date of a record, `YYYY/MM/DD`, or [`UNKNOWN_DATE`].
pub fn format_record_date(timestamp: Option<DateTime<Utc>>, tz: Tz) -> String {
    match timestamp {
        Some(ts) => ts.with_timezone(&tz).format("%Y/%m/%d").to_string(),
        None => UNKNOWN_DATE.to_string(),
    }
}

/// Compact local date `YYYYMMDD` used in export file names.
pub fn date_stamp(now: DateTime<Utc>, tz: Tz) -> String {
    now.with_timezone(&tz).format("%Y%m%d").to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
