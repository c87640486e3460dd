//! Billing-period normalization.
//!
//! Meter-reading slips print the billing period in several shapes
//! (`令和7年6月分`, `R76月分`, `Ｒ７ ６月分`, ...). Everything that is stored or
//! grouped uses the single canonical form `R<year> <month>月分`.

use std::sync::OnceLock;

use regex::Regex;

/// Era tokens that all collapse to the ASCII era letter.
const ERA_TOKENS: &[&str] = &["令和", "れいわ", "Ｒ"];

/// Distance between a full-width digit and its ASCII counterpart.
const FULL_WIDTH_OFFSET: u32 = 0xFEE0;

/// Era year, optional separator (whitespace and/or `年`), month, `月分`.
///
/// With no separator the greedy year group leaves exactly one digit for the
/// month, so `R76月分` splits as year 7, month 6.
fn period_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"R\s*(\d+)[\s年]*(\d+)月分").expect("regex is valid"))
}

fn canonical_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^R\d+ \d+月分$").expect("regex is valid"))
}

/// Normalize a free-text billing period to `R<year> <month>月分`.
///
/// Never fails: input that cannot be recognised is returned unchanged, and
/// an empty input yields an empty string. No calendar validation is done, so
/// `R99 13月分` passes through as-is.
///
/// # Examples
///
/// ```
/// use bill_core::period::normalize;
///
/// assert_eq!(normalize("令和7年6月分"), "R7 6月分");
/// assert_eq!(normalize("R76月分"), "R7 6月分");
/// assert_eq!(normalize("random text"), "random text");
/// ```
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut text = raw.trim().to_string();
    for token in ERA_TOKENS {
        text = text.replace(token, "R");
    }
    let text = to_ascii_digits(&text);

    match period_regex().captures(&text) {
        Some(caps) => format!("R{} {}月分", &caps[1], &caps[2]),
        None => raw.to_string(),
    }
}

/// `true` when `period` is already in canonical form.
pub fn is_canonical(period: &str) -> bool {
    canonical_regex().is_match(period)
}

/// Replace full-width digits (`０`-`９`) with ASCII digits.
fn to_ascii_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{FF10}'..='\u{FF19}' => {
                char::from_u32(c as u32 - FULL_WIDTH_OFFSET).unwrap_or(c)
            }
            _ => c,
        })
        .collect()
}
