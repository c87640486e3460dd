/// Format `value` with a fixed number of decimals and no grouping, as
/// written to CSV. Halves round away from zero; values that round to zero
/// never carry a minus sign.
///
/// ```
/// use bill_core::formatting::format_fixed;
///
/// assert_eq!(format_fixed(350.456, 2), "350.46");
/// assert_eq!(format_fixed(12500.4, 0), "12500");
/// assert_eq!(format_fixed(6200.5, 0), "6201");
/// ```
pub fn format_fixed(value: f64, decimals: u32) -> String {
    let factor = 10_f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    let rounded = if rounded.is_finite() { rounded } else { value };
    let text = format!("{:.*}", decimals as usize, rounded);
    match text.strip_prefix('-') {
        Some(rest) if rest.bytes().all(|b| b == b'0' || b == b'.') => rest.to_string(),
        _ => text,
    }
}

/// Like [`format_fixed`], with `,` between every three integer digits.
///
/// ```
/// use bill_core::formatting::format_number;
///
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let fixed = format_fixed(value, decimals);
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut out = format!("{sign}{}", group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut grouped = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number_grouping() {
        assert_eq!(format_number(0.0, 2), "0.00");
        assert_eq!(format_number(123.456, 2), "123.46");
        assert_eq!(format_number(6200.0, 0), "6,200");
        assert_eq!(format_number(-9_876.5, 1), "-9,876.5");
    }

    #[test]
    fn test_halves_round_away_from_zero() {
        assert_eq!(format_fixed(6200.5, 0), "6201");
        assert_eq!(format_fixed(2.5, 0), "3");
        assert_eq!(format_fixed(0.125, 2), "0.13");
        assert_eq!(format_fixed(-2.5, 0), "-3");
        assert_eq!(format_number(1_234.5, 0), "1,235");
    }

    #[test]
    fn test_negative_values_rounding_to_zero_lose_the_sign() {
        assert_eq!(format_number(-0.001, 2), "0.00");
        assert_eq!(format_fixed(-0.4, 0), "0");
    }

    #[test]
    fn test_format_fixed_has_no_grouping() {
        assert_eq!(format_fixed(1_234_567.891, 2), "1234567.89");
        assert_eq!(format_fixed(-1_500.0, 0), "-1500");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(""), "");
        assert_eq!(group_thousands("1"), "1");
        assert_eq!(group_thousands("100"), "100");
        assert_eq!(group_thousands("1000"), "1,000");
        assert_eq!(group_thousands("123456"), "123,456");
    }
}
