//! Display formatting and input parsing for sizes, money and previews.

use crate::error::ValidationError;

const SIZE_UNITS: &[&str] = &["KB", "MB", "GB", "TB"];

/// Human-readable file size, 1024-based, one decimal above plain bytes.
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", SIZE_UNITS[unit])
}

/// Format an amount of cents as dollars, e.g. `-2000` -> `"-$20.00"`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

/// Parse a user-entered decimal amount into cents.
///
/// Accepts `"50"`, `"50.5"` and `"50.00"`.  Signs, exponents and more than two
/// decimals are rejected.
pub fn parse_amount(input: &str) -> Result<i64, ValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ValidationError::EmptyField("amount"));
    }

    let invalid = || ValidationError::InvalidAmount(input.to_string());

    let (whole, frac) = match input.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (input, ""),
    };

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if input.contains('.') && (frac.is_empty() || frac.len() > 2) {
        return Err(invalid());
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole: i64 = whole.parse().map_err(|_| ValidationError::Overflow)?;
    let frac_cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => frac.parse().map_err(|_| invalid())?,
    };

    whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(frac_cents))
        .ok_or(ValidationError::Overflow)
}

/// Shorten `text` to at most `max_chars` characters, appending an ellipsis
/// when something was cut.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2_516_582), "2.4 MB");
        assert_eq!(format_file_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn cents_display() {
        assert_eq!(format_cents(3000), "$30.00");
        assert_eq!(format_cents(-2000), "-$20.00");
        assert_eq!(format_cents(5), "$0.05");
    }

    #[test]
    fn amounts_parse() {
        assert_eq!(parse_amount("50").unwrap(), 5000);
        assert_eq!(parse_amount("50.5").unwrap(), 5050);
        assert_eq!(parse_amount(" 50.00 ").unwrap(), 5000);
        assert_eq!(parse_amount("0.99").unwrap(), 99);
    }

    #[test]
    fn amounts_rejected() {
        assert_eq!(parse_amount(""), Err(ValidationError::EmptyField("amount")));
        assert!(matches!(parse_amount("-5"), Err(ValidationError::InvalidAmount(_))));
        assert!(matches!(parse_amount("1.234"), Err(ValidationError::InvalidAmount(_))));
        assert!(matches!(parse_amount("1."), Err(ValidationError::InvalidAmount(_))));
        assert!(matches!(parse_amount(".5"), Err(ValidationError::InvalidAmount(_))));
        assert!(matches!(parse_amount("ten"), Err(ValidationError::InvalidAmount(_))));
        assert_eq!(
            parse_amount("99999999999999999999"),
            Err(ValidationError::Overflow)
        );
    }

    #[test]
    fn previews() {
        assert_eq!(truncate_preview("short", 10), "short");
        assert_eq!(truncate_preview("abcdefghij", 5), "abcd…");
        assert_eq!(truncate_preview("héllo wörld", 6), "héllo…");
    }
}
