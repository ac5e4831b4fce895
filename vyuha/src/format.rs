/// Sentinel shown wherever a figure could not be obtained.
pub const NOT_AVAILABLE: &str = "N/A";

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable size in powers of 1024: `512 B`, `1.50 KB`.
pub fn format_bytes(size: Option<u64>) -> String {
    let size = match size {
        Some(size) => size,
        None => return NOT_AVAILABLE.to_string(),
    };
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", size, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Signed change relative to `before`, e.g. `+10.00%`. A missing figure or a
/// zero baseline gives [`NOT_AVAILABLE`].
pub fn percent_change(before: Option<u64>, after: Option<u64>) -> String {
    match (before, after) {
        (Some(before), Some(after)) if before > 0 => {
            let pct = (after as f64 - before as f64) / before as f64 * 100.0;
            format!("{:+.2}%", pct)
        },
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Leading integer of a figure such as `1234 bytes`.
pub fn parse_leading_u64(text: &str) -> Option<u64> {
    let digits: String = text.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_test() {
        assert_eq!(format_bytes(None), "N/A");
        assert_eq!(format_bytes(Some(0)), "0 B");
        assert_eq!(format_bytes(Some(1023)), "1023 B");
        assert_eq!(format_bytes(Some(1024)), "1.00 KB");
        assert_eq!(format_bytes(Some(1536)), "1.50 KB");
        assert_eq!(format_bytes(Some(16_384 * 1024)), "16.00 MB");
    }

    #[test]
    fn percent_change_test() {
        assert_eq!(percent_change(Some(1000), Some(1100)), "+10.00%");
        assert_eq!(percent_change(Some(1000), Some(900)), "-10.00%");
        assert_eq!(percent_change(Some(1000), Some(1000)), "+0.00%");
        assert_eq!(percent_change(None, Some(1100)), "N/A");
        assert_eq!(percent_change(Some(1000), None), "N/A");
        assert_eq!(percent_change(Some(0), Some(10)), "N/A");
    }

    #[test]
    fn leading_integers() {
        assert_eq!(parse_leading_u64("1234 bytes"), Some(1234));
        assert_eq!(parse_leading_u64(" 42"), Some(42));
        assert_eq!(parse_leading_u64("bytes"), None);
    }
}
