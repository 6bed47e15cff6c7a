//! Human-readable byte sizes for reports and log lines

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count with one decimal place using 1024-based units
///
/// # Examples
///
/// ```
/// use mfdr_common::human_size::format_size;
///
/// assert_eq!(format_size(512), "512.0 B");
/// assert_eq!(format_size(51_200), "50.0 KB");
/// assert_eq!(format_size(8_000_000), "7.6 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in &UNITS[..UNITS.len() - 1] {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} {}", value, UNITS[UNITS.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert_eq!(format_size(0), "0.0 B");
    }

    #[test]
    fn test_unit_boundaries() {
        assert_eq!(format_size(1023), "1023.0 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }

    #[test]
    fn test_terabytes_do_not_overflow_units() {
        assert_eq!(format_size(5 * 1024u64.pow(4)), "5.0 TB");
        assert_eq!(format_size(2048 * 1024u64.pow(4)), "2048.0 TB");
    }
}
