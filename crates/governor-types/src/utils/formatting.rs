//! String formatting utilities.

use chrono::DateTime;

/// Adds a "0x" prefix to a hex string if it doesn't already have one.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.to_lowercase().starts_with("0x") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Removes a "0x" or "0X" prefix from a hex string if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Renders a UNIX timestamp (possibly negative) as `YYYY-MM-DD HH:MM:SS UTC`.
///
/// Falls back to the raw number when it is outside the representable range.
pub fn format_timestamp(timestamp: i128) -> String {
	i64::try_from(timestamp)
		.ok()
		.and_then(|secs| DateTime::from_timestamp(secs, 0))
		.map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
		.unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_prefix_helpers() {
		assert_eq!(with_0x_prefix("abcd"), "0xabcd");
		assert_eq!(with_0x_prefix("0Xabcd"), "0Xabcd");
		assert_eq!(without_0x_prefix("0xabcd"), "abcd");
		assert_eq!(without_0x_prefix("0Xabcd"), "abcd");
		assert_eq!(without_0x_prefix("abcd"), "abcd");
	}

	#[test]
	fn test_format_timestamp() {
		assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
		assert_eq!(format_timestamp(87400), "1970-01-02 00:16:40 UTC");
		assert_eq!(format_timestamp(-85400), "1969-12-31 00:16:40 UTC");
		assert_eq!(format_timestamp(i128::MAX), i128::MAX.to_string());
	}
}
