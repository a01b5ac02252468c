//! Hex quantity parsing for JSON-RPC results.

/// Parses a `0x`-prefixed (or bare) hex quantity into a `u64`.
///
/// Returns `None` for empty input, non-hex digits, or values that overflow.
#[must_use]
pub fn parse_hex_u64(value: &str) -> Option<u64> {
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")).unwrap_or(value);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}
