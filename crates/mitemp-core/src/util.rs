//! Address helpers shared by scanning and the BLE transport.

use btleplug::platform::PeripheralId;

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms they wrap the
/// Bluetooth address.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Canonical form of a hardware address: uppercase hex, no separators.
pub fn normalize_address(address: &str) -> String {
    address
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Whether two hardware addresses refer to the same device, ignoring case
/// and separators.
pub fn addresses_match(a: &str, b: &str) -> bool {
    let a = normalize_address(a);
    !a.is_empty() && a == normalize_address(b)
}

/// Whether `address` looks like `XX:XX:XX:XX:XX:XX`.
pub fn is_valid_address(address: &str) -> bool {
    let parts: Vec<&str> = address.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("a4:c1:38:f0:16:49"), "A4C138F01649");
        assert_eq!(normalize_address("A4-C1-38-F0-16-49"), "A4C138F01649");
    }

    #[test]
    fn test_addresses_match() {
        assert!(addresses_match("A4:C1:38:F0:16:49", "a4:c1:38:f0:16:49"));
        assert!(addresses_match("A4:C1:38:F0:16:49", "A4C138F01649"));
        assert!(!addresses_match("A4:C1:38:F0:16:49", "A4:C1:38:CE:8F:2F"));
        assert!(!addresses_match("", ""));
    }

    #[test]
    fn test_is_valid_address() {
        assert!(is_valid_address("A4:C1:38:F0:16:49"));
        assert!(is_valid_address("a4:c1:38:ce:8f:2f"));
        assert!(!is_valid_address("A4:C1:38:F0:16"));
        assert!(!is_valid_address("A4:C1:38:F0:16:4G"));
        assert!(!is_valid_address("A4C138F01649"));
        assert!(!is_valid_address(""));
    }
}
