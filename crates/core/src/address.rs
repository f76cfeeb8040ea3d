//! Worker address parsing
//!
//! Registry addresses are free text; the dialable part is the first `ip:port` token.

use crate::WorkerId;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static IP_PORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}:\d+").expect("Invalid ip:port pattern")
});

/// Extract the first `ip:port` token from a registry address string
pub fn extract_address(text: &str) -> Option<String> {
    IP_PORT_REGEX.find(text).map(|m| m.as_str().to_string())
}

/// Keep only the workers whose registered address contains a dialable `ip:port`
pub fn filter_dialable(addresses: &BTreeMap<WorkerId, String>) -> BTreeMap<WorkerId, String> {
    addresses
        .iter()
        .filter_map(|(uid, raw)| extract_address(raw).map(|addr| (*uid, addr)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_address() {
        assert_eq!(
            extract_address("10.0.0.1:8000"),
            Some("10.0.0.1:8000".to_string())
        );
    }

    #[test]
    fn test_extract_embedded_address() {
        assert_eq!(
            extract_address("http://192.168.1.20:9100/module"),
            Some("192.168.1.20:9100".to_string())
        );
    }

    #[test]
    fn test_extract_rejects_hostnames_and_missing_port() {
        assert!(extract_address("miner.example.com:8000").is_none());
        assert!(extract_address("10.0.0.1").is_none());
        assert!(extract_address("").is_none());
    }

    #[test]
    fn test_filter_dialable_drops_unparseable() {
        let mut raw = BTreeMap::new();
        raw.insert(0, "none".to_string());
        raw.insert(1, "1.2.3.4:80".to_string());
        raw.insert(2, "module at 5.6.7.8:8080".to_string());

        let dialable = filter_dialable(&raw);
        assert_eq!(dialable.len(), 2);
        assert_eq!(dialable.get(&2).map(String::as_str), Some("5.6.7.8:8080"));
        assert!(!dialable.contains_key(&0));
    }
}
