//! Account address normalization
//!
//! Addresses reach the processor in several spellings: event keys, JSON
//! payloads, entry function arguments and HTTP paths. Every address is passed
//! through [`normalize_address`] before it is used as a table key so that the
//! same account always maps to the same row.

/// Prefix carried by every canonical address.
pub const ADDRESS_PREFIX: &str = "0x";

/// Return the canonical form of `address`: prepend `0x` when it is missing.
///
/// Normalization is idempotent; an already prefixed address is returned as is.
pub fn normalize_address(address: &str) -> String {
    if address.starts_with(ADDRESS_PREFIX) {
        address.to_string()
    } else {
        format!("{ADDRESS_PREFIX}{address}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_prefix_added_when_missing() {
        assert_eq!(normalize_address("abc"), "0xabc");
    }

    #[test]
    fn test_prefixed_address_unchanged() {
        assert_eq!(normalize_address("0xabc"), "0xabc");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(address in "(0x)?[0-9a-f]{0,64}") {
            let once = normalize_address(&address);
            prop_assert_eq!(normalize_address(&once), once.clone());
            prop_assert!(once.starts_with(ADDRESS_PREFIX));
        }
    }
}
