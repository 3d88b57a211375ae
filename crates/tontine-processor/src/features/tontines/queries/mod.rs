pub mod get_member_tontines;
pub mod get_tontine;

pub use get_member_tontines::{
    GetMemberTontinesError, GetMemberTontinesQuery, MemberTontineResponse,
};
pub use get_tontine::{GetTontineError, GetTontineQuery, GetTontineResponse, TontineMemberResponse};

use tontine_common::address::ADDRESS_PREFIX;
use tontine_common::normalize_address;

/// Normalize a path address, returning `None` unless it is non-empty hex.
pub(crate) fn parse_address(address: &str) -> Option<String> {
    let normalized = normalize_address(address.trim());
    let digits = &normalized[ADDRESS_PREFIX.len()..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("abc").as_deref(), Some("0xabc"));
        assert_eq!(parse_address("0xABC").as_deref(), Some("0xABC"));
        assert_eq!(parse_address(""), None);
        assert_eq!(parse_address("0x"), None);
        assert_eq!(parse_address("0xnothex"), None);
    }
}
