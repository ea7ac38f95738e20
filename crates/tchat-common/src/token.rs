//! Session token format.
//!
//! A token is the Base58 encoding of 32 random bytes. The format check is
//! the only validation a token gets before it is looked up in a store.

use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes behind a token.
pub const TOKEN_BYTES: usize = 32;

/// Longest string that can still decode to [`TOKEN_BYTES`] bytes.
const MAX_ENCODED_LEN: usize = 44;

/// Generate a fresh random token.
///
/// # Examples
///
/// ```
/// let t = tchat_common::token::generate();
/// assert!(tchat_common::token::is_well_formed(&t));
/// ```
#[must_use]
pub fn generate() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bs58::encode(bytes).into_string()
}

/// Returns `true` if `token` is valid Base58 decoding to exactly
/// [`TOKEN_BYTES`] bytes.
#[must_use]
pub fn is_well_formed(token: &str) -> bool {
    if token.is_empty() || token.len() > MAX_ENCODED_LEN {
        return false;
    }
    bs58::decode(token)
        .into_vec()
        .is_ok_and(|bytes| bytes.len() == TOKEN_BYTES)
}

/// Current Unix time in seconds. Returns 0 if the clock is before the epoch.
#[must_use]
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_well_formed_and_distinct() {
        let a = generate();
        let b = generate();
        assert!(is_well_formed(&a));
        assert!(is_well_formed(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_token_is_malformed() {
        assert!(!is_well_formed(""));
    }

    #[test]
    fn non_base58_is_malformed() {
        // '0', 'O', 'I' and 'l' are outside the Base58 alphabet
        assert!(!is_well_formed("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OI"));
    }

    #[test]
    fn wrong_length_is_malformed() {
        let short = bs58::encode([7u8; 16]).into_string();
        assert!(!is_well_formed(&short));
        let long = bs58::encode([7u8; 33]).into_string();
        assert!(!is_well_formed(&long));
    }

    #[test]
    fn overlong_string_is_rejected_before_decoding() {
        assert!(!is_well_formed(&"z".repeat(1000)));
    }

    #[test]
    fn clock_is_after_2023() {
        assert!(unix_now() > 1_700_000_000);
    }
}
