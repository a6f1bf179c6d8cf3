//! Random code generation for scan codes and referral codes.

use rand::Rng;

/// Characters used in generated codes. Omits 0/O and 1/I/L, which clients
/// misread when typing a printed code.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of a client's referral code.
pub const REFERRAL_CODE_LENGTH: usize = 8;

/// Random string of `len` characters from [`CODE_ALPHABET`].
pub fn random_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Scan code text: `PREFIX-SUFFIX`.
pub fn scan_code(prefix: &str, suffix_len: usize) -> String {
    format!("{}-{}", prefix, random_code(suffix_len))
}

/// Canonical form of user-entered code text.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_code_uses_alphabet() {
        let code = random_code(64);
        assert_eq!(code.len(), 64);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_scan_code_shape() {
        let code = scan_code("ZNG", 8);
        assert!(code.starts_with("ZNG-"));
        assert_eq!(code.len(), 12);
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  zng-ab12cd34 \n"), "ZNG-AB12CD34");
    }
}
