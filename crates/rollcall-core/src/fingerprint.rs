//! Content fingerprints used as seen-set keys.

/// 32-bit order-sensitive rolling hash over the UTF-16 code units of
/// `text` followed by `meta`.
///
/// Each step computes `acc * 31 + unit` in wrapping 32-bit signed arithmetic;
/// the absolute value of the final accumulator is returned. Not collision
/// free: a collision only suppresses one duplicate-looking event.
pub fn fingerprint(text: &str, meta: &str) -> u32 {
    let acc = text
        .encode_utf16()
        .chain(meta.encode_utf16())
        .fold(0i32, |acc, unit| acc.wrapping_mul(31).wrapping_add(unit as i32));
    acc.unsigned_abs()
}

/// Fallback identity when a candidate cannot be fingerprinted.
pub fn random_fingerprint() -> u32 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(fingerprint("", ""), 0);
        assert_eq!(fingerprint("a", ""), 97);
        // 97 * 31 + 98
        assert_eq!(fingerprint("ab", ""), 3105);
        assert_eq!(fingerprint("a", "b"), fingerprint("ab", ""));
    }

    #[test]
    fn test_order_sensitive() {
        assert_ne!(fingerprint("ab", ""), fingerprint("ba", ""));
    }

    #[test]
    fn test_wraps_instead_of_overflowing() {
        let long = "check-in at the north gate ".repeat(50);
        let _ = fingerprint(&long, "[09:12, 3/4/2025] John: ");
    }

    #[test]
    fn test_non_bmp_uses_surrogate_pairs() {
        // U+1F600 is D83D DE00 in UTF-16.
        let expected = (0xD83Di32.wrapping_mul(31).wrapping_add(0xDE00)).unsigned_abs();
        assert_eq!(fingerprint("\u{1F600}", ""), expected);
    }
}
