/*!
The reference transform, rot13.

Letters rotate 13 places within their own case, every other byte is left
alone. Applying it twice is the identity. The self-test kernel implements the
same rule, so the host result is the expected device output.
*/

/// Rotates one byte.
pub const fn transform_byte(c: u8) -> u8 {
    match c {
        b'A'..=b'Z' => b'A' + (c - b'A' + 13) % 26,
        b'a'..=b'z' => b'a' + (c - b'a' + 13) % 26,
        _ => c,
    }
}

/// Rotates `bytes` in place.
pub fn transform_in_place(bytes: &mut [u8]) {
    bytes.iter_mut().for_each(|c| *c = transform_byte(*c));
}

/// Returns the transformed copy of `input`.
pub fn transform(input: &[u8]) -> Vec<u8> {
    let mut output = input.to_vec();
    transform_in_place(&mut output);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blah() {
        assert_eq!(transform(b"blahblahblah"), b"oynuoynuoynu");
        assert_eq!(transform(b"oynuoynuoynu"), b"blahblahblah");
    }

    #[test]
    fn alphabet_wraps_within_case() {
        assert_eq!(
            transform(b"ABCDEFGHIJKLMNOPQRSTUVWXYZ"),
            b"NOPQRSTUVWXYZABCDEFGHIJKLM"
        );
        assert_eq!(
            transform(b"abcdefghijklmnopqrstuvwxyz"),
            b"nopqrstuvwxyzabcdefghijklm"
        );
    }

    #[test]
    fn non_letters_pass_through() {
        for c in (0..=u8::MAX).filter(|c| !c.is_ascii_alphabetic()) {
            assert_eq!(transform_byte(c), c, "{c:#x}");
        }
    }

    #[test]
    fn involution() {
        let all: Vec<u8> = (0..=u8::MAX).collect();
        assert_eq!(transform(&transform(&all)), all);
        let mut text = b"Hello, World! [`@{|}]".to_vec();
        transform_in_place(&mut text);
        assert_eq!(text, b"Uryyb, Jbeyq! [`@{|}]");
        transform_in_place(&mut text);
        assert_eq!(text, b"Hello, World! [`@{|}]");
    }

    #[test]
    fn preserves_length() {
        assert!(transform(b"").is_empty());
        assert_eq!(transform(&[0xff; 7]).len(), 7);
    }
}
