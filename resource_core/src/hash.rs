/// 32-bit FNV-1a over `data`; the hash recorded for resource contents.
pub fn content_hash(data: &[u8]) -> u32 {
    let mut hash = 0x811c9dc5u32;
    for byte in data {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_vectors() {
        assert_eq!(content_hash(b""), 0x811c9dc5);
        assert_eq!(content_hash(b"a"), 0xe40c292c);
        assert_eq!(content_hash(b"foobar"), 0xbf9cf968);
    }
}
