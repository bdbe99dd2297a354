/// Content-addressable cache key: MD5 of the bytes as lowercase hex.
///
/// Not a security boundary; only used to dedupe media uploads. Hashing a
/// string and hashing its UTF-8 bytes yield the same digest.
pub fn content_hash(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", md5::compute(data.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_and_utf8_bytes_hash_identically() {
        for sample in ["", "hello", "你好，世界", "data:image/jpg;base64,AAAA"] {
            assert_eq!(content_hash(sample), content_hash(sample.as_bytes()));
        }
    }

    #[test]
    fn digest_is_stable_lowercase_hex() {
        let digest = content_hash("hello");
        assert_eq!(digest, "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn distinct_content_hashes_differently() {
        assert_ne!(content_hash("a"), content_hash("b"));
    }
}
