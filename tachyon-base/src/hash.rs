// Seeded 64-bit hashing used across the engine: container uniformity
// windows, genotype pattern buckets, INFO/FORMAT/FILTER key-set patterns
// and keychain identifier derivation. The seeds are part of the on-disk
// contract in the sense that identical inputs must bucket identically
// across writer invocations; they are NOT part of any wire format.

pub const UNIFORMITY_SEED: u64 = 2147483647;
pub const GENOTYPE_SEED: u64 = 651232;
pub const KEYCHAIN_SEED: u64 = 1337;
pub const PATTERN_SEED: u64 = 452930477;

pub fn hash64(bytes: &[u8]) -> u64 {
    rapidhash::rapidhash(bytes)
}

pub fn hash64_seeded(bytes: &[u8], seed: u64) -> u64 {
    rapidhash::rapidhash_seeded(bytes, seed)
}

/// Hash a slice of little-endian u32 words. The pattern tables key on the
/// sorted tuple of global field ids this way.
pub fn hash64_u32s_seeded(words: &[u32], seed: u64) -> u64 {
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for w in words {
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    rapidhash::rapidhash_seeded(&bytes, seed)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn test_seeds_separate_streams() {
        let bytes = b"0123456789abcdef";
        assert_ne!(
            hash64_seeded(bytes, UNIFORMITY_SEED),
            hash64_seeded(bytes, GENOTYPE_SEED)
        );
    }

    #[test]
    fn test_u32_tuple_hash_is_order_sensitive() {
        assert_ne!(
            hash64_u32s_seeded(&[1, 2, 3], PATTERN_SEED),
            hash64_u32s_seeded(&[3, 2, 1], PATTERN_SEED)
        );
    }
}
