use std::{
    fmt::{self, Display, Formatter},
    mem::MaybeUninit,
};

use rand::RngCore;

use crate::pattern::Pattern;

pub(crate) const CONSTANT_PATTERN: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

/// What gets written into every byte of a freshly allocated block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FillPolicy {
    None,
    Constant,
    Custom(Pattern),
    Random,
}

impl FillPolicy {
    /// Writes the policy into `block`. Nothing is read back, so the block may be uninitialized.
    pub(crate) fn apply(&self, block: &mut [MaybeUninit<u8>], rng: &mut impl RngCore) {
        match self {
            FillPolicy::None => {}
            FillPolicy::Constant => repeat(block, &CONSTANT_PATTERN),
            FillPolicy::Custom(pattern) => repeat(block, pattern.as_bytes()),
            FillPolicy::Random => {
                let mut scratch = [0u8; RANDOM_CHUNK];
                for chunk in block.chunks_mut(RANDOM_CHUNK) {
                    let scratch = &mut scratch[..chunk.len()];
                    rng.fill_bytes(scratch);
                    write(chunk, scratch);
                }
            }
        }
    }

    pub(crate) fn is_none(&self) -> bool {
        matches!(self, FillPolicy::None)
    }
}

const RANDOM_CHUNK: usize = 4096;

fn repeat(block: &mut [MaybeUninit<u8>], pattern: &[u8]) {
    for chunk in block.chunks_mut(pattern.len()) {
        write(chunk, pattern);
    }
}

fn write(dst: &mut [MaybeUninit<u8>], src: &[u8]) {
    for (dst, src) in dst.iter_mut().zip(src) {
        dst.write(*src);
    }
}

impl Display for FillPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FillPolicy::None => write!(f, "none"),
            FillPolicy::Constant => write!(f, "pattern data"),
            FillPolicy::Custom(pattern) => write!(f, "custom pattern data {}", pattern),
            FillPolicy::Random => write!(f, "random data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    // starts from uninitialized bytes the way malloc hands them out
    fn filled(policy: &FillPolicy, len: usize, rng: &mut StdRng) -> Vec<u8> {
        let mut block = vec![MaybeUninit::<u8>::uninit(); len];
        policy.apply(&mut block, rng);
        block.into_iter().map(|byte| unsafe { byte.assume_init() }).collect()
    }

    #[test]
    fn test_none_leaves_block() {
        let mut block = vec![MaybeUninit::new(3u8); 17];
        FillPolicy::None.apply(&mut block, &mut rng());
        assert!(block.iter().all(|b| unsafe { b.assume_init() } == 3));
    }

    #[test]
    fn test_constant_covers_block() {
        // not a multiple of the pattern length to cover the tail
        let block = filled(&FillPolicy::Constant, 4099, &mut rng());
        assert_eq!(block.len(), 4099);
        for (i, byte) in block.iter().enumerate() {
            assert_eq!(*byte, CONSTANT_PATTERN[i % 4], "byte at {}", i);
        }
    }

    #[test]
    fn test_custom_covers_block() {
        let pattern: Pattern = "0102030405".parse().unwrap();
        let block = filled(&FillPolicy::Custom(pattern.clone()), 1023, &mut rng());
        for (i, byte) in block.iter().enumerate() {
            assert_eq!(*byte, pattern.as_bytes()[i % 5], "byte at {}", i);
        }
    }

    #[test]
    fn test_custom_longer_than_block() {
        let pattern: Pattern = "aabbccdd".parse().unwrap();
        let block = filled(&FillPolicy::Custom(pattern), 3, &mut rng());
        assert_eq!(block, vec![0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn test_random_is_seeded() {
        // spans several scratch chunks and ends with a partial one
        let len = 3 * RANDOM_CHUNK + 17;
        let first = filled(&FillPolicy::Random, len, &mut rng());
        let second = filled(&FillPolicy::Random, len, &mut rng());
        assert_eq!(first, second);
        assert!(first.iter().any(|b| *b != 0));
        // each chunk gets fresh bytes instead of a repeated scratch buffer
        assert_ne!(first[..RANDOM_CHUNK], first[RANDOM_CHUNK..2 * RANDOM_CHUNK]);
    }

    #[test]
    fn test_empty_block() {
        assert!(filled(&FillPolicy::Constant, 0, &mut rng()).is_empty());
        assert!(filled(&FillPolicy::Random, 0, &mut rng()).is_empty());
    }
}
