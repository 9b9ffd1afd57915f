use std::{
    fmt::{self, Display, Formatter},
    mem::MaybeUninit,
    ptr::NonNull,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Primitive {
    Malloc,
    Calloc,
}

impl Display for Primitive {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Malloc => write!(f, "malloc()"),
            Primitive::Calloc => write!(f, "calloc()"),
        }
    }
}

pub(crate) trait Allocator {
    /// Returns a block of exactly `size` bytes or None if the allocator refused the request.
    ///
    /// The block is never given back. Callers may write to it until the next call.
    /// Contents are uninitialized unless the primitive zeroes them.
    fn allocate(&mut self, size: usize, primitive: Primitive) -> Option<NonNull<[MaybeUninit<u8>]>>;
}

/// Allocates straight from the C heap so that the reported addresses are the ones
/// malloc(3) hands out, without a rust allocator in between.
#[derive(Debug, Default)]
pub(crate) struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&mut self, size: usize, primitive: Primitive) -> Option<NonNull<[MaybeUninit<u8>]>> {
        let ptr = unsafe {
            match primitive {
                Primitive::Malloc => libc::malloc(size),
                Primitive::Calloc => libc::calloc(1, size),
            }
        };
        NonNull::new(ptr as *mut MaybeUninit<u8>).map(|ptr| NonNull::slice_from_raw_parts(ptr, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calloc_zeroes() {
        let mut allocator = SystemAllocator;
        let block = allocator
            .allocate(4096, Primitive::Calloc)
            .expect("4k allocation should succeed");
        // calloc zeroes the block, so it may be read as initialized bytes
        let block = unsafe { &*(block.as_ptr() as *const [u8]) };
        assert_eq!(block.len(), 4096);
        assert!(block.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_malloc_is_writable() {
        let mut allocator = SystemAllocator;
        let block = allocator
            .allocate(100, Primitive::Malloc)
            .expect("small allocation should succeed");
        let block = unsafe { &mut *block.as_ptr() };
        assert_eq!(block.len(), 100);
        for byte in block.iter_mut() {
            byte.write(0xaa);
        }
        assert!(block.iter().all(|b| unsafe { b.assume_init() } == 0xaa));
    }

    #[test]
    fn test_absurd_request_fails() {
        let mut allocator = SystemAllocator;
        assert!(allocator.allocate(usize::MAX - 4096, Primitive::Malloc).is_none());
    }
}
