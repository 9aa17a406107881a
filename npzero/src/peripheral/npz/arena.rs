//! Command arena bookkeeping.
//!
//! The nPZero keeps a 128-byte SRAM at 0x80-0xFF that holds the byte
//! sequences it replays to each peripheral after the host goes to sleep.
//! Slots do not get fixed regions: the device walks the arena in slot order,
//! consuming as many bytes as each slot's command count says. The host
//! therefore has to pack the sequences back to back, in slot order, starting
//! at offset 0. [`CommandArena`] is the bump allocator that does that packing.

use std::fmt;

use thiserror::Error;

use super::protocol::{ARENA_SIZE, regs};

/// Allocation request that does not fit in what is left of the arena.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Command arena exhausted: {requested} bytes requested, {available} of {ARENA_SIZE} free")]
pub struct ArenaExhausted {
    pub requested: usize,
    pub available: usize,
}

/// A contiguous range of arena bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaRange {
    offset: usize,
    len: usize,
}

impl ArenaRange {
    /// Offset of the first byte from the start of the arena.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last offset.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Register address of each byte in the range, in order.
    pub fn addresses(&self) -> impl Iterator<Item = u8> + use<> {
        let start = regs::SRAM_START as usize + self.offset;
        (start..start + self.len).map(|addr| addr as u8)
    }
}

impl fmt::Display for ArenaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// Monotonic bump allocator over the command arena.
///
/// Ranges are never freed or reused. Start a new arena for each
/// configuration pass.
#[derive(Debug, Default)]
pub struct CommandArena {
    cursor: usize,
}

impl CommandArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next free offset.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn available(&self) -> usize {
        ARENA_SIZE - self.cursor
    }

    /// Reserve `len` bytes.
    ///
    /// On failure the cursor is left where it was.
    pub fn allocate(&mut self, len: usize) -> Result<ArenaRange, ArenaExhausted> {
        if len > self.available() {
            return Err(ArenaExhausted {
                requested: len,
                available: self.available(),
            });
        }

        let range = ArenaRange {
            offset: self.cursor,
            len,
        };
        self.cursor += len;
        Ok(range)
    }

    /// Reserve several consecutive ranges, all or none.
    ///
    /// Used when one peripheral needs more than one sequence, so a request
    /// that only partly fits does not strand the first sequence's bytes.
    pub fn reserve(&mut self, lens: &[usize]) -> Result<Vec<ArenaRange>, ArenaExhausted> {
        let requested: usize = lens.iter().sum();
        if requested > self.available() {
            return Err(ArenaExhausted {
                requested,
                available: self.available(),
            });
        }

        lens.iter().map(|&len| self.allocate(len)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_contiguous_and_disjoint() {
        let mut arena = CommandArena::new();
        let a = arena.allocate(2).unwrap();
        let b = arena.allocate(1).unwrap();
        let c = arena.allocate(4).unwrap();

        assert_eq!((a.offset(), a.end()), (0, 2));
        assert_eq!((b.offset(), b.end()), (2, 3));
        assert_eq!((c.offset(), c.end()), (3, 7));
        assert_eq!(arena.cursor(), 7);
    }

    #[test]
    fn exhaustion_leaves_cursor_untouched() {
        let mut arena = CommandArena::new();
        arena.allocate(120).unwrap();

        let err = arena.allocate(9).unwrap_err();
        assert_eq!(
            err,
            ArenaExhausted {
                requested: 9,
                available: 8
            }
        );
        assert_eq!(arena.cursor(), 120);

        // The remainder can still be handed out exactly.
        let last = arena.allocate(8).unwrap();
        assert_eq!(last.end(), ARENA_SIZE);
        assert_eq!(arena.available(), 0);
        assert!(arena.allocate(1).is_err());
    }

    #[test]
    fn reserve_is_all_or_nothing() {
        let mut arena = CommandArena::new();
        arena.allocate(125).unwrap();

        let err = arena.reserve(&[2, 2]).unwrap_err();
        assert_eq!(err.requested, 4);
        assert_eq!(err.available, 3);
        assert_eq!(arena.cursor(), 125);

        let ranges = arena.reserve(&[2, 1]).unwrap();
        assert_eq!(ranges[0].to_string(), "[125, 127)");
        assert_eq!(ranges[1].to_string(), "[127, 128)");
    }

    #[test]
    fn range_addresses_start_at_sram_base() {
        let mut arena = CommandArena::new();
        arena.allocate(3).unwrap();
        let range = arena.allocate(2).unwrap();
        assert_eq!(range.addresses().collect::<Vec<_>>(), vec![0x83, 0x84]);
        assert_eq!(range.to_string(), "[3, 5)");
    }

    #[test]
    fn final_byte_maps_to_0xff() {
        let mut arena = CommandArena::new();
        let all = arena.allocate(ARENA_SIZE).unwrap();
        assert_eq!(all.addresses().last(), Some(0xFF));
    }

    #[test]
    fn many_small_allocations_never_exceed_capacity() {
        let mut arena = CommandArena::new();
        let mut total = 0;
        let mut last_end = 0;
        for len in (1..=16).cycle().take(64) {
            match arena.allocate(len) {
                Ok(range) => {
                    assert_eq!(range.offset(), last_end);
                    last_end = range.end();
                    total += len;
                }
                Err(_) => assert!(arena.cursor() + len > ARENA_SIZE),
            }
        }
        assert!(total <= ARENA_SIZE);
        assert_eq!(total, arena.cursor());
    }
}
