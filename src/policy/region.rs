use crate::util::constants::{bytes_to_pages_up, BYTES_IN_PAGE};
use crate::util::{Address, ByteSize, ObjectReference};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Index of a region within the directory. Stable for the lifetime of the
/// run; regions are created at startup and never destroyed.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub(crate) usize);

impl RegionId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// A fixed-capacity span of heap memory with a monotone bump cursor.
///
/// The cursor only ever moves forward while the region is bound to a
/// context; it is wound back to the start exclusively when the region is
/// recycled after evacuation. Data below the cursor is therefore never
/// overwritten while it may still be live.
pub struct Region {
    id: RegionId,
    start: Address,
    extent: ByteSize,
    cursor: AtomicUsize,
}

impl Region {
    pub(crate) fn new(id: RegionId, start: Address, extent: ByteSize) -> Self {
        debug_assert!(start.is_aligned_to(BYTES_IN_PAGE));
        Self {
            id,
            start,
            extent,
            cursor: AtomicUsize::new(start.as_usize()),
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.start + self.extent
    }

    pub fn extent(&self) -> ByteSize {
        self.extent
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.start && address < self.end()
    }

    pub fn contains_object(&self, object: ObjectReference) -> bool {
        !object.is_null() && self.contains(object.to_raw_address())
    }

    /// Bump-allocate from the region. Returns `Address::ZERO` when the
    /// request does not fit in the remaining space.
    pub fn alloc(&self, bytes: usize, align: usize) -> Address {
        debug_assert!(align.is_power_of_two());
        loop {
            let old = self.cursor.load(Ordering::Relaxed);
            let result = unsafe { Address::from_usize(old) }.align_up(align);
            let new = result + bytes;
            if new > self.end() {
                return Address::ZERO;
            }
            if self
                .cursor
                .compare_exchange_weak(old, new.as_usize(), Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return result;
            }
        }
    }

    /// Current cursor position.
    pub fn cursor(&self) -> Address {
        unsafe { Address::from_usize(self.cursor.load(Ordering::Relaxed)) }
    }

    /// Wind the cursor back to the start of the region. Only legal once the
    /// region's contents have been evacuated and the region recycled.
    pub fn reset(&self) {
        self.cursor.store(self.start.as_usize(), Ordering::SeqCst);
    }

    /// Pages covered by allocated data.
    pub fn reserved_pages(&self) -> usize {
        bytes_to_pages_up(self.cursor() - self.start)
    }

    /// Pages still free for allocation.
    pub fn available_pages(&self) -> usize {
        bytes_to_pages_up(self.extent) - self.reserved_pages()
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}[{}..{}, cursor {}]",
            self.id,
            self.start,
            self.end(),
            self.cursor()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::BYTES_IN_PAGE;
    use crate::util::memory;

    fn fresh_region(pages: usize) -> Region {
        let extent = pages * BYTES_IN_PAGE;
        let start = memory::map_anonymous(extent).unwrap();
        Region::new(RegionId(0), start, extent)
    }

    #[test]
    fn bump_allocation() {
        let region = fresh_region(1);
        let a = region.alloc(24, 8);
        let b = region.alloc(8, 8);
        assert_eq!(a, region.start());
        assert_eq!(b, region.start() + 24usize);
        assert!(b.is_aligned_to(8));
    }

    #[test]
    fn alignment_is_respected() {
        let region = fresh_region(1);
        region.alloc(4, 4);
        let aligned = region.alloc(16, 16);
        assert!(aligned.is_aligned_to(16));
    }

    #[test]
    fn overflow_returns_zero() {
        let region = fresh_region(1);
        assert!(!region.alloc(BYTES_IN_PAGE, 8).is_zero());
        assert!(region.alloc(8, 8).is_zero());
        // a failed request does not move the cursor
        assert_eq!(region.cursor(), region.end());
    }

    #[test]
    fn reset_rewinds_cursor() {
        let region = fresh_region(2);
        region.alloc(64, 8);
        assert_eq!(region.reserved_pages(), 1);
        region.reset();
        assert_eq!(region.reserved_pages(), 0);
        assert_eq!(region.available_pages(), 2);
    }
}
