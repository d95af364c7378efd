use crate::policy::directory::RegionDirectory;
use crate::policy::region::RegionId;
use crate::util::Address;
use std::sync::Arc;

/// A thread-local allocation cursor over the one region its owner currently
/// holds. Mutators bind one to their allocation source, collectors bind one
/// to their copy destination; `rebind` moves it to a newly selected region.
pub struct BumpAllocator {
    directory: Arc<RegionDirectory>,
    region: Option<RegionId>,
}

impl BumpAllocator {
    pub fn new(directory: Arc<RegionDirectory>) -> Self {
        Self {
            directory,
            region: None,
        }
    }

    /// The region this allocator is bound to, if any.
    pub fn region(&self) -> Option<RegionId> {
        self.region
    }

    /// Bind the allocator to a region. The caller must own the region (it
    /// claimed the region's state cell via selection).
    pub fn rebind(&mut self, region: RegionId) {
        trace!("rebind {:?} -> {:?}", self.region, region);
        self.region = Some(region);
    }

    /// Allocate `bytes` with the given alignment from the bound region.
    /// Returns `Address::ZERO` if unbound or if the region is exhausted.
    pub fn alloc(&mut self, bytes: usize, align: usize) -> Address {
        match self.region {
            Some(id) => self.directory.region(id).alloc(bytes, align),
            None => Address::ZERO,
        }
    }
}
