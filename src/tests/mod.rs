//! End-to-end scenarios driven through the mock runtime. These tests share
//! the mock root table, so every test body runs under `serial_test`.

mod delegation;
mod protocol;
mod stress;

pub(crate) mod fixture {
    use crate::regioncopy::RegionCopy;
    use crate::runtime::mock::MockRuntime;
    use crate::util::options::Options;

    /// A small heap with an explicit region count and 1-page regions, so
    /// region capacities are easy to reason about (a 4 KiB region holds 128
    /// two-field mock objects).
    pub fn heap(regions: usize, threads: usize) -> RegionCopy<MockRuntime> {
        let mut options = Options::default();
        options.regions = regions;
        options.region_pages = 1;
        options.threads = threads;
        crate::memory_manager::create::<MockRuntime>(options)
    }

    pub fn small_heap(regions: usize) -> RegionCopy<MockRuntime> {
        heap(regions, 1)
    }
}
