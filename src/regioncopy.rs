use crate::plan::coordinator::CollectionCoordinator;
use crate::policy::directory::RegionDirectory;
use crate::policy::external::ExternalSpace;
use crate::runtime::Runtime;
use crate::util::constants::pages_to_bytes;
use crate::util::memory;
use crate::util::options::Options;
use crate::util::Address;
use std::sync::Arc;

/// An instance of the collector: the mapped heap, the region directory
/// carved out of it, and the coordinator driving collections over it.
/// One per runtime.
pub struct RegionCopy<R: Runtime> {
    coordinator: Arc<CollectionCoordinator<R>>,
    options: Arc<Options>,
    heap_start: Address,
    heap_extent: usize,
}

impl<R: Runtime> RegionCopy<R> {
    pub fn new(options: Options) -> Self {
        Self::with_externals(options, Vec::new())
    }

    /// Build an instance that also recognises the given non-moving spaces.
    pub fn with_externals(options: Options, externals: Vec<Arc<dyn ExternalSpace>>) -> Self {
        let region_count = RegionDirectory::number_of_regions(&options);
        let heap_extent = region_count * pages_to_bytes(options.region_pages);
        let heap_start = memory::map_anonymous(heap_extent)
            .unwrap_or_else(|e| panic!("failed to map a {} byte heap: {}", heap_extent, e));
        info!(
            "mapped {} regions of {} pages at {}",
            region_count, options.region_pages, heap_start
        );

        let directory = Arc::new(RegionDirectory::new(
            heap_start,
            region_count,
            options.region_pages,
        ));
        let coordinator = Arc::new(CollectionCoordinator::new(directory, externals));
        Self {
            coordinator,
            options: Arc::new(options),
            heap_start,
            heap_extent,
        }
    }

    pub fn coordinator(&self) -> &Arc<CollectionCoordinator<R>> {
        &self.coordinator
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn heap_start(&self) -> Address {
        self.heap_start
    }

    pub fn heap_extent(&self) -> usize {
        self.heap_extent
    }
}
