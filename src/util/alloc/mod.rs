mod bump_allocator;

pub use self::bump_allocator::BumpAllocator;
