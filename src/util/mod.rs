//! Utilities used across the collector.

mod address;

pub mod constants;
pub mod deque;
pub mod forwarding;
pub mod logger;
pub mod memory;
pub mod options;
#[cfg(test)]
pub mod test_util;

pub mod alloc;

pub use self::address::{Address, ByteOffset, ByteSize, ObjectReference};
