//! A concurrent, multi-region copying garbage collector.
//!
//! Heap memory is carved into fixed-size regions that rotate between three
//! roles: unused, allocation source ("from"), and copy destination ("to").
//! Application threads allocate from from-regions while collector threads
//! concurrently evacuate live objects into to-regions, with a write barrier
//! and remembered sets keeping an in-progress trace honest against ongoing
//! mutation.
//!
//! The crate is generic over a small [`runtime::Runtime`] binding that
//! supplies object sizes, reference-slot scanning and root enumeration;
//! everything else — region selection, the collection phase machine, the
//! forwarding protocol, the barriers — lives here.

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate static_assertions;

pub mod memory_manager;
pub mod plan;
pub mod policy;
pub mod runtime;
pub mod util;

mod regioncopy;
pub use crate::regioncopy::RegionCopy;

#[cfg(test)]
mod tests;
