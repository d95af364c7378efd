extern crate regioncopy;

use regioncopy::memory_manager;
use regioncopy::util::options::Options;
use regioncopy::util::Address;

#[test]
fn process_valid_pairs() {
    let mut options = Options::default();
    assert!(memory_manager::process(&mut options, "regionPages", "64"));
    assert_eq!(options.region_pages, 64);
    assert!(memory_manager::process(&mut options, "threads", "3"));
    assert_eq!(options.threads, 3);
    assert!(memory_manager::process(&mut options, "memoryFraction", "0.5"));
}

#[test]
fn process_rejects_invalid_values() {
    let mut options = Options::default();
    assert!(!memory_manager::process(&mut options, "threads", "0"));
    assert!(!memory_manager::process(&mut options, "heapSize", "not-a-number"));
    assert!(!memory_manager::process(&mut options, "memoryFraction", "1.5"));
}

#[test]
fn address_arithmetic() {
    let addr = unsafe { Address::from_usize(0x1000) };
    assert_eq!((addr + 8usize).as_usize(), 0x1008);
    assert!((addr + 7usize).align_up(8).is_aligned_to(8));
    assert_eq!(addr + 16usize - addr, 16);
}
