use crate::util::constants::LOG_BYTES_IN_PAGE;

/// The default number of pages in a region (1 MiB regions with 4 KiB pages).
pub const DEFAULT_REGION_PAGES: usize = 256;

/// The default fraction of the heap handed to the copying regions.
pub const DEFAULT_MEMORY_FRACTION: f32 = 0.65;

const MIN_DEFAULT_HEAP: usize = 32 << 20;
const MAX_DEFAULT_HEAP: usize = 4 << 30;

/// Pick a default heap size from the machine's physical memory, the way a
/// runtime without an explicit -Xmx equivalent would.
fn default_heap_size() -> usize {
    use sysinfo::{MemoryRefreshKind, RefreshKind, System};
    // Only load the memory component: constructing a full System is slow and
    // we run during startup.
    let sys = System::new_with_specifics(
        RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
    );
    (sys.total_memory() as usize / 4).clamp(MIN_DEFAULT_HEAP, MAX_DEFAULT_HEAP)
}

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($(#[$outer:meta])*$name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($(#[$outer])*$name: $type[$validator] = $default),*);
    ];
    ($($(#[$outer:meta])*$name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        pub struct Options {
            $($(#[$outer])*pub $name: $type),*
        }
        impl Options {
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    // Parse the given value from str (by env vars or by calling process()) to the right type
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        // Validate
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = val.clone();
                        } else {
                            eprintln!("Warn: unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        eprintln!("Warn: unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => panic!("Invalid Options key: {}", s)
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Options {
                    $($name: $default),*
                };

                // Environment variables that start with REGIONCOPY_ and match an
                // option name (such as REGIONCOPY_HEAP_SIZE) override the default.
                const PREFIX: &str = "REGIONCOPY_";
                for (key, val) in std::env::vars() {
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { options.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
                options
            }
        }
    ]
}

options! {
    /// Number of collector threads.
    threads:         usize [|v: &usize| *v > 0] = num_cpus::get(),
    /// The total heap size in bytes the regions are carved out of.
    heap_size:       usize [|v: &usize| *v > 0] = default_heap_size(),
    /// Pages per region. Every region has the same fixed capacity.
    region_pages:    usize [|v: &usize| *v > 0] = DEFAULT_REGION_PAGES,
    /// Number of regions. 0 derives the count from the heap size and the
    /// memory fraction, bounded the way the directory requires.
    regions:         usize [always_valid] = 0,
    /// Fraction of the available heap consumed by the copying regions.
    memory_fraction: f32   [|v: &f32| *v > 0.0 && *v <= 1.0] = DEFAULT_MEMORY_FRACTION,
}

impl Options {
    /// Set an option from a camelCase name, as runtime command-line plumbing
    /// tends to deliver them (e.g. "heapSize").
    pub fn set_from_camelcase_str(&mut self, s: &str, val: &str) -> bool {
        trace!("Trying to process option pair: ({}, {})", s, val);

        let mut sr = String::with_capacity(s.len());
        for c in s.chars() {
            if c.is_uppercase() {
                sr.push('_');
                for c in c.to_lowercase() {
                    sr.push(c);
                }
            } else {
                sr.push(c)
            }
        }

        let result = self.set_from_str(sr.as_str(), val);
        if result {
            trace!("Validation passed");
        } else {
            trace!("Validation failed")
        }
        result
    }

    /// The heap size in whole pages.
    pub fn heap_pages(&self) -> usize {
        self.heap_size >> LOG_BYTES_IN_PAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::{serial_test, with_cleanup};

    #[test]
    fn no_env_var() {
        serial_test(|| {
            let options = Options::default();
            assert_eq!(options.region_pages, DEFAULT_REGION_PAGES);
            assert_eq!(options.regions, 0);
        })
    }

    #[test]
    fn with_valid_env_var() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("REGIONCOPY_REGION_PAGES", "64");
                    let options = Options::default();
                    assert_eq!(options.region_pages, 64);
                },
                || {
                    std::env::remove_var("REGIONCOPY_REGION_PAGES");
                },
            )
        })
    }

    #[test]
    fn with_invalid_env_var() {
        serial_test(|| {
            with_cleanup(
                || {
                    // invalid value, the default should be used
                    std::env::set_var("REGIONCOPY_MEMORY_FRACTION", "2.5");
                    let options = Options::default();
                    assert_eq!(options.memory_fraction, DEFAULT_MEMORY_FRACTION);
                },
                || {
                    std::env::remove_var("REGIONCOPY_MEMORY_FRACTION");
                },
            )
        })
    }

    #[test]
    fn camelcase_names() {
        serial_test(|| {
            let mut options = Options::default();
            assert!(options.set_from_camelcase_str("regionPages", "128"));
            assert_eq!(options.region_pages, 128);
            assert!(!options.set_from_camelcase_str("threads", "0"));
        })
    }
}
