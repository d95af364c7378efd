//! The shared, lock-free directory of all copy regions: one atomically
//! updatable state cell and one usage counter per region, plus the ranked
//! claim-by-compare-and-set selection algorithm every context goes through
//! to obtain an allocation source or a copy destination.

use crate::policy::region::{Region, RegionId};
use crate::policy::state::RegionState;
use crate::util::constants::pages_to_bytes;
use crate::util::options::Options;
use crate::util::{Address, ObjectReference};
use atomic::{Atomic, Ordering};
use enum_map::EnumMap;
use itertools::Itertools;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::AtomicIsize;

/// Lowest number of regions the directory will manage.
pub const MIN_REGIONS: usize = 2;
/// Highest number of regions the directory will manage.
pub const MAX_REGIONS: usize = 19;

struct RegionEntry {
    region: Region,
    state: Atomic<RegionState>,
    /// Collection-count heuristic: incremented when the region becomes a
    /// copy destination, decremented when it becomes an allocation source.
    /// Ranking reads it as a momentary snapshot; correctness never depends
    /// on its exactness.
    count: AtomicIsize,
}

/// A momentary view of one region, handed to the ranking function.
#[derive(Copy, Clone, Debug)]
pub struct RegionCandidate {
    pub id: RegionId,
    pub state: RegionState,
    pub count: isize,
}

/// Ranks directory snapshots for selection. The directory walks candidates
/// best-first and claims the first whose state cell it wins.
pub trait SelectionPolicy: 'static + Send + Sync {
    fn compare(
        &self,
        a: &RegionCandidate,
        b: &RegionCandidate,
        desired: RegionState,
    ) -> CmpOrdering;
}

/// The counter-based ranking: unused regions first, then regions in the
/// state *not* being requested, then regions already in the requested state.
/// Ties break on the usage counter, in opposite directions for the two
/// request kinds, so collector load spreads instead of re-copying the most
/// recently copied data.
pub struct CounterRanking;

impl CounterRanking {
    fn rank(state: RegionState, desired: RegionState) -> u8 {
        if state == RegionState::Unused {
            0
        } else if state != desired {
            1
        } else {
            2
        }
    }
}

impl SelectionPolicy for CounterRanking {
    fn compare(
        &self,
        a: &RegionCandidate,
        b: &RegionCandidate,
        desired: RegionState,
    ) -> CmpOrdering {
        Self::rank(a.state, desired)
            .cmp(&Self::rank(b.state, desired))
            .then_with(|| {
                if desired == RegionState::From {
                    // prefer the region least used as a copy destination
                    a.count.cmp(&b.count)
                } else {
                    b.count.cmp(&a.count)
                }
            })
    }
}

pub struct RegionDirectory {
    entries: Vec<RegionEntry>,
    policy: Box<dyn SelectionPolicy>,
}

impl RegionDirectory {
    /// Carve `region_count` regions of `region_pages` each out of the span
    /// starting at `start`, all initially unused.
    pub fn new(start: Address, region_count: usize, region_pages: usize) -> Self {
        Self::with_policy(start, region_count, region_pages, Box::new(CounterRanking))
    }

    pub fn with_policy(
        start: Address,
        region_count: usize,
        region_pages: usize,
        policy: Box<dyn SelectionPolicy>,
    ) -> Self {
        debug_assert!(region_count >= MIN_REGIONS && region_count <= MAX_REGIONS);
        let extent = pages_to_bytes(region_pages);
        let entries = (0..region_count)
            .map(|i| RegionEntry {
                region: Region::new(RegionId(i), start + i * extent, extent),
                state: Atomic::new(RegionState::Unused),
                count: AtomicIsize::new(0),
            })
            .collect();
        Self { entries, policy }
    }

    /// The number of regions, considering the configured bounds and memory
    /// fraction.
    pub fn number_of_regions(options: &Options) -> usize {
        if options.regions != 0 {
            return options.regions.clamp(MIN_REGIONS, MAX_REGIONS);
        }
        let budget_pages = (options.heap_pages() as f32 * options.memory_fraction) as usize;
        let n = (MIN_REGIONS - 1) + (budget_pages / options.region_pages) % (MAX_REGIONS - MIN_REGIONS);
        n.clamp(MIN_REGIONS, MAX_REGIONS)
    }

    fn entry(&self, id: RegionId) -> &RegionEntry {
        &self.entries[id.0]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = RegionId> + '_ {
        (0..self.entries.len()).map(RegionId)
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.entry(id).region
    }

    pub fn state(&self, id: RegionId) -> RegionState {
        self.entry(id).state.load(Ordering::SeqCst)
    }

    pub fn usage_count(&self, id: RegionId) -> isize {
        self.entry(id).count.load(Ordering::SeqCst)
    }

    /// Select a region to hold `desired` state, releasing `previous` (the
    /// caller's old binding) back to unused in the same step.
    ///
    /// Returns `None` when another thread raced us on `previous`; the caller
    /// must retry. The claim is rolled back in that case so the region is
    /// not lost.
    pub fn select(&self, previous: Option<RegionId>, desired: RegionState) -> Option<RegionId> {
        debug_assert!(desired.in_use());
        trace!("select(previous {:?}, desired {}) {:?}", previous, desired, self);

        // the region being handed back is not a candidate to replace itself
        let ranked = self.ranked_snapshot(previous, desired);
        let mut claimed: Option<(RegionId, RegionState)> = None;
        for candidate in &ranked {
            if self
                .entry(candidate.id)
                .state
                .compare_exchange(candidate.state, desired, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                claimed = Some((candidate.id, candidate.state));
                break;
            }
        }
        // Worst case: every cell changed under us, which needs concurrency
        // equal to the region count. Hand back the best-ranked candidate
        // unclaimed; the caller fails fast on it and retries.
        let (chosen, prior) = claimed.unwrap_or_else(|| {
            let best = &ranked[0];
            warn!("select could not claim any region, returning {}", best.id);
            (best.id, best.state)
        });

        if let Some(previous) = previous {
            if !(self.transition(previous, RegionState::From, RegionState::Unused)
                || self.transition(previous, RegionState::To, RegionState::Unused))
            {
                // Another thread already recycled the previous region. Undo
                // the claim so the region cannot end up bound twice.
                if claimed.is_some() {
                    self.entry(chosen).state.store(prior, Ordering::SeqCst);
                }
                return None;
            }
        }

        self.update_usage(chosen, desired);
        Some(chosen)
    }

    /// Compare-and-set one region's state cell. Returns false if the cell
    /// did not hold `from`.
    pub fn transition(&self, id: RegionId, from: RegionState, to: RegionState) -> bool {
        #[cfg(feature = "extreme_assertions")]
        assert!(
            from.can_transition_to(to),
            "illegal region transition {} -> {} for {}",
            from,
            to,
            id
        );
        self.entry(id)
            .state
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    fn update_usage(&self, id: RegionId, desired: RegionState) {
        match desired {
            RegionState::To => {
                self.entry(id).count.fetch_add(1, Ordering::SeqCst);
            }
            RegionState::From => {
                self.entry(id).count.fetch_sub(1, Ordering::SeqCst);
            }
            RegionState::Unused => {}
        }
    }

    fn ranked_snapshot(
        &self,
        excluded: Option<RegionId>,
        desired: RegionState,
    ) -> Vec<RegionCandidate> {
        self.ids()
            .filter(|id| Some(*id) != excluded)
            .map(|id| RegionCandidate {
                id,
                state: self.state(id),
                count: self.usage_count(id),
            })
            .sorted_by(|a, b| self.policy.compare(a, b, desired))
            .collect()
    }

    /// The region holding `address`, if any.
    pub fn region_of(&self, address: Address) -> Option<RegionId> {
        self.entries
            .iter()
            .find(|e| e.region.contains(address))
            .map(|e| e.region.id())
    }

    /// The region holding `object`, if any.
    pub fn region_of_object(&self, object: ObjectReference) -> Option<RegionId> {
        if object.is_null() {
            None
        } else {
            self.region_of(object.to_raw_address())
        }
    }

    /// Reserved pages broken down per region state.
    pub fn reserved_pages_by_state(&self) -> EnumMap<RegionState, usize> {
        let mut usage = EnumMap::default();
        for id in self.ids() {
            usage[self.state(id)] += self.region(id).reserved_pages();
        }
        usage
    }

    pub fn pages_total(&self) -> usize {
        self.entries
            .iter()
            .map(|e| crate::util::constants::bytes_to_pages_up(e.region.extent()))
            .sum()
    }
}

impl fmt::Debug for RegionDirectory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut map = f.debug_map();
        for id in self.ids() {
            map.entry(
                &id,
                &format_args!(
                    "{} count {} reserved {}",
                    self.state(id),
                    self.usage_count(id),
                    self.region(id).reserved_pages()
                ),
            );
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::BYTES_IN_PAGE;
    use crate::util::memory;
    use crate::util::test_util::panic_after;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    fn fresh_directory(regions: usize, pages: usize) -> RegionDirectory {
        let start = memory::map_anonymous(regions * pages * BYTES_IN_PAGE).unwrap();
        RegionDirectory::new(start, regions, pages)
    }

    fn candidate(id: usize, state: RegionState, count: isize) -> RegionCandidate {
        RegionCandidate {
            id: RegionId(id),
            state,
            count,
        }
    }

    #[test]
    fn ranking_prefers_unused_then_other_state() {
        use RegionState::*;
        let policy = CounterRanking;
        let unused = candidate(0, Unused, 0);
        let to = candidate(1, To, 0);
        let from = candidate(2, From, 0);

        // requesting a from-space: unused, then to, then from
        assert_eq!(policy.compare(&unused, &to, From), CmpOrdering::Less);
        assert_eq!(policy.compare(&to, &from, From), CmpOrdering::Less);
        // requesting a to-space: unused, then from, then to
        assert_eq!(policy.compare(&unused, &from, To), CmpOrdering::Less);
        assert_eq!(policy.compare(&from, &to, To), CmpOrdering::Less);
    }

    #[test]
    fn ranking_tie_breaks_on_counter() {
        use RegionState::*;
        let policy = CounterRanking;
        let cold = candidate(0, Unused, -2);
        let hot = candidate(1, Unused, 3);

        // a from-space request prefers the region least used as to-space
        assert_eq!(policy.compare(&cold, &hot, From), CmpOrdering::Less);
        // a to-space request prefers it the other way around
        assert_eq!(policy.compare(&hot, &cold, To), CmpOrdering::Less);
    }

    #[test]
    fn select_claims_unused_and_updates_counter() {
        let directory = fresh_directory(3, 1);
        let id = directory.select(None, RegionState::From).unwrap();
        assert_eq!(directory.state(id), RegionState::From);
        assert_eq!(directory.usage_count(id), -1);

        let to = directory.select(None, RegionState::To).unwrap();
        assert_ne!(to, id);
        assert_eq!(directory.state(to), RegionState::To);
        assert_eq!(directory.usage_count(to), 1);
    }

    #[test]
    fn select_releases_previous() {
        let directory = fresh_directory(3, 1);
        let first = directory.select(None, RegionState::To).unwrap();
        let second = directory.select(Some(first), RegionState::To).unwrap();
        assert_ne!(first, second);
        assert_eq!(directory.state(first), RegionState::Unused);
        assert_eq!(directory.state(second), RegionState::To);
    }

    #[test]
    fn select_rolls_back_when_previous_is_gone() {
        let directory = fresh_directory(3, 1);
        let first = directory.select(None, RegionState::To).unwrap();
        // another thread recycles the previous region before we do
        assert!(directory.transition(first, RegionState::To, RegionState::Unused));

        let states_before: Vec<_> = directory.ids().map(|id| directory.state(id)).collect();
        assert_eq!(directory.select(Some(first), RegionState::To), None);
        let states_after: Vec<_> = directory.ids().map(|id| directory.state(id)).collect();
        // the failed call left no state change behind
        assert_eq!(states_before, states_after);
    }

    #[test]
    fn region_lookup_by_address() {
        let directory = fresh_directory(2, 1);
        let inside = directory.region(RegionId(1)).start() + 16usize;
        assert_eq!(directory.region_of(inside), Some(RegionId(1)));
        let outside = directory.region(RegionId(1)).end() + 4096usize;
        assert_eq!(directory.region_of(outside), None);
    }

    #[test]
    fn number_of_regions_is_bounded() {
        let mut options = Options::default();
        options.heap_size = 64 << 20;
        options.region_pages = 256;
        options.regions = 0;
        let n = RegionDirectory::number_of_regions(&options);
        assert!((MIN_REGIONS..=MAX_REGIONS).contains(&n));

        options.regions = 100;
        assert_eq!(RegionDirectory::number_of_regions(&options), MAX_REGIONS);
        options.regions = 1;
        assert_eq!(RegionDirectory::number_of_regions(&options), MIN_REGIONS);
    }

    #[test]
    fn exclusive_claims_under_contention() {
        // More regions than threads, so the best-effort fallback path is
        // never hit and every successful selection is an exclusive claim.
        let directory = Arc::new(fresh_directory(12, 1));
        let held: Arc<Mutex<HashSet<RegionId>>> = Arc::new(Mutex::new(HashSet::new()));

        panic_after(60_000, {
            let directory = directory.clone();
            let held = held.clone();
            move || {
                let handles: Vec<_> = (0..4)
                    .map(|t| {
                        let directory = directory.clone();
                        let held = held.clone();
                        std::thread::spawn(move || {
                            let desired = if t % 2 == 0 {
                                RegionState::From
                            } else {
                                RegionState::To
                            };
                            for _ in 0..200 {
                                let id = loop {
                                    if let Some(id) = directory.select(None, desired) {
                                        break id;
                                    }
                                };
                                assert!(
                                    held.lock().unwrap().insert(id),
                                    "{} claimed while already bound elsewhere",
                                    id
                                );
                                assert_eq!(directory.state(id), desired);
                                // deregister before handing the region back
                                held.lock().unwrap().remove(&id);
                                assert!(directory.transition(id, desired, RegionState::Unused));
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            }
        });
    }
}
