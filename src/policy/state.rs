use bytemuck::NoUninit;
use enum_map::Enum;
use strum_macros::Display;

/// The role a region currently plays. Held in an atomically updatable cell,
/// one per region; every transition goes through a compare-and-set on that
/// cell.
///
/// A region may only move between `Unused` and an in-use role. `From` and
/// `To` are never adjacent: recycling always passes through `Unused`.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, NoUninit, Enum, Display)]
pub enum RegionState {
    /// Not bound to any context. The region may still hold live objects from
    /// an earlier cycle; its memory is never freed, only its role changes.
    Unused,
    /// The copy destination of some collector thread.
    To,
    /// The allocation source of some mutator thread; objects here are
    /// candidates for evacuation.
    From,
}

impl RegionState {
    /// Is the region bound to a context?
    pub fn in_use(self) -> bool {
        self != RegionState::Unused
    }

    /// The legal adjacency set of the state machine.
    pub fn can_transition_to(self, next: RegionState) -> bool {
        use RegionState::*;
        matches!(
            (self, next),
            (Unused, From) | (Unused, To) | (From, Unused) | (To, Unused)
        )
    }
}

assert_eq_size!(RegionState, u8);
