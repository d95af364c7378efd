use bytemuck::NoUninit;
use strum_macros::Display;

/// The global collection phase. One pass per collection cycle, strictly
/// sequential; no sub-phase may be skipped. The only edge outside the cycle
/// ring is `Closure -> Idle`, taken when an in-flight closure is abandoned
/// in favour of a fresh request.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, NoUninit, Display)]
pub enum Phase {
    Idle,
    Prepare,
    Closure,
    Release,
}

impl Phase {
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Prepare) | (Prepare, Closure) | (Closure, Release) | (Release, Idle)
                // abandonment discards the cycle without a release
                | (Closure, Idle)
        )
    }
}
