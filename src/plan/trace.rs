use crate::runtime::Slot;
use crate::util::deque::SharedPool;
use crate::util::ObjectReference;

/// The global trace: the shared pools every per-thread tracer feeds and
/// drains during a closure. Root slots seed the trace at prepare time;
/// values carry discovered objects between collector threads.
pub struct Trace {
    values: SharedPool<ObjectReference>,
    root_slots: SharedPool<Slot>,
}

impl Trace {
    pub fn new() -> Self {
        Self {
            values: SharedPool::new(),
            root_slots: SharedPool::new(),
        }
    }

    pub fn values(&self) -> &SharedPool<ObjectReference> {
        &self.values
    }

    pub fn root_slots(&self) -> &SharedPool<Slot> {
        &self.root_slots
    }

    /// Drop whatever a previous (possibly abandoned) cycle left behind.
    pub fn prepare(&self) {
        self.values.clear();
        self.root_slots.clear();
    }

    /// A trace is complete when nothing is left to pull.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.root_slots.is_empty()
    }

    pub fn release(&self) {
        self.values.clear();
        self.root_slots.clear();
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}
