use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle returned by [`Ttl::add`](crate::Ttl::add), used to reset or remove the item later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    pub(crate) const fn new(raw: u64) -> Self {
        ItemId(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues ids that are distinct for the lifetime of one registry.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn next(&self) -> ItemId {
        ItemId::new(self.next.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
    }
}
