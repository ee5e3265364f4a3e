use core::fmt;
use core::num::NonZeroU32;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(NonZeroU32);

        impl $name {
            pub fn new(id: u32) -> Option<Self> {
                NonZeroU32::new(id).map(Self)
            }

            pub fn val(&self) -> u32 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// Thread identifier
    ThreadHandle,
    "thread"
);
handle!(
    /// Semaphore identifier
    SemaHandle,
    "sema"
);
handle!(
    /// Lock identifier
    LockHandle,
    "lock"
);
handle!(
    /// Condition variable identifier
    CondHandle,
    "cond"
);

/// Monotonic id source for one handle table.
#[derive(Debug)]
pub(crate) struct HandleAllocator {
    next: u32,
}

impl HandleAllocator {
    pub(crate) const fn new() -> Self {
        Self { next: 1 }
    }

    pub(crate) fn next<H>(&mut self, make: impl FnOnce(u32) -> Option<H>) -> H {
        let id = self.next;
        self.next += 1;
        match make(id) {
            Some(handle) => handle,
            None => crate::kpanic!("handle space exhausted"),
        }
    }
}
