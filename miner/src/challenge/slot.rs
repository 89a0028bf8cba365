use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A capacity-one token gating a single in-flight task.
///
/// Acquisition never blocks: if the token is held, [Slot::try_acquire] returns `None`.
#[derive(Clone, Debug, Default)]
pub struct Slot {
    held: Arc<AtomicBool>,
}

impl Slot {
    /// Take the token, if it is free.
    pub fn try_acquire(&self) -> Option<Permit> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Permit {
                held: self.held.clone(),
            })
    }

    /// Returns true if the token is currently held.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof that a [Slot] is held. The slot is released when the permit is dropped.
#[derive(Debug)]
pub struct Permit {
    held: Arc<AtomicBool>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
