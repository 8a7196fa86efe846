use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// Shared allows the user to mutably share testbench objects (such as a Scoreboard, etc.)
// between Tasks. Tasks must be Send, so this is an Arc<Mutex>, even though the simulation
// only ever runs on one thread and the lock is never contended.
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Shared<T> {
    pub fn new(data: T) -> Shared<T> {
        Shared(Arc::new(Mutex::new(data)))
    }
    pub fn get(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.get())
    }
}

impl<T: Clone> Shared<T> {
    pub fn snapshot(&self) -> T {
        self.get().clone()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(self.0.clone())
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Shared::new(T::default())
    }
}
