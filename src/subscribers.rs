//! Statusword subscriber registry (§4.6).

use std::sync::Mutex;

use crate::config::SW_SUBS_SZ_DEF;
use crate::error::Error;

/// A statusword callback: receives the 16-bit value for its subscribed axis.
pub type StatuswordCallback = Box<dyn Fn(u16) + Send>;

struct Subscriber {
    id: u8,
    callback: StatuswordCallback,
}

/// Dynamic array of `{id, callback}` subscribers, guarded by its own lock.
///
/// Callbacks are invoked with the registry lock held (§3 invariant 5) and
/// must not reenter the session engine.
#[derive(Default)]
pub struct SubscriberRegistry {
    subs: Mutex<Vec<Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        SubscriberRegistry { subs: Mutex::new(Vec::with_capacity(SW_SUBS_SZ_DEF)) }
    }

    /// Appends a subscriber for `id`. The backing array grows as needed, so
    /// this only fails if the system is out of memory.
    pub fn subscribe(
        &self,
        id: u8,
        callback: impl Fn(u16) + Send + 'static,
    ) -> Result<(), Error> {
        let mut subs = self.subs.lock().expect("subscriber lock poisoned");
        subs.push(Subscriber { id, callback: Box::new(callback) });
        Ok(())
    }

    /// Removes the first subscriber matching `id`, if any, by swap-remove
    /// (iteration order across subscribers is not otherwise guaranteed).
    pub fn unsubscribe(&self, id: u8) {
        let mut subs = self.subs.lock().expect("subscriber lock poisoned");
        if let Some(pos) = subs.iter().position(|s| s.id == id) {
            subs.swap_remove(pos);
        }
    }

    /// Delivers `value` to every subscriber registered for `id`, in
    /// registration order, under the registry lock.
    pub fn dispatch(&self, id: u8, value: u16) {
        let subs = self.subs.lock().expect("subscriber lock poisoned");
        for sub in subs.iter().filter(|s| s.id == id) {
            (sub.callback)(value);
        }
    }

    #[cfg(test)]
    pub fn count(&self) -> usize {
        self.subs.lock().expect("subscriber lock poisoned").len()
    }
}
