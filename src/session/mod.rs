//! Session engine (§4.3, §4.4, §4.5): request/response correlation,
//! listener thread, statusword dispatch, and reconnection, specialized per
//! wire profile.
//!
//! The serial and TCP profiles differ enough in addressing and transaction
//! shape (§3) that they are rendered as two concrete session types rather
//! than one generic engine behind a single read/write signature — each
//! still shares the state machine (§4.3 state transitions module) and the
//! subscriber registry (§4.6).

#[cfg(feature = "serial")]
pub mod serial;
pub mod state;
#[cfg(feature = "tcp")]
pub mod tcp;

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::subscribers::SubscriberRegistry;
use state::SessionState;

/// Shared lifecycle surface both session types implement.
pub trait Session {
    fn state(&self) -> SessionState;
    fn close(&mut self);
    fn subscribe(&self, id: u8, callback: impl Fn(u16) + Send + 'static) -> Result<(), Error>;
    fn unsubscribe(&self, id: u8);
}

pub(crate) struct SyncSlotInner {
    id: u8,
    idx: u16,
    sidx: u8,
    expected_sz: usize,
    data: Vec<u8>,
    received: Option<usize>,
    complete: bool,
}

/// The single outstanding synchronous-transaction slot (§3 invariant 4, §5
/// "Condition-variable handoff"). At most one transaction may be in flight
/// at a time; callers serialize through the session lock before touching
/// this slot.
pub(crate) struct SyncSlot {
    inner: Mutex<SyncSlotInner>,
    cond: Condvar,
}

impl SyncSlot {
    pub(crate) fn new() -> Self {
        SyncSlot {
            inner: Mutex::new(SyncSlotInner {
                id: 0,
                idx: 0,
                sidx: 0,
                expected_sz: 0,
                data: Vec::new(),
                received: None,
                complete: true,
            }),
            cond: Condvar::new(),
        }
    }

    /// Arms the slot for a new transaction awaiting `expected_sz` bytes
    /// from `(id, idx, sidx)`.
    pub(crate) fn arm(&self, id: u8, idx: u16, sidx: u8, expected_sz: usize) {
        let mut slot = self.inner.lock().expect("sync lock poisoned");
        slot.id = id;
        slot.idx = idx;
        slot.sidx = sidx;
        slot.expected_sz = expected_sz;
        slot.received = None;
        slot.complete = false;
    }

    /// Called by the listener for every decoded response frame. Copies the
    /// payload into the slot and wakes the waiter if this frame matches the
    /// armed transaction and none has completed it yet (first-writer-wins,
    /// §5 "Ordering guarantees").
    pub(crate) fn try_complete(&self, frame_id: u8, idx: u16, sidx: u8, payload: &[u8]) -> bool {
        let mut slot = self.inner.lock().expect("sync lock poisoned");
        if slot.complete {
            return false;
        }
        let id_matches = slot.id == frame_id || slot.id == 0;
        if id_matches && slot.idx == idx && slot.sidx == sidx && slot.expected_sz >= payload.len() {
            slot.data = payload.to_vec();
            slot.received = Some(payload.len());
            slot.complete = true;
            self.cond.notify_all();
            true
        } else {
            false
        }
    }

    /// Waits for the armed transaction to complete, up to `timeout`.
    pub(crate) fn wait(&self, timeout: Duration) -> Result<Vec<u8>, Error> {
        let mut slot = self.inner.lock().expect("sync lock poisoned");
        let deadline = Instant::now() + timeout;
        while !slot.complete {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                slot.complete = true; // give up the slot even on timeout
                return Err(Error::Timeout.record());
            }
            let (guard, result) =
                self.cond.wait_timeout(slot, remaining).expect("sync lock poisoned");
            slot = guard;
            if result.timed_out() && !slot.complete {
                slot.complete = true;
                return Err(Error::Timeout.record());
            }
        }
        Ok(slot.data[..slot.received.unwrap_or(0)].to_vec())
    }

    /// Waits for one more unsolicited completion (used by the axis scan,
    /// which re-arms the slot after each hit rather than after a fixed
    /// transaction).
    pub(crate) fn wait_for_hit(&self, timeout: Duration) -> Result<Vec<u8>, Error> {
        self.wait(timeout)
    }
}

pub(crate) fn new_subscribers() -> SubscriberRegistry {
    SubscriberRegistry::new()
}
