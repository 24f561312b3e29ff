//! Serial-profile session (§4.3): the `MSG_A2B` handshake, a background
//! byte-reassembly listener, and synchronous register transactions over a
//! single node or node group.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace, warn};

use super::state::{SessionState, StateCell};
use super::{new_subscribers, Session, SyncSlot};
use crate::config::{
    SerialConfig, INIT_WAIT_TIME, MSG_A2B, SCAN_TIMEOUT, STATUSWORD_IDX, STATUSWORD_SIDX,
    UARTCFG_BIN_IDX, UARTCFG_BIN_SIDX, UARTCFG_ID_IDX, UARTCFG_ID_SIDX,
};
use crate::error::Error;
use crate::frame::{encode_serial, SerialFrame, MAX_PAYLOAD};
use crate::framer::{Framer, Progress};
use crate::subscribers::SubscriberRegistry;
use crate::transport::serial::SerialTransport;
use crate::transport::{ReadOutcome, Transport};

/// A session talking to one or more nodes over a serial link.
///
/// Callers serialize through `session_lock` for the duration of a
/// transaction (write the request, then wait on the sync slot); the
/// listener thread owns byte reassembly and never blocks a caller beyond
/// the brief transport-lock hold needed to drain the port.
pub struct SerialSession {
    transport: Arc<Mutex<SerialTransport>>,
    session_lock: Mutex<()>,
    sync: Arc<SyncSlot>,
    state: Arc<StateCell>,
    subs: Arc<SubscriberRegistry>,
    stop: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
    node: u8,
    read_timeout: Duration,
}

impl SerialSession {
    /// Opens the port, performs the `MSG_A2B` handshake, switches the
    /// device into binary mode, and starts the listener.
    pub fn open(config: &SerialConfig, node: u8) -> Result<Self, Error> {
        let mut transport = SerialTransport::open(config)?;
        thread::sleep(INIT_WAIT_TIME);
        transport.write(MSG_A2B).map_err(Error::record)?;

        let transport = Arc::new(Mutex::new(transport));
        let sync = Arc::new(SyncSlot::new());
        let subs = Arc::new(new_subscribers());
        let state = Arc::new(StateCell::new(SessionState::Unknown));
        let stop = Arc::new(AtomicBool::new(false));

        let listener =
            spawn_listener(transport.clone(), sync.clone(), subs.clone(), state.clone(), stop.clone());

        let session = SerialSession {
            transport,
            session_lock: Mutex::new(()),
            sync,
            state,
            subs,
            stop,
            listener: Some(listener),
            node,
            read_timeout: config.read_timeout,
        };

        session.write_register(node, UARTCFG_BIN_IDX, UARTCFG_BIN_SIDX, &[1])?;
        session.state.set(SessionState::Connected);
        debug!("serial session on node {node} is operative");
        Ok(session)
    }

    pub fn read_register(&self, node: u8, idx: u16, sidx: u8) -> Result<Vec<u8>, Error> {
        self.transact(node, idx, sidx)
    }

    /// Sends a write request and returns as soon as it is on the wire.
    ///
    /// Fire-and-forget at this layer (§4.3): the serial variant elicits no
    /// confirmation frame for a write, so this does not arm or wait on the
    /// sync slot the way a read does.
    pub fn write_register(&self, node: u8, idx: u16, sidx: u8, payload: &[u8]) -> Result<(), Error> {
        if !matches!(self.state.get(), SessionState::Connected | SessionState::Unknown) {
            return Err(Error::State("serial session is not connected".into()).record());
        }
        let _guard = self.session_lock.lock().expect("session lock poisoned");
        let frame = encode_serial(node, idx, sidx, payload)?;
        self.write_bytes(&frame.to_bytes())
    }

    fn transact(&self, node: u8, idx: u16, sidx: u8) -> Result<Vec<u8>, Error> {
        if !matches!(self.state.get(), SessionState::Connected | SessionState::Unknown) {
            return Err(Error::State("serial session is not connected".into()).record());
        }
        let _guard = self.session_lock.lock().expect("session lock poisoned");
        let frame = encode_serial(node, idx, sidx, &[])?;
        self.sync.arm(node, idx, sidx, MAX_PAYLOAD);
        self.write_bytes(&frame.to_bytes())?;
        self.sync.wait(self.read_timeout)
    }

    /// Broadcasts a read of the node-id register and collects every axis
    /// that answers before `SCAN_TIMEOUT` elapses with no further replies
    /// (§4.3 axis scan).
    pub fn scan_axes(&self) -> Result<Vec<u8>, Error> {
        let _guard = self.session_lock.lock().expect("session lock poisoned");
        let frame = encode_serial(0, UARTCFG_ID_IDX, UARTCFG_ID_SIDX, &[])?;
        let mut found = Vec::new();
        self.sync.arm(0, UARTCFG_ID_IDX, UARTCFG_ID_SIDX, MAX_PAYLOAD);
        self.write_bytes(&frame.to_bytes())?;
        loop {
            match self.sync.wait_for_hit(SCAN_TIMEOUT) {
                Ok(payload) => {
                    if let Some(&id) = payload.first() {
                        found.push(id);
                    }
                    self.sync.arm(0, UARTCFG_ID_IDX, UARTCFG_ID_SIDX, MAX_PAYLOAD);
                }
                Err(Error::Timeout) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<(), Error> {
        let mut port = self.transport.lock().expect("transport lock poisoned");
        port.write(bytes)?;
        Ok(())
    }

    pub fn node(&self) -> u8 {
        self.node
    }
}

impl Session for SerialSession {
    fn state(&self) -> SessionState {
        self.state.get()
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.listener.take() {
            let _ = handle.join();
        }
        self.transport.lock().expect("transport lock poisoned").close();
        self.state.set(SessionState::Disconnected);
    }

    fn subscribe(&self, id: u8, callback: impl Fn(u16) + Send + 'static) -> Result<(), Error> {
        self.subs.subscribe(id, callback)
    }

    fn unsubscribe(&self, id: u8) {
        self.subs.unsubscribe(id);
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        if self.listener.is_some() {
            self.close();
        }
    }
}

fn spawn_listener(
    transport: Arc<Mutex<SerialTransport>>,
    sync: Arc<SyncSlot>,
    subs: Arc<SubscriberRegistry>,
    state: Arc<StateCell>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut framer = Framer::new();
        let mut buf = [0u8; 64];
        while !stop.load(Ordering::Relaxed) {
            let outcome = {
                let mut port = transport.lock().expect("transport lock poisoned");
                port.read(&mut buf)
            };
            match outcome {
                Ok(ReadOutcome::Read(n)) => {
                    for &byte in &buf[..n] {
                        if framer.push(byte) == Progress::Complete {
                            if let Some(frame) = framer.take_frame() {
                                trace!("serial listener decoded frame from node {}", frame.node);
                                handle_frame(&frame, &sync, &subs);
                            }
                        }
                    }
                }
                Ok(ReadOutcome::Empty) => thread::sleep(Duration::from_millis(5)),
                Err(e) => {
                    warn!("serial listener read failed: {e}");
                    state.set(SessionState::Faulty);
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }
    })
}

fn handle_frame(frame: &SerialFrame, sync: &SyncSlot, subs: &SubscriberRegistry) {
    if frame.idx == STATUSWORD_IDX && frame.sidx == STATUSWORD_SIDX && frame.payload.len() >= 2 {
        let value = u16::from_le_bytes([frame.payload[0], frame.payload[1]]);
        subs.dispatch(frame.node, value);
    }
    sync.try_complete(frame.node, frame.idx, frame.sidx, &frame.payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UARTCFG_ID_IDX as SCAN_IDX;

    #[test]
    fn handle_frame_dispatches_statusword_and_completes_sync() {
        let sync = Arc::new(SyncSlot::new());
        let subs = Arc::new(SubscriberRegistry::new());
        let hits = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let hits_cb = hits.clone();
        subs.subscribe(3, move |v| {
            hits_cb.store(v as u32, std::sync::atomic::Ordering::SeqCst);
        })
        .unwrap();

        sync.arm(3, STATUSWORD_IDX, STATUSWORD_SIDX, MAX_PAYLOAD);
        let frame = SerialFrame {
            node: 3,
            idx: STATUSWORD_IDX,
            sidx: STATUSWORD_SIDX,
            payload: vec![0x34, 0x12],
        };
        handle_frame(&frame, &sync, &subs);

        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 0x1234);
        assert_eq!(sync.wait(Duration::from_millis(10)).unwrap(), vec![0x34, 0x12]);
    }

    #[test]
    fn handle_frame_ignores_non_matching_sync_target() {
        let sync = Arc::new(SyncSlot::new());
        let subs = Arc::new(SubscriberRegistry::new());
        sync.arm(1, SCAN_IDX, UARTCFG_ID_SIDX, MAX_PAYLOAD);
        let frame = SerialFrame { node: 2, idx: SCAN_IDX, sidx: UARTCFG_ID_SIDX, payload: vec![2] };
        handle_frame(&frame, &sync, &subs);
        assert!(matches!(sync.wait(Duration::from_millis(10)), Err(Error::Timeout)));
    }
}
