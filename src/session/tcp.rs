//! TCP-profile session (§4.4): one-frame-in, one-frame-out register
//! transactions plus a background health-poll listener that drives
//! statusword fan-out and reconnection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{info, warn};

use super::state::{SessionState, StateCell};
use super::{new_subscribers, Session};
use crate::config::{TcpConfig, TCP_STATUSWORD_ADDRESS};
use crate::error::{Error, IoErrorKind};
use crate::frame::{encode_tcp, Cmd, TcpFrame};
use crate::subscribers::SubscriberRegistry;
use crate::transport::tcp::TcpTransport;
use crate::transport::Transport;

/// A session talking to one subnode of a device over TCP.
///
/// Every register transaction and every health poll takes the same
/// transport lock for its full send/receive exchange, so the wire never
/// carries an interleaved request from two callers (§4.4).
pub struct TcpSession {
    transport: Arc<Mutex<TcpTransport>>,
    session_lock: Mutex<()>,
    state: Arc<StateCell>,
    subs: Arc<SubscriberRegistry>,
    stop: Arc<AtomicBool>,
    stop_reconnect: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
    subnode: u8,
    recv_delay: std::time::Duration,
}

impl TcpSession {
    pub fn open(config: &TcpConfig, subnode: u8) -> Result<Self, Error> {
        let transport = TcpTransport::connect(config)?;
        let transport = Arc::new(Mutex::new(transport));
        let state = Arc::new(StateCell::new(SessionState::Connected));
        let subs = Arc::new(new_subscribers());
        let stop = Arc::new(AtomicBool::new(false));
        let stop_reconnect = Arc::new(AtomicBool::new(false));

        let listener = spawn_health_listener(
            transport.clone(),
            state.clone(),
            subs.clone(),
            stop.clone(),
            stop_reconnect.clone(),
            config.clone(),
            subnode,
        );

        Ok(TcpSession {
            transport,
            session_lock: Mutex::new(()),
            state,
            subs,
            stop,
            stop_reconnect,
            listener: Some(listener),
            subnode,
            recv_delay: config.recv_delay,
        })
    }

    pub fn read_register(&self, address: u16) -> Result<[u8; 8], Error> {
        Ok(self.transact(address, Cmd::Read, &[])?.data)
    }

    pub fn write_register(&self, address: u16, payload: &[u8]) -> Result<(), Error> {
        self.transact(address, Cmd::Write, payload)?;
        Ok(())
    }

    fn transact(&self, address: u16, cmd: Cmd, payload: &[u8]) -> Result<TcpFrame, Error> {
        if !matches!(self.state.get(), SessionState::Connected | SessionState::Unknown) {
            return Err(Error::State("tcp session is not connected".into()).record());
        }
        let _guard = self.session_lock.lock().expect("session lock poisoned");
        let frame = encode_tcp(self.subnode, address, cmd, payload)?;
        let mut port = self.transport.lock().expect("transport lock poisoned");
        let response = exchange(&mut port, &frame, self.recv_delay)?;
        drop(port);
        Ok(response)
    }

    /// Requests that an in-flight reconnect loop give up immediately rather
    /// than keep retrying (§4.5, §9 redesign note 4 — an explicit stop
    /// flag, not a `goto` back into the handshake).
    pub fn cancel_reconnect(&self) {
        self.stop_reconnect.store(true, Ordering::Relaxed);
    }

    pub fn subnode(&self) -> u8 {
        self.subnode
    }
}

impl Session for TcpSession {
    fn state(&self) -> SessionState {
        self.state.get()
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.stop_reconnect.store(true, Ordering::Relaxed);
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

impl Drop for TcpSession {
    fn drop(&mut self) {
        if self.listener.is_some() {
            self.close();
        }
    }
}

/// Sends `frame` and reads back exactly one reply, failing on NACK
/// (§9 redesign note 1 — the status word lives in the reply's data words,
/// never reinterpreted as a pointer).
fn exchange(
    port: &mut TcpTransport,
    frame: &TcpFrame,
    recv_delay: std::time::Duration,
) -> Result<TcpFrame, Error> {
    port.send_frame(&frame.to_bytes()).map_err(Error::record)?;
    thread::sleep(recv_delay);
    let mut buf = [0u8; 14];
    port.recv_frame(&mut buf).map_err(Error::record)?;
    let response = TcpFrame::decode(&buf)?;
    if response.cmd != Cmd::Ack {
        return Err(Error::io(IoErrorKind::Nack(response.nack_code()), "device returned NACK").record());
    }
    Ok(response)
}

fn poll_statusword(
    port: &mut TcpTransport,
    subnode: u8,
    recv_delay: std::time::Duration,
) -> Result<u16, Error> {
    let frame = encode_tcp(subnode, TCP_STATUSWORD_ADDRESS, Cmd::Read, &[])?;
    Ok(exchange(port, &frame, recv_delay)?.status_word())
}

fn spawn_health_listener(
    transport: Arc<Mutex<TcpTransport>>,
    state: Arc<StateCell>,
    subs: Arc<SubscriberRegistry>,
    stop: Arc<AtomicBool>,
    stop_reconnect: Arc<AtomicBool>,
    config: TcpConfig,
    subnode: u8,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut consecutive_errors = 0u32;
        while !stop.load(Ordering::Relaxed) {
            thread::sleep(config.poll_interval);
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let outcome = {
                let mut port = transport.lock().expect("transport lock poisoned");
                poll_statusword(&mut port, subnode, config.recv_delay)
            };
            match outcome {
                Ok(value) => {
                    consecutive_errors = 0;
                    subs.dispatch(subnode, value);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        "tcp health poll failed ({consecutive_errors}/{}): {e}",
                        config.max_consecutive_errors
                    );
                    if consecutive_errors >= config.max_consecutive_errors {
                        state.set(SessionState::Faulty);
                        reconnect(&transport, &config, &state, &stop_reconnect);
                        consecutive_errors = 0;
                    }
                }
            }
        }
    })
}

/// Iteratively retries the connection until it succeeds or `stop_reconnect`
/// is raised (§4.5, §9 redesign note 4).
fn reconnect(
    transport: &Arc<Mutex<TcpTransport>>,
    config: &TcpConfig,
    state: &Arc<StateCell>,
    stop_reconnect: &Arc<AtomicBool>,
) {
    loop {
        if stop_reconnect.load(Ordering::Relaxed) {
            return;
        }
        match TcpTransport::connect(config) {
            Ok(new_transport) => {
                *transport.lock().expect("transport lock poisoned") = new_transport;
                state.set(SessionState::Connected);
                info!("tcp session reconnected");
                return;
            }
            Err(e) => {
                warn!("tcp reconnect attempt failed: {e}");
                thread::sleep(config.reconnect_sleep);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn fake_device(listener: TcpListener, reply: [u8; 14]) -> JoinHandle<[u8; 14]> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 14];
            std::io::Read::read_exact(&mut stream, &mut request).unwrap();
            std::io::Write::write_all(&mut stream, &reply).unwrap();
            request
        })
    }

    #[test]
    fn exchange_rejects_nack_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let nack_frame = TcpFrame {
            subnode: 1,
            address: 0x0011,
            cmd: Cmd::Read,
            pending: false,
            data: [0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 0],
        };
        let handle = fake_device(listener, nack_frame.to_bytes());

        let stream = TcpStream::connect(addr).unwrap();
        let mut port = TcpTransport::from_stream(stream);
        let frame = encode_tcp(1, 0x0011, Cmd::Read, &[]).unwrap();
        let err = exchange(&mut port, &frame, std::time::Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, Error::Io { kind: IoErrorKind::Nack(0xDEADBEEF), .. }));
        handle.join().unwrap();
    }
}
