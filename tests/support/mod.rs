//! Shared fake-device harness for the TCP session integration tests.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

/// Binds an ephemeral port and runs `handler` against the first accepted
/// connection on a background thread.
pub fn spawn_fake_device(
    handler: impl FnOnce(TcpStream) + Send + 'static,
) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake device");
    let addr = listener.local_addr().expect("local_addr");
    let handle = thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            // Drop the listening socket so any later reconnect attempt at
            // this address gets a clean connection refusal rather than
            // silently queuing in the accept backlog.
            drop(listener);
            handler(stream);
        }
    });
    (addr, handle)
}

/// Replies to each 14-byte request in turn with the next frame from
/// `replies`, then closes the connection once the script is exhausted
/// (tests pick timeouts long enough that the background health poll never
/// reaches the server in that window).
pub fn script_device(mut stream: TcpStream, replies: Vec<[u8; 14]>) {
    for reply in replies {
        let mut request = [0u8; 14];
        if stream.read_exact(&mut request).is_err() {
            return;
        }
        if stream.write_all(&reply).is_err() {
            return;
        }
    }
}
