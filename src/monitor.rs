//! Device monitor (§4.7, §6): polls the transport's port enumeration and
//! reports which device paths have appeared or disappeared since the last
//! scan.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::Error;

/// What changed for one device path between two scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    Added,
    Removed,
}

/// A background poller with a single start/stop lifecycle.
///
/// Starting twice without an intervening `stop` is rejected with
/// [`Error::Already`] rather than silently spawning a second poller.
pub struct Monitor {
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Monitor { running: Arc::new(AtomicBool::new(false)), handle: Mutex::new(None) }
    }

    /// Starts polling `scan` every `interval`, invoking `on_event` with the
    /// path of each device that has appeared or disappeared since the
    /// previous scan.
    pub fn start(
        &self,
        interval: Duration,
        scan: impl Fn() -> Result<Vec<String>, Error> + Send + 'static,
        on_event: impl Fn(&str, MonitorEvent) + Send + 'static,
    ) -> Result<(), Error> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::Already("monitor is already running".into()).record());
        }

        let running = self.running.clone();
        let handle = thread::spawn(move || {
            let mut known: HashSet<String> = HashSet::new();
            while running.load(Ordering::Relaxed) {
                if let Ok(seen) = scan() {
                    let seen: HashSet<String> = seen.into_iter().collect();
                    for path in seen.difference(&known) {
                        on_event(path.as_str(), MonitorEvent::Added);
                    }
                    for path in known.difference(&seen) {
                        on_event(path.as_str(), MonitorEvent::Removed);
                    }
                    known = seen;
                }
                thread::sleep(interval);
            }
        });
        *self.handle.lock().expect("monitor lock poisoned") = Some(handle);
        Ok(())
    }

    /// Starts polling the system's serial port enumeration
    /// ([`crate::transport::serial::available_ports`]) every `interval`.
    #[cfg(feature = "serial")]
    pub fn watch_serial_ports(
        &self,
        interval: Duration,
        on_event: impl Fn(&str, MonitorEvent) + Send + 'static,
    ) -> Result<(), Error> {
        self.start(interval, crate::transport::serial::available_ports, on_event)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the monitor and waits for its thread to exit.
    ///
    /// Returns nothing: the C original's `il_eth_mon_stop` returned an
    /// `int` that every caller discarded (§9 redesign note 2).
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().expect("monitor lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn start_twice_without_stop_fails_with_already() {
        let monitor = Monitor::new();
        monitor.start(Duration::from_millis(5), || Ok(vec![]), |_, _| {}).unwrap();
        let err = monitor.start(Duration::from_millis(5), || Ok(vec![]), |_, _| {}).unwrap_err();
        assert!(matches!(err, Error::Already(_)));
        monitor.stop();
    }

    #[test]
    fn reports_added_then_removed_across_scans() {
        let call = Arc::new(AtomicU32::new(0));
        let call_scan = call.clone();
        let events: Arc<Mutex<Vec<(String, MonitorEvent)>>> = Arc::new(Mutex::new(Vec::new()));
        let events_cb = events.clone();

        let monitor = Monitor::new();
        monitor
            .start(
                Duration::from_millis(5),
                move || {
                    let n = call_scan.fetch_add(1, Ordering::SeqCst);
                    let ports = if n == 0 {
                        vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]
                    } else {
                        vec!["/dev/ttyUSB0"]
                    };
                    Ok(ports.into_iter().map(String::from).collect())
                },
                move |path, event| events_cb.lock().unwrap().push((path.to_string(), event)),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(60));
        monitor.stop();

        let seen = events.lock().unwrap();
        assert!(seen.contains(&("/dev/ttyUSB0".to_string(), MonitorEvent::Added)));
        assert!(seen.contains(&("/dev/ttyUSB1".to_string(), MonitorEvent::Added)));
        assert!(seen.contains(&("/dev/ttyUSB1".to_string(), MonitorEvent::Removed)));
    }
}
