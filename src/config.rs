//! Configuration knobs, enumerated in one place per the teacher's
//! build-time-constants convention.

use std::time::Duration;

/// Default serial baudrate used by [`crate::session::serial::open`].
pub const BAUDRATE_DEF: u32 = 115_200;

/// Default read timeout for the serial transport.
pub const TIMEOUT_RD_DEF: Duration = Duration::from_millis(1000);

/// Default write timeout for the serial transport.
pub const TIMEOUT_WR_DEF: Duration = Duration::from_millis(1000);

/// Time to sleep after opening the serial port before talking to the drive.
pub const INIT_WAIT_TIME: Duration = Duration::from_millis(1000);

/// Default per-wakeup timeout used while scanning for axes on the bus.
pub const SCAN_TIMEOUT: Duration = Duration::from_millis(100);

/// Initial capacity of the statusword subscriber registry.
pub const SW_SUBS_SZ_DEF: usize = 16;

/// Maximum size in bytes of a serial-profile frame.
pub const FRAME_MAX_SZ: usize = 1024;

/// Fixed TCP port MCB devices listen on.
pub const TCP_PORT: u16 = 23;

/// Interval between TCP listener health/statusword polls.
pub const TCP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Delay observed between sending a TCP request and reading its reply.
pub const TCP_RECV_DELAY: Duration = Duration::from_millis(5);

/// Consecutive poll failures before the TCP listener triggers a reconnect.
pub const TCP_MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Sleep between failed reconnect attempts.
pub const RECONNECT_SLEEP: Duration = Duration::from_millis(1000);

/// ASCII handshake sent over serial to force the device into binary mode.
pub const MSG_A2B: &[u8] = b"MSG_A2B";

/// `(idx, sidx)` coordinates of the serial-profile binary-mode flag register.
pub const UARTCFG_BIN_IDX: u16 = 0x07A0;
pub const UARTCFG_BIN_SIDX: u8 = 0x00;

/// `(idx, sidx)` coordinates of the serial-profile node-id register used by
/// the axis scan broadcast read.
pub const UARTCFG_ID_IDX: u16 = 0x06E6;
pub const UARTCFG_ID_SIDX: u8 = 0x00;

/// `(idx, sidx)` coordinates of the serial-profile status word register.
pub const STATUSWORD_IDX: u16 = 0x0011;
pub const STATUSWORD_SIDX: u8 = 0x00;

/// TCP-profile address of the status word / health-poll register.
pub const TCP_STATUSWORD_ADDRESS: u16 = 0x0011;

/// Configuration for the serial transport.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub baudrate: u32,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        SerialConfig {
            port: port.into(),
            baudrate: BAUDRATE_DEF,
            read_timeout: TIMEOUT_RD_DEF,
            write_timeout: TIMEOUT_WR_DEF,
        }
    }
}

/// Configuration for the TCP transport and its session's health-poll
/// listener. The poll/reconnect knobs default to the values in §6 of the
/// specification this crate implements but are fields (not bare constants)
/// so tests can shrink them instead of waiting out real device timings.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub address: String,
    pub port: u16,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub poll_interval: Duration,
    pub recv_delay: Duration,
    pub max_consecutive_errors: u32,
    pub reconnect_sleep: Duration,
}

impl TcpConfig {
    pub fn new(address: impl Into<String>) -> Self {
        TcpConfig {
            address: address.into(),
            port: TCP_PORT,
            read_timeout: TIMEOUT_RD_DEF,
            write_timeout: TIMEOUT_WR_DEF,
            poll_interval: TCP_POLL_INTERVAL,
            recv_delay: TCP_RECV_DELAY,
            max_consecutive_errors: TCP_MAX_CONSECUTIVE_ERRORS,
            reconnect_sleep: RECONNECT_SLEEP,
        }
    }
}
