//! Session tests against a real serial port.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! export TEST_PORT=/dev/ttyUSB0          # or COM3 on Windows
//! export TEST_BAUD=115200                # optional, default: 115200
//! export TEST_LOOPBACK=1                 # if port has TX-RX loopback
//!
//! cargo test --features hardware-tests -- --ignored
//! ```

use super::utils::{assert_duration_within, print_available_ports};
use crate::skip_without_hardware;
use std::time::{Duration, Instant};
use trace_console::session::{ConnectionState, SerialSession};
use trace_console::SessionError;

#[test]
#[ignore]
fn test_session_connect_disconnect() {
    let config = skip_without_hardware!();
    print_available_ports();

    let mut session = SerialSession::new(config.session_config()).unwrap();
    session.connect().unwrap();
    assert!(session.is_connected());

    session.disconnect();
    assert_eq!(session.state(), ConnectionState::Disconnected);

    // The port must be reusable after a disconnect.
    session.connect().unwrap();
    assert!(session.is_connected());
}

#[test]
#[ignore]
fn test_session_timeout_on_real_port() {
    let config = skip_without_hardware!();
    let mut session = SerialSession::new(config.session_config()).unwrap();
    session.connect().unwrap();

    let started = Instant::now();
    let found = session
        .wait_for_trace("pattern-that-never-appears-7f3a", "", Duration::from_secs(1), false)
        .unwrap();

    assert_eq!(found, None);
    assert_duration_within(
        started.elapsed(),
        Duration::from_millis(1_100),
        Duration::from_millis(100),
        "wait timeout",
    );
}

#[test]
#[ignore]
fn test_session_loopback_echo() {
    let config = skip_without_hardware!();
    if !config.loopback_enabled {
        println!("⏭️  Skipping: TEST_LOOPBACK not set to 1");
        return;
    }

    let mut session = SerialSession::new(config.session_config()).unwrap();
    session.connect().unwrap();

    let found = session
        .wait_for_trace(r"ping-(\d+)", "ping-4711", Duration::from_secs(2), false)
        .unwrap()
        .expect("loopback echo");
    assert_eq!(found.group(1), Some("4711"));
}

#[test]
fn test_missing_port_fails_to_connect() {
    let mut session = SerialSession::new(trace_console::SessionConfig::for_port(
        "/dev/nonexistent_port_12345",
    ))
    .unwrap();

    let err = session.connect().unwrap_err();
    assert!(matches!(err, SessionError::Port(_)), "{err}");
    assert_eq!(session.state(), ConnectionState::Disconnected);
}
