//! Hardware integration test suite.
//!
//! These tests require actual serial hardware and only build with the
//! `hardware-tests` feature. Run with:
//! `TEST_PORT=/dev/ttyUSB0 cargo test --features hardware-tests -- --ignored`

#![cfg(feature = "hardware-tests")]

#[path = "common/mod.rs"]
mod common;

#[path = "hardware/mod.rs"]
mod hardware;
