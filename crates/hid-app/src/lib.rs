//! Bluetooth Classic HID Host Application
//!
//! Main application crate that wires the pieces together:
//! - CYW43439 HCI transport
//! - HCI link and L2CAP channel state machines
//! - HID report consumption

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;

pub use config::AppConfig;
