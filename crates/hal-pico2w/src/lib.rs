//! Hardware Abstraction Layer for Raspberry Pi Pico 2 W
//!
//! Provides the CYW43439 Bluetooth HCI transport for the HID host stack.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod bluetooth;
