// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! sim3prog-core - Core register definitions used by sim3prog.
//!
//! Designed to be used in conjunction with the `sim3prog-swd` library, which
//! programs SiLabs SiM3 flash and SRAM over Serial Wire Debug (SWD).
//!
//! Contains:
//! - [`arm`] - ARM Debug Port, MEM-AP and Cortex-M debug registers.
//! - [`chipap`] - the SiLabs vendor specific Chip Access Port.
//! - [`sim3`] - the SiM3 memory map, flash and clock controllers.
//!
//! This library is `no_std` compatible, and requires an `alloc`
//! implementation.

#![no_std]

pub mod arm;
pub mod chipap;
pub mod sim3;

extern crate alloc;
