// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Debug Port Registers

use crate::arm::register::{DpRegister, ReadableRegister, RegisterDescriptor, WritableRegister};
use crate::register_data_rw;
use core::fmt;

/// IDCODE Register descriptor (read-only)
pub struct IdCodeRegister;

impl RegisterDescriptor for IdCodeRegister {
    const ADDRESS: u8 = 0x00;
    type Value = IdCode;
}

impl ReadableRegister for IdCodeRegister {}
impl DpRegister for IdCodeRegister {}

/// ARM Debug Port IDCODE register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdCode(u32);

impl IdCode {
    /// IDCODE reported by the SW-DP of SiM3U1xx/SiM3C1xx parts.
    pub const SIM3_SW_DP: IdCode = IdCode(0x2BA0_1477);

    pub const fn new(value: u32) -> Self {
        IdCode(value)
    }

    pub fn data(&self) -> u32 {
        self.0
    }

    /// Get revision field (bits 31:28)
    pub fn revision(&self) -> u8 {
        ((self.0 >> 28) & 0xF) as u8
    }

    /// Get part number (bits 27:20)
    pub fn part_number(&self) -> u8 {
        ((self.0 >> 20) & 0xFF) as u8
    }

    /// Get version (bits 15:12)
    pub fn version(&self) -> u8 {
        ((self.0 >> 12) & 0xF) as u8
    }

    /// Get JEDEC designer ID (bits 11:1)
    pub fn designer_id(&self) -> u16 {
        ((self.0 >> 1) & 0x7FF) as u16
    }

    /// Check if LSB is set (should always be 1 for valid IDCODE)
    pub fn is_valid(&self) -> bool {
        (self.0 & 1) == 1
    }

    /// Check if this is an ARM Debug Port
    pub fn is_arm_debug_port(&self) -> bool {
        self.designer_id() == 0x23B && self.part_number() == 0xBA
    }

    /// Get part description if known
    pub fn part_description(&self) -> &'static str {
        if !self.is_arm_debug_port() {
            return "unknown";
        }
        match self.version() {
            0 => "ARM Debug Port v0",
            1 => "ARM Debug Port v1",
            2 => "ARM Debug Port v2",
            _ => "Unknown ARM Debug Port Version",
        }
    }
}

impl From<u32> for IdCode {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<IdCode> for u32 {
    fn from(value: IdCode) -> u32 {
        value.0
    }
}

impl fmt::Display for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            if !self.is_valid() {
                return write!(f, "Invalid IDCODE: 0x{:08X} (LSB not set)", self.0);
            }

            write!(f, "0x{:08X} {}", self.0, self.part_description())
        } else {
            write!(f, "0x{:08X}", self.0)
        }
    }
}

/// CTRL/STAT Register descriptor (read-write)
pub struct CtrlStatRegister;

impl RegisterDescriptor for CtrlStatRegister {
    const ADDRESS: u8 = 0x04;
    type Value = CtrlStat;
}

impl ReadableRegister for CtrlStatRegister {}
impl WritableRegister for CtrlStatRegister {}
impl DpRegister for CtrlStatRegister {}

/// ARM Debug Port CTRL/STAT register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtrlStat(u32);

// Standard register data impls
register_data_rw!(CtrlStat);

impl CtrlStat {
    const CDBGPWRUPREQ: u32 = 1 << 28;
    const CDBGPWRUPACK: u32 = 1 << 29;
    const CSYSPWRUPREQ: u32 = 1 << 30;
    const CSYSPWRUPACK: u32 = 1 << 31;

    /// Debug and system power-up requested, 0x50000000.
    pub fn power_up() -> Self {
        let mut ctrl_stat = Self::power_down();
        ctrl_stat.set_csyspwrupreq(true);
        ctrl_stat.set_cdbgpwrupreq(true);
        ctrl_stat
    }

    /// All requests cleared.
    pub const fn power_down() -> Self {
        CtrlStat(0)
    }

    /// Get raw register value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Get debug power-up request
    pub fn cdbgpwrupreq(&self) -> bool {
        self.0 & Self::CDBGPWRUPREQ != 0
    }

    /// Get debug power-up acknowledge
    pub fn cdbgpwrupack(&self) -> bool {
        self.0 & Self::CDBGPWRUPACK != 0
    }

    /// Get system power-up request
    pub fn csyspwrupreq(&self) -> bool {
        self.0 & Self::CSYSPWRUPREQ != 0
    }

    /// Get system power-up acknowledge
    pub fn csyspwrupack(&self) -> bool {
        self.0 & Self::CSYSPWRUPACK != 0
    }

    /// Set debug power-up request
    pub fn set_cdbgpwrupreq(&mut self, enable: bool) {
        if enable {
            self.0 |= Self::CDBGPWRUPREQ;
        } else {
            self.0 &= !Self::CDBGPWRUPREQ;
        }
    }

    /// Set system power-up request
    pub fn set_csyspwrupreq(&mut self, enable: bool) {
        if enable {
            self.0 |= Self::CSYSPWRUPREQ;
        } else {
            self.0 &= !Self::CSYSPWRUPREQ;
        }
    }
}

/// SELECT Register descriptor (read-write)
pub struct SelectRegister;

impl RegisterDescriptor for SelectRegister {
    const ADDRESS: u8 = 0x08;
    type Value = Select;
}

impl ReadableRegister for SelectRegister {}
impl WritableRegister for SelectRegister {}
impl DpRegister for SelectRegister {}

/// ARM Debug Port SELECT register data
///
/// Chooses the Access Port (APSEL, bits 31:24) and the 16 byte register bank
/// within it (APBANKSEL, bits 7:4) that subsequent AP accesses address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Select(u32);

// Standard register data impls
register_data_rw!(Select);

impl Select {
    const APSEL_MASK: u32 = 0xFF;
    const APSEL_SHIFT: u32 = 24;

    pub const APBANKSEL_MASK: u32 = 0xF;
    pub const APBANKSEL_SHIFT: u32 = 4;

    pub const fn new(value: u32) -> Self {
        Select(value)
    }

    /// SELECT value for the register at `addr` on Access Port `apsel`.
    pub const fn for_ap(apsel: u8, addr: u8) -> Self {
        let bank = ((addr >> 4) & 0xF) as u32;
        Select(((apsel as u32) << Self::APSEL_SHIFT) | (bank << Self::APBANKSEL_SHIFT))
    }

    /// Get raw register value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Get access port select
    pub fn apsel(&self) -> u32 {
        (self.0 >> Self::APSEL_SHIFT) & Self::APSEL_MASK
    }

    /// Get AP bank select
    pub fn apbanksel(&self) -> u32 {
        (self.0 >> Self::APBANKSEL_SHIFT) & Self::APBANKSEL_MASK
    }
}
