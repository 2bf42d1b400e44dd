// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SiLabs SiM3 Chip Access Port
//!
//! The Chip AP is a vendor specific Access Port, at APSEL 0x0A, which sits
//! alongside the AHB MEM-AP.  It provides chip level control that works even
//! when the core is locked or unresponsive: bulk erase, core reset hold and
//! system reset request.
//!
//! | Bank | SELECT       | 0x0     | 0x4      | 0x8     | 0xC  |
//! |------|--------------|---------|----------|---------|------|
//! | 0    | `0x0A000000` | CTRL1   | CTRL2    | LOCK    | CRC  |
//! | 1    | `0x0A000010` | INIT_STAT | DAP_IN | DAP_OUT | -    |
//! | F    | `0x0A0000F0` | -       | -        | -       | ID   |

use crate::arm::dp::Select;
use crate::arm::register::{ApRegister, ReadableRegister, RegisterDescriptor, WritableRegister};
use crate::{register_data_r, register_data_rw};
use core::fmt;

/// APSEL value of the SiLabs Chip AP
pub const CHIP_AP_APSEL: u8 = 0x0A;

/// DP SELECT for Chip AP bank 0 (CTRL1, CTRL2, LOCK, CRC)
pub const CHIP_AP_BANK_0: Select = Select::for_ap(CHIP_AP_APSEL, 0x00);

/// DP SELECT for Chip AP bank 1 (INIT_STAT, DAP_IN, DAP_OUT)
pub const CHIP_AP_BANK_1: Select = Select::for_ap(CHIP_AP_APSEL, 0x10);

/// DP SELECT for Chip AP bank F (ID)
pub const CHIP_AP_BANK_F: Select = Select::for_ap(CHIP_AP_APSEL, 0xF0);

macro_rules! chip_ap_register {
    ($(#[$meta:meta])* $name:ident, $addr:expr, $value:ty, rw) => {
        chip_ap_register!($(#[$meta])* $name, $addr, $value);
        impl WritableRegister for $name {}
    };
    ($(#[$meta:meta])* $name:ident, $addr:expr, $value:ty) => {
        $(#[$meta])*
        pub struct $name;

        impl RegisterDescriptor for $name {
            const ADDRESS: u8 = $addr;
            type Value = $value;
        }

        impl ReadableRegister for $name {}
        impl ApRegister for $name {
            const APSEL: u8 = CHIP_AP_APSEL;
        }
    };
}

chip_ap_register!(
    /// CTRL1 Register descriptor (read-write)
    Ctrl1Register,
    0x00,
    Ctrl1,
    rw
);
chip_ap_register!(
    /// CTRL2 Register descriptor (read-write)
    Ctrl2Register,
    0x04,
    ChipApData,
    rw
);
chip_ap_register!(
    /// LOCK Register descriptor (read-write)
    LockRegister,
    0x08,
    ChipApData,
    rw
);
chip_ap_register!(
    /// CRC Register descriptor (read-only)
    CrcRegister,
    0x0C,
    ChipApData
);
chip_ap_register!(
    /// INIT_STAT Register descriptor (read-only)
    InitStatRegister,
    0x10,
    ChipApData
);
chip_ap_register!(
    /// DAP_IN Register descriptor (read-write)
    DapInRegister,
    0x14,
    ChipApData,
    rw
);
chip_ap_register!(
    /// DAP_OUT Register descriptor (read-only)
    DapOutRegister,
    0x18,
    ChipApData
);
chip_ap_register!(
    /// ID Register descriptor (read-only)
    IdRegister,
    0xFC,
    ChipApId
);

/// Chip AP CTRL1 register data
///
/// All three action bits are self clearing on hardware once the requested
/// action has completed.  `user_erase` is polled for bulk erase completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ctrl1(u32);

// Standard register data impls
register_data_rw!(Ctrl1);

impl Ctrl1 {
    /// Erase all user flash.  Reads back set until the erase completes.
    pub const USER_ERASE: u32 = 1 << 0;
    /// Request a system reset.
    pub const SYSRESET_REQ_AP: u32 = 1 << 2;
    /// Hold the core in reset.
    pub const CORE_RESET_AP: u32 = 1 << 3;

    pub const fn new(value: u32) -> Self {
        Ctrl1(value)
    }

    /// CTRL1 with all action bits clear.
    pub const fn idle() -> Self {
        Ctrl1(0)
    }

    pub const fn user_erase() -> Self {
        Ctrl1(Self::USER_ERASE)
    }

    pub const fn sysreset_req() -> Self {
        Ctrl1(Self::SYSRESET_REQ_AP)
    }

    pub const fn core_reset() -> Self {
        Ctrl1(Self::CORE_RESET_AP)
    }

    /// Whether a bulk erase is still in progress.
    pub fn erase_busy(&self) -> bool {
        self.0 & Self::USER_ERASE != 0
    }

    pub fn core_reset_held(&self) -> bool {
        self.0 & Self::CORE_RESET_AP != 0
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Generic Chip AP register data, for registers this crate does not
/// interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChipApData(u32);

register_data_rw!(ChipApData);

/// Chip AP ID register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChipApId(u32);

register_data_r!(ChipApId);

impl ChipApId {
    /// Value reported by every SiLabs Chip AP implementation.
    pub const EXPECTED: ChipApId = ChipApId(0x0243_0002);

    pub fn data(&self) -> u32 {
        self.0
    }

    /// Whether this is the SiLabs Chip AP.
    pub fn is_silabs(&self) -> bool {
        *self == Self::EXPECTED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_selects() {
        assert_eq!(CHIP_AP_BANK_0.value(), 0x0A00_0000);
        assert_eq!(CHIP_AP_BANK_1.value(), 0x0A00_0010);
        assert_eq!(CHIP_AP_BANK_F.value(), 0x0A00_00F0);
        assert_eq!(Ctrl1Register::bank_select(), CHIP_AP_BANK_0);
        assert_eq!(DapOutRegister::bank_select(), CHIP_AP_BANK_1);
        assert_eq!(IdRegister::bank_select(), CHIP_AP_BANK_F);
    }

    #[test]
    fn wire_addresses() {
        assert_eq!(Ctrl1Register::WIRE_ADDRESS, 0x01);
        assert_eq!(Ctrl2Register::WIRE_ADDRESS, 0x05);
        assert_eq!(IdRegister::WIRE_ADDRESS, 0x0D);
    }

    #[test]
    fn ctrl1_values() {
        assert_eq!(Ctrl1::user_erase().value(), 0x1);
        assert_eq!(Ctrl1::sysreset_req().value(), 0x4);
        assert_eq!(Ctrl1::core_reset().value(), 0x8);
        assert!(Ctrl1::new(0x9).erase_busy());
        assert!(Ctrl1::new(0x9).core_reset_held());
        assert!(!Ctrl1::idle().erase_busy());
    }

    #[test]
    fn identity() {
        assert!(ChipApId::from(0x0243_0002).is_silabs());
        assert!(!ChipApId::from(0x0243_0003).is_silabs());
    }
}
